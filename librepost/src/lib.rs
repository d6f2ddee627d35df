//! librepost - scheduled reposting from a fixed set of source accounts
//!
//! This library holds everything the `repost-run` and `repost-history`
//! binaries need: configuration, the persisted history of reposted posts,
//! the selection logic, and the platform clients.

pub mod config;
pub mod cursor;
pub mod error;
pub mod history;
pub mod logging;
pub mod platforms;
pub mod poster;
pub mod scheduling;
pub mod selector;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use cursor::CursorStore;
pub use error::{RepostError, Result};
pub use history::HistoryStore;
pub use poster::{RepostRunner, RunReport, RunStatus};
pub use types::{MediaKind, MediaRef, PostRecord};
