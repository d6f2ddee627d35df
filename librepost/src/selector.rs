//! Repost selection
//!
//! Decides which fetched posts to act on this run. Selection is pure: it
//! never touches the history. Ids are marked only after the platform
//! confirms a repost (see [`crate::poster::RepostRunner::select_and_mark`]).

use std::collections::HashSet;

use crate::history::HistoryStore;
use crate::types::PostRecord;

/// Content filters applied before the quota
///
/// The default skips reposts and does not require media.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionFilter {
    /// Only accept posts with at least one photo
    pub require_media: bool,
    /// Accept posts that are themselves reposts
    pub include_reposts: bool,
}

impl SelectionFilter {
    /// A filter that accepts every post
    pub fn accept_all() -> Self {
        Self {
            require_media: false,
            include_reposts: true,
        }
    }

    pub fn accepts(&self, post: &PostRecord) -> bool {
        if post.is_repost && !self.include_reposts {
            return false;
        }
        if self.require_media && !post.has_photo() {
            return false;
        }
        true
    }
}

/// Select up to `quota` posts that are not in `history`.
///
/// Input order is kept (most recent first as the API returns them) and a
/// post id seen twice in `candidates` is only selected once.
pub fn select(candidates: &[PostRecord], history: &HistoryStore, quota: usize) -> Vec<PostRecord> {
    select_filtered(candidates, history, quota, &SelectionFilter::accept_all())
}

/// Like [`select`], skipping posts the filter rejects before applying the quota
pub fn select_filtered(
    candidates: &[PostRecord],
    history: &HistoryStore,
    quota: usize,
    filter: &SelectionFilter,
) -> Vec<PostRecord> {
    eligible(candidates, history, filter)
        .into_iter()
        .take(quota)
        .cloned()
        .collect()
}

/// Every candidate that would be selected with an unlimited quota
pub fn eligible<'a>(
    candidates: &'a [PostRecord],
    history: &HistoryStore,
    filter: &SelectionFilter,
) -> Vec<&'a PostRecord> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|post| !history.contains(&post.id))
        .filter(|post| seen.insert(post.id.as_str()))
        .filter(|post| filter.accepts(post))
        .collect()
}
