//! Core types for the repost bot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post fetched from a source account.
///
/// Built only at the API boundary; everything downstream treats it as
/// read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Platform-assigned identifier (opaque)
    pub id: String,
    /// Handle of the source account the post was fetched from
    pub source: String,
    pub created_at: Option<DateTime<Utc>>,
    pub text: String,
    pub media: Vec<MediaRef>,
    /// Whether the post is itself a repost of someone else's post
    pub is_repost: bool,
}

impl PostRecord {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            created_at: None,
            text: String::new(),
            media: Vec::new(),
            is_repost: false,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media.push(media);
        self
    }

    pub fn as_repost(mut self) -> Self {
        self.is_repost = true;
        self
    }

    /// Public URL of the original post
    pub fn permalink(&self) -> String {
        format!("https://x.com/{}/status/{}", self.source, self.id)
    }

    /// True if the post carries at least one photo with a direct URL
    pub fn has_photo(&self) -> bool {
        self.media
            .iter()
            .any(|m| m.kind == MediaKind::Photo && m.url.is_some())
    }
}

/// Reference to a media attachment of a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub key: String,
    pub kind: MediaKind,
    pub url: Option<String>,
}

impl MediaRef {
    pub fn photo(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: MediaKind::Photo,
            url: Some(url.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
    Other,
}

impl MediaKind {
    /// Parse the media type string used by the API
    pub fn from_api_str(s: &str) -> Self {
        match s {
            "photo" => Self::Photo,
            "video" => Self::Video,
            "animated_gif" => Self::AnimatedGif,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Photo => write!(f, "photo"),
            Self::Video => write!(f, "video"),
            Self::AnimatedGif => write!(f, "animated_gif"),
            Self::Other => write!(f, "other"),
        }
    }
}
