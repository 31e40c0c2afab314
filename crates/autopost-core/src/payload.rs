use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::Platform;

/// Twitter's hard character ceiling per post.
pub const TWEET_MAX_CHARS: usize = 280;
/// Instagram caps captions at 2200 characters.
pub const IG_CAPTION_MAX_CHARS: usize = 2200;

/// What kind of media an Instagram post carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Carousel,
}

/// TikTok publish visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiktokPrivacy {
    Public,
    Private,
}

/// Publish instructions, tagged by platform so each variant carries only
/// the fields its API accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PostPayload {
    Instagram {
        caption: String,
        media_url: String,
        media_kind: MediaKind,
    },
    Twitter {
        text: String,
        media_url: Option<String>,
    },
    Tiktok {
        caption: String,
        video_url: String,
        privacy: TiktokPrivacy,
    },
}

/// A payload that failed field-level validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("{platform}: {field} must not be empty")]
    Empty {
        platform: Platform,
        field: &'static str,
    },

    #[error("{platform}: {field} exceeds {max} characters ({len})")]
    TooLong {
        platform: Platform,
        field: &'static str,
        max: usize,
        len: usize,
    },
}

impl PostPayload {
    pub fn platform(&self) -> Platform {
        match self {
            PostPayload::Instagram { .. } => Platform::Instagram,
            PostPayload::Twitter { .. } => Platform::Twitter,
            PostPayload::Tiktok { .. } => Platform::Tiktok,
        }
    }

    /// Check the per-platform field constraints before a job is accepted.
    pub fn validate(&self) -> Result<(), PayloadError> {
        match self {
            PostPayload::Instagram {
                caption, media_url, ..
            } => {
                require_non_empty(Platform::Instagram, "media_url", media_url)?;
                require_max_len(
                    Platform::Instagram,
                    "caption",
                    caption,
                    IG_CAPTION_MAX_CHARS,
                )
            }
            PostPayload::Twitter { text, .. } => {
                require_non_empty(Platform::Twitter, "text", text)?;
                require_max_len(Platform::Twitter, "text", text, TWEET_MAX_CHARS)
            }
            PostPayload::Tiktok { video_url, .. } => {
                require_non_empty(Platform::Tiktok, "video_url", video_url)
            }
        }
    }
}

fn require_non_empty(
    platform: Platform,
    field: &'static str,
    value: &str,
) -> Result<(), PayloadError> {
    if value.trim().is_empty() {
        return Err(PayloadError::Empty { platform, field });
    }
    Ok(())
}

fn require_max_len(
    platform: Platform,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), PayloadError> {
    let len = value.chars().count();
    if len > max {
        return Err(PayloadError::TooLong {
            platform,
            field,
            max,
            len,
        });
    }
    Ok(())
}
