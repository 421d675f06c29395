//! Video source collaborators.
//!
//! The queue core never talks to YouTube directly; it goes through the
//! `VideoSource` contract so the admission controller and executor can be
//! tested against mock sources. The production implementation lives in
//! [`youtube`].

pub mod youtube;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use youtube::{extract_video_id, YoutubeClient};

/// Errors reported by a video source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The video does not exist or is not accessible.
    #[error("Video not found: {0}")]
    NotFound(String),

    /// The video exists but has no usable transcript.
    #[error("No transcript available for {0}")]
    NoTranscript(String),

    /// The URL could not be parsed into a video id.
    #[error("Unrecognized video URL: {0}")]
    InvalidUrl(String),

    /// HTTP transport failure.
    #[error("Source request failed: {0}")]
    RequestFailed(String),

    /// The source API answered with an error status.
    #[error("Source API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    /// The source API answered with an unparseable body.
    #[error("Failed to parse source response: {0}")]
    ParseError(String),

    /// Missing configuration.
    #[error("Missing API base URL: CLIPFORGE_SOURCE_API_BASE environment variable not set")]
    MissingApiBase,
}

impl SourceError {
    /// Returns whether the error means the source itself is unusable, as
    /// opposed to a transient transport problem.
    pub fn is_unusable_source(&self) -> bool {
        matches!(
            self,
            SourceError::NotFound(_) | SourceError::NoTranscript(_) | SourceError::InvalidUrl(_)
        )
    }
}

/// Metadata resolved for a video at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Canonical video id.
    pub id: String,
    /// Video title as published.
    pub title: String,
    /// Human-readable duration ("12:34").
    pub duration_label: String,
}

/// Contract for resolving video metadata and transcripts.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Resolves metadata for the video behind `url`.
    ///
    /// Fails with [`SourceError::NotFound`] when the video does not exist,
    /// which the admission controller surfaces synchronously.
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, SourceError>;

    /// Fetches the full transcript for the video behind `url`.
    async fn fetch_transcript(&self, url: &str) -> Result<String, SourceError>;
}
