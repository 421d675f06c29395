//! Generative analysis collaborators.
//!
//! The executor orchestrates but never generates: titles, descriptions,
//! keywords, chapters, summaries, transcriptions and thumbnail concepts all
//! come from the analysis service behind the [`AnalysisService`] contract.
//! Each operation is an independent call so the four core analyses can run
//! concurrently. The production HTTP client lives in [`client`].

pub mod client;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{Chapter, OptimizationConfig};

pub use client::AnalysisClient;

/// Errors reported by the analysis service.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Missing configuration.
    #[error("Missing API base URL: CLIPFORGE_ANALYSIS_API_BASE environment variable not set")]
    MissingApiBase,

    /// HTTP transport failure.
    #[error("Analysis request failed: {0}")]
    RequestFailed(String),

    /// The service rejected the request with a rate limit.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The service answered with an error status.
    #[error("Analysis API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    /// The service answered with an unparseable body.
    #[error("Failed to parse analysis response: {0}")]
    ParseError(String),

    /// Reading the media file for transcription failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contract for the generative analysis service.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Suggests optimized titles for the content, best first.
    async fn suggest_titles(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<Vec<String>, AnalysisError>;

    /// Writes an optimized description.
    async fn write_description(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<String, AnalysisError>;

    /// Extracts search keywords.
    async fn extract_keywords(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<Vec<String>, AnalysisError>;

    /// Segments the content into chapters.
    async fn segment_chapters(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<Vec<Chapter>, AnalysisError>;

    /// Summarizes a transcript.
    async fn summarize(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<String, AnalysisError>;

    /// Transcribes a media file on local disk.
    async fn transcribe(&self, path: &Path) -> Result<String, AnalysisError>;

    /// Proposes thumbnail concepts. Callers treat this as best-effort: a
    /// failure here never fails the surrounding job.
    async fn thumbnail_ideas(
        &self,
        title: &str,
        description: &str,
    ) -> Result<Vec<String>, AnalysisError>;
}
