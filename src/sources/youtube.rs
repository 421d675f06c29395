//! YouTube metadata and transcript client.
//!
//! Talks to the metadata/transcript fetcher service over HTTP. The service
//! wraps the YouTube data and caption APIs; this client only knows its
//! JSON surface.

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{SourceError, VideoMetadata, VideoSource};

/// Matches watch, short-link, embed and shorts URLs and captures the
/// 11-character video id.
fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)([A-Za-z0-9_-]{11})",
        )
        .expect("video id pattern is valid")
    })
}

/// Extracts the canonical video id from a YouTube URL.
pub fn extract_video_id(url: &str) -> Result<String, SourceError> {
    video_id_pattern()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SourceError::InvalidUrl(url.to_string()))
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    id: String,
    title: String,
    duration_label: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// HTTP client for the video fetcher service.
pub struct YoutubeClient {
    /// Base URL for the fetcher API.
    api_base: String,
    /// Optional API key for authentication.
    api_key: Option<String>,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl YoutubeClient {
    /// Creates a client with explicit configuration.
    pub fn new(api_base: String, api_key: Option<String>) -> Self {
        Self {
            api_base,
            api_key,
            http_client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `CLIPFORGE_SOURCE_API_BASE`: base URL for the fetcher API (required)
    /// - `CLIPFORGE_SOURCE_API_KEY`: API key (optional)
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingApiBase`] if the base URL is not set.
    pub fn from_env() -> Result<Self, SourceError> {
        let api_base =
            env::var("CLIPFORGE_SOURCE_API_BASE").map_err(|_| SourceError::MissingApiBase)?;
        let api_key = env::var("CLIPFORGE_SOURCE_API_KEY").ok();
        Ok(Self::new(api_base, api_key))
    }

    /// Returns the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        video_ref: &str,
        missing: impl FnOnce(String) -> SourceError,
    ) -> Result<T, SourceError> {
        let url = format!("{}/{}", self.api_base.trim_end_matches('/'), path);
        let mut request = self.http_client.get(&url);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(missing(video_ref.to_string())),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| SourceError::ParseError(e.to_string())),
            status => {
                let message = response
                    .json::<ApiErrorBody>()
                    .await
                    .map(|body| body.message)
                    .unwrap_or_default();
                Err(SourceError::ApiError {
                    code: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl VideoSource for YoutubeClient {
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, SourceError> {
        let video_id = extract_video_id(url)?;
        let body: MetadataResponse = self
            .get_json(
                &format!("videos/{}", video_id),
                &video_id,
                SourceError::NotFound,
            )
            .await?;

        Ok(VideoMetadata {
            id: body.id,
            title: body.title,
            duration_label: body.duration_label,
        })
    }

    async fn fetch_transcript(&self, url: &str) -> Result<String, SourceError> {
        let video_id = extract_video_id(url)?;
        let body: TranscriptResponse = self
            .get_json(
                &format!("videos/{}/transcript", video_id),
                &video_id,
                SourceError::NoTranscript,
            )
            .await?;

        Ok(body.transcript)
    }
}
