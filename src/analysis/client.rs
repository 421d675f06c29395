//! HTTP client for the analysis API.
//!
//! The analysis API fronts the generative provider. This client only knows
//! its JSON surface; prompt engineering and model choice live server-side.

use std::env;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::job::{Chapter, OptimizationConfig};

use super::{AnalysisError, AnalysisService};

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    transcript: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    keyword_hints: &'a [String],
}

impl<'a> TextRequest<'a> {
    fn new(transcript: &'a str, config: &'a OptimizationConfig) -> Self {
        Self {
            transcript,
            tone: config.tone.as_deref(),
            language: config.language.as_deref(),
            keyword_hints: &config.keyword_hints,
        }
    }
}

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    file_name: &'a str,
    data_base64: String,
}

#[derive(Debug, Serialize)]
struct ThumbnailRequest<'a> {
    title: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct TitlesResponse {
    titles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DescriptionResponse {
    description: String,
}

#[derive(Debug, Deserialize)]
struct KeywordsResponse {
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChaptersResponse {
    chapters: Vec<Chapter>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct ThumbnailsResponse {
    ideas: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Client for the analysis API.
pub struct AnalysisClient {
    /// Base URL for the API.
    api_base: String,
    /// Optional API key for authentication.
    api_key: Option<String>,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl AnalysisClient {
    /// Creates a client with explicit configuration.
    pub fn new(api_base: String, api_key: Option<String>) -> Self {
        Self {
            api_base,
            api_key,
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `CLIPFORGE_ANALYSIS_API_BASE`: base URL for the API (required)
    /// - `CLIPFORGE_ANALYSIS_API_KEY`: API key (optional)
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingApiBase`] if the base URL is not set.
    pub fn from_env() -> Result<Self, AnalysisError> {
        let api_base =
            env::var("CLIPFORGE_ANALYSIS_API_BASE").map_err(|_| AnalysisError::MissingApiBase)?;
        let api_key = env::var("CLIPFORGE_ANALYSIS_API_KEY").ok();
        Ok(Self::new(api_base, api_key))
    }

    /// Returns the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AnalysisError> {
        let url = format!("{}/{}", self.api_base.trim_end_matches('/'), path);
        let mut request = self.http_client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AnalysisError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let message = response
                    .json::<ApiErrorBody>()
                    .await
                    .map(|b| b.message)
                    .unwrap_or_default();
                Err(AnalysisError::RateLimited(message))
            }
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| AnalysisError::ParseError(e.to_string())),
            status => {
                let message = response
                    .json::<ApiErrorBody>()
                    .await
                    .map(|b| b.message)
                    .unwrap_or_default();
                Err(AnalysisError::ApiError {
                    code: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl AnalysisService for AnalysisClient {
    async fn suggest_titles(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<Vec<String>, AnalysisError> {
        let body: TitlesResponse = self
            .post_json("analyze/titles", &TextRequest::new(transcript, config))
            .await?;
        Ok(body.titles)
    }

    async fn write_description(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<String, AnalysisError> {
        let body: DescriptionResponse = self
            .post_json("analyze/description", &TextRequest::new(transcript, config))
            .await?;
        Ok(body.description)
    }

    async fn extract_keywords(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<Vec<String>, AnalysisError> {
        let body: KeywordsResponse = self
            .post_json("analyze/keywords", &TextRequest::new(transcript, config))
            .await?;
        Ok(body.keywords)
    }

    async fn segment_chapters(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<Vec<Chapter>, AnalysisError> {
        let body: ChaptersResponse = self
            .post_json("analyze/chapters", &TextRequest::new(transcript, config))
            .await?;
        Ok(body.chapters)
    }

    async fn summarize(
        &self,
        transcript: &str,
        config: &OptimizationConfig,
    ) -> Result<String, AnalysisError> {
        let body: SummaryResponse = self
            .post_json("analyze/summary", &TextRequest::new(transcript, config))
            .await?;
        Ok(body.summary)
    }

    async fn transcribe(&self, path: &Path) -> Result<String, AnalysisError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let body: TranscriptionResponse = self
            .post_json(
                "transcribe",
                &TranscribeRequest {
                    file_name: &file_name,
                    data_base64: BASE64_STANDARD.encode(&bytes),
                },
            )
            .await?;
        Ok(body.transcript)
    }

    async fn thumbnail_ideas(
        &self,
        title: &str,
        description: &str,
    ) -> Result<Vec<String>, AnalysisError> {
        let body: ThumbnailsResponse = self
            .post_json("analyze/thumbnails", &ThumbnailRequest { title, description })
            .await?;
        Ok(body.ideas)
    }
}
