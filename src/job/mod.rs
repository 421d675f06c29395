//! Job definitions for the optimization queue.
//!
//! This module defines the persisted job entity and its satellite types:
//!
//! - `Job`: one unit of analysis work with its own lifecycle
//! - `JobType` / `JobPayload`: tagged union of the supported sources
//! - `JobStatus`: lifecycle state machine states
//! - `OptimizationResult`: the success payload persisted on completion
//! - `JobView`: caller-facing projection returned by status queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of source a job operates on.
///
/// The discriminant decides which executor pipeline runs the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// A public YouTube video, resolved by URL.
    Youtube,
    /// An uploaded media file carried inline in the payload.
    Upload,
    /// A raw transcript supplied as text.
    Transcript,
}

impl JobType {
    /// Database/wire representation of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Youtube => "youtube",
            JobType::Upload => "upload",
            JobType::Transcript => "transcript",
        }
    }

    /// Parses the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "youtube" => Some(JobType::Youtube),
            "upload" => Some(JobType::Upload),
            "transcript" => Some(JobType::Transcript),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// `Completed`, `Failed` and `Cancelled` are terminal: no automatic
/// transition leaves them. `retry` spawns a sibling row and `restart`
/// resets the same row back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for a dispatch tick.
    Pending,
    /// Claimed by an executor run.
    Processing,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled by the owner before completion.
    Cancelled,
}

impl JobStatus {
    /// Database/wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Parses the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Returns whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns whether the job counts against the owner's active quota.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied tuning knobs for the analysis calls.
///
/// Replayed verbatim by `retry`, so every field must round-trip through
/// serialization unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Target tone for titles and description (e.g. "casual", "technical").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Output language code (e.g. "en", "de").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Keywords the caller wants emphasized.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyword_hints: Vec<String>,
}

/// Type-specific job input, persisted as a JSON column.
///
/// The tag mirrors `JobType` so the executor's dispatch match is
/// exhaustive at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// A YouTube video resolved at submission time.
    Youtube {
        /// Original URL as submitted.
        url: String,
        /// Canonical video id extracted from the URL.
        video_id: String,
        /// Title fetched eagerly at submission.
        video_title: String,
        /// Human-readable duration ("12:34").
        duration_label: String,
        #[serde(default)]
        config: OptimizationConfig,
    },
    /// An uploaded media file, bytes carried inline.
    Upload {
        /// Original file name as uploaded.
        file_name: String,
        /// MIME type of the upload.
        content_type: String,
        /// File bytes, base64-encoded for JSON persistence.
        data_base64: String,
        #[serde(default)]
        config: OptimizationConfig,
    },
    /// A raw transcript pasted by the user.
    Transcript {
        /// The transcript text.
        text: String,
        #[serde(default)]
        config: OptimizationConfig,
    },
}

impl JobPayload {
    /// Returns the job type this payload belongs to.
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Youtube { .. } => JobType::Youtube,
            JobPayload::Upload { .. } => JobType::Upload,
            JobPayload::Transcript { .. } => JobType::Transcript,
        }
    }

    /// Returns the user-supplied configuration.
    pub fn config(&self) -> &OptimizationConfig {
        match self {
            JobPayload::Youtube { config, .. }
            | JobPayload::Upload { config, .. }
            | JobPayload::Transcript { config, .. } => config,
        }
    }
}

/// A chapter marker suggested by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Offset from the start, in seconds.
    pub start_seconds: u32,
    /// Chapter heading.
    pub title: String,
}

/// Success payload persisted when a job completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Suggested titles, best first.
    pub titles: Vec<String>,
    /// Rewritten description.
    pub description: String,
    /// Extracted keywords.
    pub keywords: Vec<String>,
    /// Chapter segmentation.
    pub chapters: Vec<Chapter>,
    /// Transcript summary, when the pipeline produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Thumbnail concepts. Best-effort: empty when the step failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thumbnail_ideas: Vec<String>,
    /// Public URL of the stored upload, for upload jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Set when the owner's usage ceiling was already exhausted by the
    /// time this job finished. The job still completes; billing reacts.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub quota_flagged: bool,
}

/// One persisted unit of analysis work.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Unique identifier, assigned by the store on insert.
    pub id: Uuid,
    /// Owner; used for quota and access control.
    pub user_id: String,
    /// Pipeline discriminant.
    pub job_type: JobType,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Human-readable title, pre-populated at submission.
    pub title: String,
    /// Type-specific input, replay-safe.
    pub payload: JobPayload,
    /// Coarse progress indicator, 0-100.
    pub progress: u8,
    /// Success payload, set only on `Completed`.
    pub result: Option<OptimizationResult>,
    /// Failure message, set only on `Failed`.
    pub error_message: Option<String>,
    /// Failure classification code, set only on `Failed`.
    pub error_code: Option<String>,
    /// Id of the sibling created by `retry`, if any.
    pub retried_as: Option<Uuid>,
    /// How many times a stale-processing sweep requeued this row.
    pub reclaims: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Returns how long ago the job was created.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    /// Converts the row into the caller-facing projection.
    pub fn into_view(self) -> JobView {
        JobView {
            id: self.id,
            job_type: self.job_type,
            status: self.status,
            title: self.title,
            progress: self.progress,
            result: self.result,
            error_message: self.error_message,
            error_code: self.error_code,
            retried_as: self.retried_as,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Caller-facing projection of a job row.
///
/// Omits the raw payload (it may carry megabytes of upload bytes) and
/// internal bookkeeping columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub title: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OptimizationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retried_as: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Receipt returned by a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Id of the newly queued job.
    pub job_id: Uuid,
    /// Position in the owner's queue, 1-based.
    pub queue_position: u32,
    /// Advisory wait estimate.
    pub estimated_wait_minutes: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn youtube_payload() -> JobPayload {
        JobPayload::Youtube {
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            video_id: "dQw4w9WgXcQ".to_string(),
            video_title: "Test Video".to_string(),
            duration_label: "3:32".to_string(),
            config: OptimizationConfig::default(),
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_status_classification() {
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Processing.is_active());
        assert!(!JobStatus::Completed.is_active());

        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_job_type_roundtrip() {
        for ty in [JobType::Youtube, JobType::Upload, JobType::Transcript] {
            assert_eq!(JobType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(JobType::parse(""), None);
    }

    #[test]
    fn test_payload_discriminant_matches_type() {
        assert_eq!(youtube_payload().job_type(), JobType::Youtube);

        let upload = JobPayload::Upload {
            file_name: "clip.mp4".to_string(),
            content_type: "video/mp4".to_string(),
            data_base64: "AAAA".to_string(),
            config: OptimizationConfig::default(),
        };
        assert_eq!(upload.job_type(), JobType::Upload);

        let transcript = JobPayload::Transcript {
            text: "hello world".to_string(),
            config: OptimizationConfig::default(),
        };
        assert_eq!(transcript.job_type(), JobType::Transcript);
    }

    #[test]
    fn test_payload_serialization_roundtrip() {
        let payload = youtube_payload();
        let json = serde_json::to_string(&payload).expect("serialize");
        let parsed: JobPayload = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, payload);

        // The tag must be stable: retry replays persisted payloads verbatim.
        assert!(json.contains("\"kind\":\"youtube\""));
    }

    #[test]
    fn test_result_quota_flag_omitted_when_clear() {
        let result = OptimizationResult {
            titles: vec!["A".to_string()],
            description: "desc".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(!json.contains("quota_flagged"));

        let flagged = OptimizationResult {
            quota_flagged: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&flagged).expect("serialize");
        assert!(json.contains("\"quota_flagged\":true"));
    }
}
