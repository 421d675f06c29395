//! Admission control: validation, quota and queue feedback for `submit`.

use std::sync::Arc;

use base64::prelude::*;
use tracing::info;

use crate::error::SubmitError;
use crate::job::{JobPayload, OptimizationConfig, SubmitReceipt};
use crate::metrics;
use crate::sources::VideoSource;
use crate::storage::{JobStore, NewJob};

use super::dispatcher::SchedulerHandle;
use super::QueueConfig;

/// Maximum characters of transcript text used for the derived job title.
const TRANSCRIPT_TITLE_CHARS: usize = 60;

/// A submission as received from the outer application.
#[derive(Debug, Clone)]
pub enum SubmitRequest {
    /// Optimize a YouTube video.
    Youtube {
        url: String,
        config: OptimizationConfig,
    },
    /// Optimize an uploaded media file.
    Upload {
        file_name: String,
        content_type: String,
        data: Vec<u8>,
        config: OptimizationConfig,
    },
    /// Optimize a pasted transcript.
    Transcript {
        text: String,
        config: OptimizationConfig,
    },
}

/// Validates and inserts new jobs.
pub struct Admission {
    store: Arc<JobStore>,
    source: Arc<dyn VideoSource>,
    scheduler: Arc<dyn SchedulerHandle>,
    config: QueueConfig,
}

impl Admission {
    /// Creates a new admission controller.
    pub fn new(
        store: Arc<JobStore>,
        source: Arc<dyn VideoSource>,
        scheduler: Arc<dyn SchedulerHandle>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            source,
            scheduler,
            config,
        }
    }

    /// Validates, quota-checks and queues a new job.
    ///
    /// Rejections never persist a row. On success the receipt carries the
    /// owner's queue position and an advisory wait estimate, and a
    /// best-effort immediate dispatch tick is requested so low-load
    /// submissions start promptly.
    pub async fn submit(
        &self,
        user_id: &str,
        request: SubmitRequest,
    ) -> Result<SubmitReceipt, SubmitError> {
        let (title, payload) = self.build_payload(request).await?;

        let active = self.store.count_active_for_user(user_id).await?;
        if active >= self.config.max_total_queue_size {
            return Err(SubmitError::QuotaExceeded {
                active,
                limit: self.config.max_total_queue_size,
            });
        }

        let pending_before = self.store.count_pending_for_user(user_id).await?;

        let job = self
            .store
            .insert(NewJob {
                user_id: user_id.to_string(),
                title,
                payload,
            })
            .await?;

        let queue_position = pending_before + 1;
        let per_tick = self.config.max_concurrent_jobs.max(1);
        let estimated_wait_minutes =
            queue_position.div_ceil(per_tick) * self.config.average_job_minutes;

        metrics::inc_submitted(job.job_type.as_str());
        info!(
            job_id = %job.id,
            user_id = %user_id,
            job_type = %job.job_type,
            queue_position = queue_position,
            "Job queued"
        );

        self.scheduler.request_tick();

        Ok(SubmitReceipt {
            job_id: job.id,
            queue_position,
            estimated_wait_minutes,
        })
    }

    /// Validates the request and builds the persisted payload.
    ///
    /// For YouTube submissions the metadata fetch happens here, eagerly:
    /// an unresolvable source fails the submission synchronously and the
    /// fetched title pre-populates the job listing.
    async fn build_payload(
        &self,
        request: SubmitRequest,
    ) -> Result<(String, JobPayload), SubmitError> {
        match request {
            SubmitRequest::Youtube { url, config } => {
                let url = url.trim().to_string();
                if url.is_empty() {
                    return Err(SubmitError::Validation("video URL must not be empty".into()));
                }

                let metadata = self.source.fetch_metadata(&url).await?;
                let title = metadata.title.clone();

                Ok((
                    title,
                    JobPayload::Youtube {
                        url,
                        video_id: metadata.id,
                        video_title: metadata.title,
                        duration_label: metadata.duration_label,
                        config,
                    },
                ))
            }
            SubmitRequest::Upload {
                file_name,
                content_type,
                data,
                config,
            } => {
                if file_name.trim().is_empty() {
                    return Err(SubmitError::Validation("file name must not be empty".into()));
                }
                if data.is_empty() {
                    return Err(SubmitError::Validation("upload must not be empty".into()));
                }

                Ok((
                    file_name.clone(),
                    JobPayload::Upload {
                        file_name,
                        content_type,
                        data_base64: BASE64_STANDARD.encode(&data),
                        config,
                    },
                ))
            }
            SubmitRequest::Transcript { text, config } => {
                if text.trim().is_empty() {
                    return Err(SubmitError::Validation(
                        "transcript text must not be empty".into(),
                    ));
                }

                Ok((transcript_title(&text), JobPayload::Transcript { text, config }))
            }
        }
    }
}

/// Derives a listing title from the first line of a transcript.
fn transcript_title(text: &str) -> String {
    let first_line = text.trim().lines().next().unwrap_or_default().trim();
    let mut title: String = first_line.chars().take(TRANSCRIPT_TITLE_CHARS).collect();
    if first_line.chars().count() > TRANSCRIPT_TITLE_CHARS {
        title.push_str("...");
    }
    if title.is_empty() {
        title.push_str("Pasted transcript");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_title_short_text() {
        assert_eq!(transcript_title("Hello world\nmore text"), "Hello world");
    }

    #[test]
    fn test_transcript_title_truncates() {
        let text = "x".repeat(100);
        let title = transcript_title(&text);
        assert_eq!(title.chars().count(), TRANSCRIPT_TITLE_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_transcript_title_empty_falls_back() {
        assert_eq!(transcript_title("   \n  "), "Pasted transcript");
    }
}
