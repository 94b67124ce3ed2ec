use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::asset::MediaType;
use crate::models::job::{Job, JobStatus};

/// One asset row submitted in a batch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchRow {
    #[garde(length(min = 1, max = 2048), custom(not_blank))]
    pub source_ref: String,

    #[serde(default)]
    #[garde(length(max = 100))]
    pub angle: String,

    #[serde(default)]
    #[garde(length(max = 100))]
    pub format: String,

    #[serde(default)]
    #[garde(length(max = 100))]
    pub messenger: String,

    #[garde(custom(known_media_type))]
    pub media_type: String,

    /// Overrides the configured ad set for this row.
    #[serde(default)]
    #[garde(length(min = 1, max = 64))]
    pub ad_set_id: Option<String>,
}

#[allow(clippy::ptr_arg)]
fn not_blank(value: &String, _: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

#[allow(clippy::ptr_arg)]
fn known_media_type(value: &String, _: &()) -> garde::Result {
    value
        .parse::<MediaType>()
        .map(|_| ())
        .map_err(|_| garde::Error::new(format!("unsupported media type '{value}'")))
}

/// Request to run a set of rows through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub rows: Vec<BatchRow>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

/// Terminal outcome of one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowResult {
    pub id: Uuid,
    pub source_ref: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&Job> for RowResult {
    fn from(job: &Job) -> Self {
        let reason = match &job.status {
            JobStatus::Skipped { reason } => Some(reason.clone()),
            _ => None,
        };
        Self {
            id: job.id,
            source_ref: job.source_ref.clone(),
            status: job.status.label().to_string(),
            error: job.error.clone(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let mut summary = Self {
            total: jobs.len(),
            ..Self::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Completed => summary.succeeded += 1,
                JobStatus::Failed { .. } => summary.failed += 1,
                JobStatus::Skipped { .. } => summary.skipped += 1,
                _ => {}
            }
        }
        summary
    }
}

/// Settled result of a batch, rows in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub dry_run: bool,
    pub rows: Vec<RowResult>,
    pub summary: BatchSummary,
    /// Terminal job snapshots, for audit after the registry releases them.
    pub jobs: Vec<Job>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn job(&self, job_id: Uuid) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(source_ref: &str, media_type: &str) -> BatchRow {
        BatchRow {
            source_ref: source_ref.to_string(),
            angle: String::new(),
            format: String::new(),
            messenger: String::new(),
            media_type: media_type.to_string(),
            ad_set_id: None,
        }
    }

    #[test]
    fn test_valid_row() {
        assert!(row("https://cdn.example.com/a.mp4", "video").validate().is_ok());
    }

    #[test]
    fn test_blank_source_ref_rejected() {
        let report = row("   ", "image").validate().unwrap_err();
        assert!(report.to_string().contains("source_ref"));
    }

    #[test]
    fn test_unknown_media_type_rejected() {
        let report = row("https://cdn.example.com/a.gif", "gif").validate().unwrap_err();
        assert!(report.to_string().contains("unsupported media type"));
    }

    #[test]
    fn test_row_defaults_from_json() {
        let row: BatchRow =
            serde_json::from_str(r#"{"source_ref": "s3://x/y.png", "media_type": "image"}"#)
                .unwrap();
        assert!(row.angle.is_empty());
        assert!(row.ad_set_id.is_none());
    }

    #[test]
    fn test_summary_counts() {
        let batch_id = Uuid::new_v4();
        let mut jobs: Vec<Job> = (0..4)
            .map(|_| Job::from_row(Uuid::new_v4(), batch_id, &row("https://x/a.png", "image")))
            .collect();
        jobs[0].status = JobStatus::Completed;
        jobs[1].status = JobStatus::Completed;
        jobs[2].status = JobStatus::Failed {
            stage: None,
            error: "bad".into(),
        };
        jobs[3].status = JobStatus::Skipped {
            reason: "cost".into(),
        };

        let summary = BatchSummary::from_jobs(&jobs);
        assert_eq!(
            summary,
            BatchSummary {
                total: 4,
                succeeded: 2,
                failed: 1,
                skipped: 1
            }
        );

        let skipped = RowResult::from(&jobs[3]);
        assert_eq!(skipped.status, "skipped");
        assert_eq!(skipped.reason.as_deref(), Some("cost"));
    }
}
