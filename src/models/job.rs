use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use uuid::Uuid;

use crate::models::asset::{MediaType, PlatformIds};
use crate::models::batch::BatchRow;
use crate::models::review::{AdCopy, ComplianceVerdict, DomainVerdict};

/// A working stage of the pipeline, i.e. a non-terminal status past `queued`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Analyzing,
    WritingCopy,
    ReviewingCopy,
    Publishing,
    SyncingRecord,
}

/// Status of one job. Terminal variants carry their outcome payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Display, IntoStaticStr)]
#[serde(tag = "state", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Analyzing,
    WritingCopy,
    ReviewingCopy,
    Publishing,
    SyncingRecord,
    Completed,
    Failed {
        /// `None` when the row was rejected before any stage ran.
        stage: Option<Stage>,
        error: String,
    },
    Skipped {
        reason: String,
    },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed { .. } | JobStatus::Skipped { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        self.into()
    }

    /// The stage this status represents, if it is a working stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            JobStatus::Analyzing => Some(Stage::Analyzing),
            JobStatus::WritingCopy => Some(Stage::WritingCopy),
            JobStatus::ReviewingCopy => Some(Stage::ReviewingCopy),
            JobStatus::Publishing => Some(Stage::Publishing),
            JobStatus::SyncingRecord => Some(Stage::SyncingRecord),
            _ => None,
        }
    }

    /// Edges of the job state machine.
    ///
    /// `reviewing_copy -> completed` is the dry-run exit. Nothing loops back
    /// to `writing_copy`.
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        use JobStatus::*;

        if self.is_terminal() {
            return false;
        }
        match next {
            Failed { .. } | Skipped { .. } => true,
            _ => matches!(
                (self, next),
                (Queued, Analyzing)
                    | (Analyzing, WritingCopy)
                    | (WritingCopy, ReviewingCopy)
                    | (ReviewingCopy, Publishing)
                    | (ReviewingCopy, Completed)
                    | (Publishing, SyncingRecord)
                    | (SyncingRecord, Completed)
            ),
        }
    }
}

impl From<Stage> for JobStatus {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Analyzing => JobStatus::Analyzing,
            Stage::WritingCopy => JobStatus::WritingCopy,
            Stage::ReviewingCopy => JobStatus::ReviewingCopy,
            Stage::Publishing => JobStatus::Publishing,
            Stage::SyncingRecord => JobStatus::SyncingRecord,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub to: &'static str,
}

/// One entry of a job's status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: String,
    pub at: DateTime<Utc>,
}

/// One asset's pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub source_ref: String,

    // Classification tags, used as prompt context
    pub angle: String,
    pub format: String,
    pub messenger: String,
    pub media_type: Option<MediaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_set_id: Option<String>,

    pub status: JobStatus,
    pub error: Option<String>,
    pub retry_count: u32,

    pub staged_asset_path: Option<String>,
    pub analysis: Option<serde_json::Value>,
    pub draft_copy: Option<AdCopy>,
    pub final_copy: Option<AdCopy>,
    pub compliance_verdict: Option<ComplianceVerdict>,
    pub domain_verdict: Option<DomainVerdict>,
    pub copy_revised: bool,
    pub platform_ids: Option<PlatformIds>,

    /// Non-fatal problems recorded without changing status.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub history: Vec<StatusChange>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job for a batch row, under an id reserved when the
    /// batch was prepared.
    ///
    /// An unparseable media type is kept as `None`; row validation rejects
    /// it before the job is admitted.
    pub fn from_row(id: Uuid, batch_id: Uuid, row: &BatchRow) -> Self {
        let now = Utc::now();
        Self {
            id,
            batch_id,
            source_ref: row.source_ref.clone(),
            angle: row.angle.clone(),
            format: row.format.clone(),
            messenger: row.messenger.clone(),
            media_type: row.media_type.parse().ok(),
            ad_set_id: row.ad_set_id.clone(),
            status: JobStatus::Queued,
            error: None,
            retry_count: 0,
            staged_asset_path: None,
            analysis: None,
            draft_copy: None,
            final_copy: None,
            compliance_verdict: None,
            domain_verdict: None,
            copy_revised: false,
            platform_ids: None,
            warnings: Vec::new(),
            history: vec![StatusChange {
                status: JobStatus::Queued.label().to_string(),
                at: now,
            }],
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `next`, keeping timestamps and `error` consistent with it.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(&next) {
            return Err(InvalidTransition {
                from: self.status.label(),
                to: next.label(),
            });
        }

        let now = Utc::now();
        if next == JobStatus::Analyzing {
            self.started_at = Some(now);
        }
        if let JobStatus::Failed { error, .. } = &next {
            self.error = Some(error.clone());
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }

        self.history.push(StatusChange {
            status: next.label().to_string(),
            at: now,
        });
        self.status = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn status_path(&self) -> Vec<&str> {
        self.history.iter().map(|c| c.status.as_str()).collect()
    }
}
