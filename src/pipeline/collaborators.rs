//! Contracts for the external services the pipeline drives.
//!
//! Every call may suspend and may fail with an [`ExternalError`]; the engine
//! wraps each one in the retry policy.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ExternalError;
use crate::models::asset::{AssetKey, MediaType, PlatformIds, ResolvedAsset, StagedMedia, Targeting};
use crate::models::review::{AdCopy, Claim, ComplianceFlag, ComplianceVerdict, DomainVerdict};

#[async_trait]
pub trait AssetResolver: Send + Sync {
    /// Fetch the asset behind a source reference. Fails `NotAnalyzable` if
    /// the reference matches no supported source.
    async fn resolve(&self, source_ref: &str) -> Result<ResolvedAsset, ExternalError>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Persist the asset and return its durable path.
    async fn store(&self, asset: &ResolvedAsset, key: &AssetKey) -> Result<String, ExternalError>;

    /// Read back a previously stored asset.
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, ExternalError>;
}

/// Input to the media analyzer.
#[derive(Debug, Clone)]
pub struct AnalysisRequest<'a> {
    pub path: &'a str,
    pub media_type: MediaType,
    pub content_type: &'a str,
    pub size_hint: u64,
}

#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    /// Local check run before the asset is staged. Fails like `analyze`
    /// would for assets that must not be analyzed at all.
    fn precheck(&self, _media_type: MediaType, _size_bytes: u64) -> Result<(), ExternalError> {
        Ok(())
    }

    /// Fails `CostGuardRejected` when the asset is over budget and
    /// `NotAnalyzable` for unsupported media.
    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<serde_json::Value, ExternalError>;
}

/// Prompt context for the copy generator.
#[derive(Debug, Clone, Serialize)]
pub struct CopyBrief<'a> {
    pub analysis: &'a serde_json::Value,
    pub angle: &'a str,
    pub format: &'a str,
    pub messenger: &'a str,
    pub media_type: MediaType,
}

#[async_trait]
pub trait CopyGenerator: Send + Sync {
    async fn draft(&self, brief: &CopyBrief<'_>) -> Result<AdCopy, ExternalError>;
}

#[async_trait]
pub trait ComplianceReviewer: Send + Sync {
    async fn review(&self, draft: &AdCopy) -> Result<ComplianceVerdict, ExternalError>;
}

#[async_trait]
pub trait DomainReviewer: Send + Sync {
    async fn review(&self, draft: &AdCopy) -> Result<DomainVerdict, ExternalError>;
}

/// A flagged claim and the approved phrasing preferred as its replacement.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimRevision {
    pub claim: Claim,
    pub preferred_replacement: Option<String>,
}

/// Everything the reviser is asked to fix in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct RevisionRequest {
    pub draft: AdCopy,
    pub flags: Vec<ComplianceFlag>,
    pub claims: Vec<ClaimRevision>,
    pub approved_claims: Vec<String>,
}

#[async_trait]
pub trait Reviser: Send + Sync {
    /// Rewrite the draft so flagged claims are replaced, never deleted.
    async fn revise(&self, request: &RevisionRequest) -> Result<AdCopy, ExternalError>;
}

#[async_trait]
pub trait AdsPublisher: Send + Sync {
    /// Create the ad objects. They must be created paused.
    async fn publish(
        &self,
        copy: &AdCopy,
        media: &StagedMedia,
        targeting: &Targeting,
    ) -> Result<PlatformIds, ExternalError>;
}

/// Row written to the external record after publishing.
#[derive(Debug, Clone, Serialize)]
pub struct AdRecord {
    pub job_id: Uuid,
    pub batch_id: Uuid,
    pub source_ref: String,
    pub copy: AdCopy,
    pub platform_ids: Option<PlatformIds>,
    pub status: String,
}

#[async_trait]
pub trait RecordSync: Send + Sync {
    async fn update(&self, record: &AdRecord) -> Result<(), ExternalError>;
}

/// The full collaborator set one pipeline context drives.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn AssetResolver>,
    pub store: Arc<dyn AssetStore>,
    pub analyzer: Arc<dyn MediaAnalyzer>,
    pub copywriter: Arc<dyn CopyGenerator>,
    pub compliance: Arc<dyn ComplianceReviewer>,
    pub domain: Arc<dyn DomainReviewer>,
    pub reviser: Arc<dyn Reviser>,
    pub publisher: Arc<dyn AdsPublisher>,
    pub record_sync: Arc<dyn RecordSync>,
}
