//! Dual-reviewer consensus and the single revision pass.
//!
//! Compliance and domain reviewers run concurrently on the same draft. If
//! either wants changes, the reviser is called exactly once and its output
//! is final. The revised copy is not reviewed again.

use std::sync::Arc;
use strsim::jaro_winkler;

use crate::error::PipelineError;
use crate::models::job::Stage;
use crate::models::review::{revision_required, AdCopy, ComplianceVerdict, DomainVerdict};
use crate::pipeline::collaborators::{
    ClaimRevision, ComplianceReviewer, DomainReviewer, RevisionRequest, Reviser,
};
use crate::pipeline::retry::{RetryBudget, RetryPolicy};

/// Minimum similarity for an approved claim to be suggested as a replacement.
const APPROVED_CLAIM_THRESHOLD: f64 = 0.6;

/// Result of the review stage.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub final_copy: AdCopy,
    pub compliance: ComplianceVerdict,
    pub domain: DomainVerdict,
    pub revised: bool,
    /// Flagged text still present after revision.
    pub residual_flags: Vec<String>,
}

#[derive(Clone)]
pub struct ReviewConsensus {
    compliance: Arc<dyn ComplianceReviewer>,
    domain: Arc<dyn DomainReviewer>,
    reviser: Arc<dyn Reviser>,
    approved_claims: Arc<Vec<String>>,
    retry: RetryPolicy,
}

impl ReviewConsensus {
    pub fn new(
        compliance: Arc<dyn ComplianceReviewer>,
        domain: Arc<dyn DomainReviewer>,
        reviser: Arc<dyn Reviser>,
        approved_claims: Vec<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            compliance,
            domain,
            reviser,
            approved_claims: Arc::new(approved_claims),
            retry,
        }
    }

    pub async fn review(
        &self,
        draft: &AdCopy,
        budget: &RetryBudget,
    ) -> Result<ReviewOutcome, PipelineError> {
        let compliance = &self.compliance;
        let domain = &self.domain;

        let (compliance_verdict, domain_verdict) = tokio::join!(
            self.retry.run(Stage::ReviewingCopy, budget, move || compliance.review(draft)),
            self.retry.run(Stage::ReviewingCopy, budget, move || domain.review(draft)),
        );
        let compliance_verdict = compliance_verdict?;
        let domain_verdict = domain_verdict?;

        tracing::debug!(
            compliance = %compliance_verdict.outcome,
            domain = %domain_verdict.outcome,
            flags = compliance_verdict.flags.len(),
            flagged_claims = domain_verdict.flagged_claims().count(),
            "Reviews complete"
        );

        if !revision_required(&compliance_verdict, &domain_verdict) {
            return Ok(ReviewOutcome {
                final_copy: draft.clone(),
                compliance: compliance_verdict,
                domain: domain_verdict,
                revised: false,
                residual_flags: Vec::new(),
            });
        }

        let request = self.revision_request(draft, &compliance_verdict, &domain_verdict);
        let reviser = &self.reviser;
        let request_ref = &request;
        let revised = self
            .retry
            .run(Stage::ReviewingCopy, budget, move || reviser.revise(request_ref))
            .await?;

        metrics::counter!("review_revisions_total").increment(1);

        let residual_flags: Vec<String> = compliance_verdict
            .flags
            .iter()
            .filter(|flag| revised.contains_ignore_case(&flag.quoted_text))
            .map(|flag| flag.quoted_text.clone())
            .collect();
        if !residual_flags.is_empty() {
            tracing::warn!(
                residual = ?residual_flags,
                "Revised copy still contains flagged text"
            );
        }

        Ok(ReviewOutcome {
            final_copy: revised,
            compliance: compliance_verdict,
            domain: domain_verdict,
            revised: true,
            residual_flags,
        })
    }

    fn revision_request(
        &self,
        draft: &AdCopy,
        compliance: &ComplianceVerdict,
        domain: &DomainVerdict,
    ) -> RevisionRequest {
        let claims = domain
            .flagged_claims()
            .map(|claim| ClaimRevision {
                preferred_replacement: closest_approved_claim(&claim.claim_text, &self.approved_claims)
                    .map(str::to_string),
                claim: claim.clone(),
            })
            .collect();

        RevisionRequest {
            draft: draft.clone(),
            flags: compliance.flags.clone(),
            claims,
            approved_claims: self.approved_claims.as_ref().clone(),
        }
    }
}

/// The approved phrasing closest to `claim_text`, if any is close enough.
pub fn closest_approved_claim<'a>(claim_text: &str, approved: &'a [String]) -> Option<&'a str> {
    let needle = claim_text.to_lowercase();
    approved
        .iter()
        .map(|candidate| (candidate, jaro_winkler(&needle, &candidate.to_lowercase())))
        .filter(|(_, score)| *score >= APPROVED_CLAIM_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate.as_str())
}
