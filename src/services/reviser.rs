use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ExternalError;
use crate::models::review::AdCopy;
use crate::pipeline::collaborators::{RevisionRequest, Reviser};
use crate::services::llm::{ContentPart, LlmClient};

const SERVICE: &str = "reviser";

const REVISION_PROMPT: &str = concat!(
    "You revise ad copy so it passes policy and fact review. Rules:\n",
    "1. Replace every flagged phrase or claim with a compliant alternative. Never just delete it; ",
    "the sentence must still make its point.\n",
    "2. When a preferred replacement from the approved claims list is given, use it verbatim.\n",
    "3. Keep the original length within about 10% and keep its cadence and voice.\n",
    "4. Do not touch sentences that were not flagged.\n",
    "Return ONLY valid JSON: {\"primary_text\": string, \"headline\": string}."
);

/// Rewrites a flagged draft in one pass.
pub struct LlmReviser {
    llm: Arc<LlmClient>,
}

impl LlmReviser {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

/// User message listing the draft and each item to fix.
pub fn revision_message(request: &RevisionRequest) -> String {
    let mut message = format!(
        "Headline: {}\nPrimary text:\n{}\n\nFix the following:\n",
        request.draft.headline, request.draft.primary_text
    );

    for flag in &request.flags {
        message.push_str(&format!(
            "- [{}] \"{}\" ({})",
            flag.severity, flag.quoted_text, flag.rule
        ));
        if !flag.suggested_fix.is_empty() {
            message.push_str(&format!(" suggestion: {}", flag.suggested_fix));
        }
        message.push('\n');
    }

    for revision in &request.claims {
        let claim = &revision.claim;
        message.push_str(&format!("- [{}] claim \"{}\"", claim.accuracy, claim.claim_text));
        if let Some(issue) = &claim.issue {
            message.push_str(&format!(" issue: {issue}"));
        }
        match (&revision.preferred_replacement, &claim.fix) {
            (Some(approved), _) => message.push_str(&format!(" replace with: \"{approved}\"")),
            (None, Some(fix)) => message.push_str(&format!(" suggestion: {fix}")),
            (None, None) => {}
        }
        message.push('\n');
    }

    if !request.approved_claims.is_empty() {
        message.push_str("\nApproved claims:\n");
        for claim in &request.approved_claims {
            message.push_str(&format!("- {claim}\n"));
        }
    }
    message
}

#[async_trait]
impl Reviser for LlmReviser {
    async fn revise(&self, request: &RevisionRequest) -> Result<AdCopy, ExternalError> {
        let revised: AdCopy = self
            .llm
            .complete_json(
                SERVICE,
                REVISION_PROMPT,
                vec![ContentPart::text(revision_message(request))],
                0.3,
            )
            .await?;

        if revised.primary_text.trim().is_empty() {
            return Err(ExternalError::transient(SERVICE, "revision came back empty"));
        }
        Ok(revised)
    }
}
