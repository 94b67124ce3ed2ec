use async_trait::async_trait;
use std::sync::Arc;

use crate::config::PolicyConfig;
use crate::error::ExternalError;
use crate::models::review::AdCopy;
use crate::pipeline::collaborators::{CopyBrief, CopyGenerator};
use crate::services::llm::{ContentPart, LlmClient};

const SERVICE: &str = "copy generator";

/// Drafts primary text and headline from the asset analysis and row tags.
pub struct LlmCopyGenerator {
    llm: Arc<LlmClient>,
    policy: Arc<PolicyConfig>,
}

impl LlmCopyGenerator {
    pub fn new(llm: Arc<LlmClient>, policy: Arc<PolicyConfig>) -> Self {
        Self { llm, policy }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::from(concat!(
            "You write direct-response ad copy for paid social. ",
            "Write one primary text (2-5 short sentences, conversational) and one headline ",
            "(under 40 characters) that match the creative. ",
            "Return ONLY valid JSON: {\"primary_text\": string, \"headline\": string}.\n"
        ));

        if !self.policy.banned_phrases.is_empty() {
            prompt.push_str("Never use these phrases: ");
            let phrases: Vec<&str> = self
                .policy
                .banned_phrases
                .iter()
                .map(|b| b.phrase.as_str())
                .collect();
            prompt.push_str(&phrases.join("; "));
            prompt.push('\n');
        }
        if !self.policy.approved_claims.is_empty() {
            prompt.push_str("Only make claims from this approved list, worded as given:\n");
            for claim in &self.policy.approved_claims {
                prompt.push_str("- ");
                prompt.push_str(claim);
                prompt.push('\n');
            }
        }
        prompt
    }
}

/// User message describing the creative and the angle to write for.
pub fn brief_message(brief: &CopyBrief<'_>) -> String {
    let mut message = format!("Media type: {}\n", brief.media_type);
    for (label, value) in [
        ("Angle", brief.angle),
        ("Format", brief.format),
        ("Messenger", brief.messenger),
    ] {
        if !value.is_empty() {
            message.push_str(&format!("{label}: {value}\n"));
        }
    }
    message.push_str("Creative analysis:\n");
    message.push_str(&serde_json::to_string_pretty(brief.analysis).unwrap_or_default());
    message
}

#[async_trait]
impl CopyGenerator for LlmCopyGenerator {
    async fn draft(&self, brief: &CopyBrief<'_>) -> Result<AdCopy, ExternalError> {
        let copy: AdCopy = self
            .llm
            .complete_json(
                SERVICE,
                &self.system_prompt(),
                vec![ContentPart::text(brief_message(brief))],
                0.7,
            )
            .await?;

        if copy.primary_text.trim().is_empty() || copy.headline.trim().is_empty() {
            return Err(ExternalError::transient(SERVICE, "draft had empty fields"));
        }
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::asset::MediaType;

    #[test]
    fn test_brief_message_skips_empty_tags() {
        let analysis = serde_json::json!({"hook": "before/after"});
        let brief = CopyBrief {
            analysis: &analysis,
            angle: "social proof",
            format: "",
            messenger: "customer",
            media_type: MediaType::Video,
        };
        let message = brief_message(&brief);
        assert!(message.starts_with("Media type: video"));
        assert!(message.contains("Angle: social proof"));
        assert!(!message.contains("Format:"));
        assert!(message.contains("before/after"));
    }
}
