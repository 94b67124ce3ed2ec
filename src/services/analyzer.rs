use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;

use crate::config::PolicyConfig;
use crate::error::ExternalError;
use crate::models::asset::MediaType;
use crate::pipeline::collaborators::{AnalysisRequest, AssetStore, MediaAnalyzer};
use crate::services::llm::{ContentPart, FileData, ImageUrl, LlmClient};

const SERVICE: &str = "media analyzer";

const ANALYSIS_PROMPT: &str = concat!(
    "You analyze creative assets for direct-response ads. ",
    "Describe the asset as JSON with these fields: ",
    "summary (one paragraph), hook (what grabs attention in the first seconds), ",
    "visual_elements (array of strings), spoken_or_on_screen_text (array of strings), ",
    "product_mentions (array of strings), tone, target_audience, ",
    "claims_made (array of strings, verbatim where possible). ",
    "Return ONLY valid JSON with these exact field names."
);

/// Media analyzer backed by a multimodal LLM, guarded by the policy's cost
/// ceiling and supported media types.
pub struct LlmMediaAnalyzer {
    llm: Arc<LlmClient>,
    store: Arc<dyn AssetStore>,
    policy: Arc<PolicyConfig>,
}

impl LlmMediaAnalyzer {
    pub fn new(llm: Arc<LlmClient>, store: Arc<dyn AssetStore>, policy: Arc<PolicyConfig>) -> Self {
        Self { llm, store, policy }
    }

    /// Reject assets the policy says we must not pay for.
    pub fn guard(&self, media_type: MediaType, size_bytes: u64) -> Result<(), ExternalError> {
        if !self.policy.supports(media_type) {
            return Err(ExternalError::NotAnalyzable(format!(
                "media type '{}' is not enabled",
                media_type
            )));
        }
        if let Some(reason) = self.policy.cost_guard.check(size_bytes) {
            return Err(ExternalError::CostGuardRejected(reason));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaAnalyzer for LlmMediaAnalyzer {
    fn precheck(&self, media_type: MediaType, size_bytes: u64) -> Result<(), ExternalError> {
        self.guard(media_type, size_bytes)
    }

    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<serde_json::Value, ExternalError> {
        self.guard(request.media_type, request.size_hint)?;

        let bytes = self.store.fetch(request.path).await?;
        let data_url = format!(
            "data:{};base64,{}",
            request.content_type,
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );

        let media = match request.media_type {
            MediaType::Image => ContentPart::ImageUrl {
                image_url: ImageUrl { url: data_url },
            },
            MediaType::Video => ContentPart::File {
                file: FileData {
                    filename: request
                        .path
                        .rsplit('/')
                        .next()
                        .unwrap_or(request.path)
                        .to_string(),
                    file_data: data_url,
                },
            },
        };

        let analysis: serde_json::Value = self
            .llm
            .complete_json(
                SERVICE,
                ANALYSIS_PROMPT,
                vec![
                    ContentPart::text(format!("Analyze this {}.", request.media_type)),
                    media,
                ],
                0.2,
            )
            .await?;

        if !analysis.is_object() {
            return Err(ExternalError::transient(SERVICE, "analysis was not a JSON object"));
        }
        Ok(analysis)
    }
}
