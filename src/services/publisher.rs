use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ExternalError;
use crate::models::asset::{MediaType, PlatformIds, StagedMedia, Targeting};
use crate::models::review::AdCopy;
use crate::pipeline::collaborators::{AdsPublisher, AssetStore};

const SERVICE: &str = "ads platform";

/// Every ad is created in this state and left for a human to enable.
pub const AD_STATUS: &str = "PAUSED";

/// Publisher for a Graph-style ads API: upload media, create a creative,
/// then create the ad paused inside the target ad set.
pub struct GraphAdsPublisher {
    http: Client,
    api_base: String,
    access_token: String,
    account_id: String,
    store: Arc<dyn AssetStore>,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct ImageUploadResponse {
    images: HashMap<String, ImageHash>,
}

#[derive(Deserialize)]
struct ImageHash {
    hash: String,
}

/// Media reference accepted by the creative endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadedMedia {
    ImageHash(String),
    VideoId(String),
}

impl GraphAdsPublisher {
    pub fn new(
        api_base: &str,
        access_token: &str,
        account_id: &str,
        store: Arc<dyn AssetStore>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            account_id: account_id.trim_start_matches("act_").to_string(),
            store,
        })
    }

    fn edge(&self, name: &str) -> String {
        format!("{}/act_{}/{}", self.api_base, self.account_id, name)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ExternalError> {
        let response = request
            .query(&[("access_token", self.access_token.as_str())])
            .send()
            .await
            .map_err(|e| ExternalError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::from_status(SERVICE, status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| ExternalError::from_reqwest(SERVICE, e))
    }

    async fn upload(&self, media: &StagedMedia) -> Result<UploadedMedia, ExternalError> {
        let bytes = self.store.fetch(&media.path).await?;
        let filename = media
            .path
            .rsplit('/')
            .next()
            .unwrap_or(&media.path)
            .to_string();

        match media.media_type {
            MediaType::Image => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                let uploaded: ImageUploadResponse = self
                    .send(self.http.post(self.edge("adimages")).form(&[("bytes", encoded)]))
                    .await?;
                uploaded
                    .images
                    .into_values()
                    .next()
                    .map(|i| UploadedMedia::ImageHash(i.hash))
                    .ok_or_else(|| ExternalError::non_retryable(SERVICE, "image upload returned no hash"))
            }
            MediaType::Video => {
                let form = Form::new().part("source", Part::bytes(bytes).file_name(filename));
                let uploaded: IdResponse = self
                    .send(self.http.post(self.edge("advideos")).multipart(form))
                    .await?;
                Ok(UploadedMedia::VideoId(uploaded.id))
            }
        }
    }
}

/// `object_story_spec` for a creative built from the copy and uploaded media.
pub fn story_spec(copy: &AdCopy, media: &UploadedMedia, targeting: &Targeting) -> Value {
    match media {
        UploadedMedia::ImageHash(hash) => json!({
            "page_id": targeting.page_id,
            "link_data": {
                "image_hash": hash,
                "link": targeting.link_url,
                "message": copy.primary_text,
                "name": copy.headline,
            }
        }),
        UploadedMedia::VideoId(id) => json!({
            "page_id": targeting.page_id,
            "video_data": {
                "video_id": id,
                "message": copy.primary_text,
                "title": copy.headline,
                "call_to_action": {
                    "type": "LEARN_MORE",
                    "value": { "link": targeting.link_url }
                }
            }
        }),
    }
}

#[async_trait]
impl AdsPublisher for GraphAdsPublisher {
    async fn publish(
        &self,
        copy: &AdCopy,
        media: &StagedMedia,
        targeting: &Targeting,
    ) -> Result<PlatformIds, ExternalError> {
        let uploaded = self.upload(media).await?;

        let creative: IdResponse = self
            .send(self.http.post(self.edge("adcreatives")).json(&json!({
                "name": copy.headline,
                "object_story_spec": story_spec(copy, &uploaded, targeting),
            })))
            .await?;

        let ad: IdResponse = self
            .send(self.http.post(self.edge("ads")).json(&json!({
                "name": copy.headline,
                "adset_id": targeting.ad_set_id,
                "creative": { "creative_id": creative.id },
                "status": AD_STATUS,
            })))
            .await?;

        tracing::info!(
            creative_id = %creative.id,
            ad_id = %ad.id,
            ad_set_id = %targeting.ad_set_id,
            "Ad created paused"
        );

        Ok(PlatformIds {
            creative_id: creative.id,
            ad_id: ad.id,
        })
    }
}
