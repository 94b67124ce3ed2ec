use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

use crate::error::ExternalError;
use crate::models::asset::ResolvedAsset;
use crate::pipeline::collaborators::AssetResolver;

const SERVICE: &str = "asset source";

/// Downloads assets referenced by http(s) URLs.
pub struct HttpAssetResolver {
    http: Client,
    max_bytes: u64,
}

impl HttpAssetResolver {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ad-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, max_bytes })
    }
}

/// Content type of a downloaded asset: the header when it names image or
/// video media, otherwise sniffed from the bytes.
pub fn detect_content_type(header: Option<&str>, bytes: &[u8]) -> Option<String> {
    let declared = header
        .and_then(|h| h.split(';').next())
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| h.starts_with("image/") || h.starts_with("video/"));
    if declared.is_some() {
        return declared;
    }

    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type().to_string());
    }
    // ISO base media files carry "ftyp" at offset 4.
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        let brand = &bytes[8..12];
        let mime = if brand == b"qt  " { "video/quicktime" } else { "video/mp4" };
        return Some(mime.to_string());
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm".to_string());
    }
    None
}

#[async_trait]
impl AssetResolver for HttpAssetResolver {
    async fn resolve(&self, source_ref: &str) -> Result<ResolvedAsset, ExternalError> {
        let reference = source_ref.trim();
        if !(reference.starts_with("http://") || reference.starts_with("https://")) {
            return Err(ExternalError::NotAnalyzable(format!(
                "unsupported source reference '{reference}'"
            )));
        }

        let response = self
            .http
            .get(reference)
            .send()
            .await
            .map_err(|e| ExternalError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::from_status(SERVICE, status, &body));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(ExternalError::CostGuardRejected(format!(
                    "asset is {len} bytes, limit is {}",
                    self.max_bytes
                )));
            }
        }

        let header = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExternalError::from_reqwest(SERVICE, e))?;

        let content_type = detect_content_type(header.as_deref(), &bytes).ok_or_else(|| {
            ExternalError::NotAnalyzable(format!("'{reference}' is not an image or video"))
        })?;

        tracing::debug!(
            source_ref = reference,
            content_type = %content_type,
            size = bytes.len(),
            "Asset resolved"
        );

        Ok(ResolvedAsset {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
