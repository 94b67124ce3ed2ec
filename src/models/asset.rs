use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MediaType {
    Image,
    Video,
}

/// Asset bytes fetched from a source reference.
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ResolvedAsset {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// File extension derived from the content type.
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "video/mp4" => "mp4",
            "video/quicktime" => "mov",
            "video/webm" => "webm",
            _ => "bin",
        }
    }
}

/// Fields that determine where a staged asset lands.
#[derive(Debug, Clone)]
pub struct AssetKey {
    pub batch_id: Uuid,
    pub job_id: Uuid,
    pub source_ref: String,
    pub extension: &'static str,
}

impl AssetKey {
    /// Object key: `{batch_id}/{job_id}/{slug}.{ext}`.
    pub fn object_key(&self) -> String {
        format!(
            "{}/{}/{}.{}",
            self.batch_id,
            self.job_id,
            slug(&self.source_ref),
            self.extension
        )
    }
}

/// Last path segment of a reference, reduced to `[a-z0-9-]`.
fn slug(source_ref: &str) -> String {
    let tail = source_ref
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(source_ref);
    let stem = tail.split(['?', '#']).next().unwrap_or(tail);
    let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(stem);

    let mut out = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_matches('-');
    if out.is_empty() {
        "asset".to_string()
    } else {
        out.chars().take(64).collect()
    }
}

/// Media reference handed to the ads publisher.
#[derive(Debug, Clone, Serialize)]
pub struct StagedMedia {
    pub path: String,
    pub media_type: MediaType,
}

/// Where a published ad is placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Targeting {
    pub ad_set_id: String,
    pub page_id: String,
    pub link_url: String,
}

/// Identifiers of the paused objects created on the ads platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformIds {
    pub creative_id: String,
    pub ad_id: String,
}
