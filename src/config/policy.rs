//! Declarative policy data: banned phrases, approved claims and the
//! analysis cost guard. Loaded once at start-up and shared read-only.

use garde::Validate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::ConfigError;
use crate::models::asset::MediaType;
use crate::models::review::Severity;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BannedPhrase {
    #[garde(length(min = 1, max = 200))]
    pub phrase: String,

    #[garde(length(min = 1, max = 100))]
    pub rule: String,

    #[garde(skip)]
    pub severity: Severity,
}

/// Ceiling on what a single analysis may cost before it is skipped.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CostGuard {
    #[garde(range(min = 1))]
    pub max_bytes: u64,

    #[garde(range(min = 0.0))]
    pub usd_per_megabyte: f64,

    #[garde(range(min = 0.0))]
    pub ceiling_usd: f64,
}

impl CostGuard {
    pub fn estimate_usd(&self, size_bytes: u64) -> f64 {
        size_bytes as f64 / (1024.0 * 1024.0) * self.usd_per_megabyte
    }

    /// Reason for rejecting an asset of this size, if it is over budget.
    pub fn check(&self, size_bytes: u64) -> Option<String> {
        if size_bytes > self.max_bytes {
            return Some(format!(
                "asset is {} bytes, limit is {} bytes",
                size_bytes, self.max_bytes
            ));
        }
        let estimate = self.estimate_usd(size_bytes);
        if estimate > self.ceiling_usd {
            return Some(format!(
                "estimated analysis cost ${:.2} exceeds ceiling ${:.2}",
                estimate, self.ceiling_usd
            ));
        }
        None
    }
}

impl Default for CostGuard {
    fn default() -> Self {
        Self {
            max_bytes: 200 * 1024 * 1024,
            usd_per_megabyte: 0.01,
            ceiling_usd: 1.50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PolicyConfig {
    #[serde(default)]
    #[garde(dive)]
    pub banned_phrases: Vec<BannedPhrase>,

    #[serde(default)]
    #[garde(inner(length(min = 1, max = 300)))]
    pub approved_claims: Vec<String>,

    #[serde(default)]
    #[garde(dive)]
    pub cost_guard: CostGuard,

    #[serde(default = "default_supported_media_types")]
    #[garde(length(min = 1))]
    pub supported_media_types: Vec<MediaType>,
}

fn default_supported_media_types() -> Vec<MediaType> {
    vec![MediaType::Image, MediaType::Video]
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let banned = |phrase: &str, rule: &str, severity| BannedPhrase {
            phrase: phrase.to_string(),
            rule: rule.to_string(),
            severity,
        };
        Self {
            banned_phrases: vec![
                banned("cure", "medical_claim", Severity::Red),
                banned("guaranteed results", "unrealistic_outcome", Severity::Red),
                banned("lose weight fast", "weight_loss_claim", Severity::Red),
                banned("miracle", "exaggerated_claim", Severity::Yellow),
                banned("#1", "unsubstantiated_superlative", Severity::Yellow),
            ],
            approved_claims: Vec::new(),
            cost_guard: CostGuard::default(),
            supported_media_types: default_supported_media_types(),
        }
    }
}

impl PolicyConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let policy = Self::from_json(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;

        tracing::info!(
            path = %path.display(),
            banned_phrases = policy.banned_phrases.len(),
            approved_claims = policy.approved_claims.len(),
            "Loaded policy"
        );
        Ok(policy)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let policy: PolicyConfig = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        policy
            .validate()
            .map_err(|report| ConfigError::Invalid(report.to_string()))?;
        Ok(policy)
    }

    pub fn supports(&self, media_type: MediaType) -> bool {
        self.supported_media_types.contains(&media_type)
    }
}
