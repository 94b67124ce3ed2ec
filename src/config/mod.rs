use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub mod policy;

pub use policy::{BannedPhrase, CostGuard, PolicyConfig};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the batch CLI.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// OpenAI-compatible API base URL (e.g., "https://api.openai.com/v1")
    pub llm_api_base: String,

    /// Bearer token for the LLM API
    pub llm_api_key: String,

    /// Model used for analysis, copywriting, review and revision
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// R2 bucket name for staged assets
    pub r2_bucket: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// Ads platform Graph API base (e.g., "https://graph.facebook.com/v19.0")
    pub ads_api_base: String,

    /// Ads platform access token
    pub ads_access_token: String,

    /// Ad account ID, without the `act_` prefix
    pub ads_account_id: String,

    /// Page the ads are published under
    pub ads_page_id: String,

    /// Default ad set; rows may override it
    pub ads_ad_set_id: String,

    /// Landing page for published ads
    pub ads_link_url: String,

    /// PostgreSQL connection string for the record sync table
    pub database_url: String,

    /// Path to the policy JSON (banned phrases, approved claims, cost guard)
    #[serde(default)]
    pub policy_path: Option<String>,

    /// Maximum jobs in flight per batch
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Maximum concurrent media analyzer calls across the process
    #[serde(default = "default_analyzer_concurrency")]
    pub analyzer_concurrency: usize,

    /// Retry budget per job, shared across stages
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Per-call timeout for external HTTP collaborators
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Dry-run default for batches that do not set `dry_run` themselves
    #[serde(default)]
    pub dry_run: bool,

    /// Settled batch results the server keeps for lookups, oldest evicted first
    #[serde(default = "default_settled_batch_capacity")]
    pub settled_batch_capacity: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_batch_concurrency() -> usize {
    3
}

fn default_analyzer_concurrency() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn default_http_timeout_secs() -> u64 {
    60
}

fn default_settled_batch_capacity() -> usize {
    100
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Load the policy file if configured, otherwise the built-in policy.
    pub fn load_policy(&self) -> Result<PolicyConfig, ConfigError> {
        match &self.policy_path {
            Some(path) => PolicyConfig::from_file(Path::new(path)),
            None => Ok(PolicyConfig::default()),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            batch_concurrency: self.batch_concurrency,
            analyzer_concurrency: self.analyzer_concurrency,
            max_retries: self.max_retries,
            retry_base: Duration::from_millis(self.retry_base_ms),
            retry_max: Duration::from_millis(self.retry_max_ms),
            dry_run: self.dry_run,
        }
    }
}

/// Tunables the pipeline core needs, independent of any collaborator.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_concurrency: usize,
    pub analyzer_concurrency: usize,
    pub max_retries: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub dry_run: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_concurrency: default_batch_concurrency(),
            analyzer_concurrency: default_analyzer_concurrency(),
            max_retries: default_max_retries(),
            retry_base: Duration::from_millis(default_retry_base_ms()),
            retry_max: Duration::from_millis(default_retry_max_ms()),
            dry_run: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read policy file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid policy: {0}")]
    Invalid(String),
}
