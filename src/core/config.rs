use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use super::error::ConfigError;
use super::redact::Redacted;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub mapping: MappingConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Prefix mapping behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Bucket every listing runs against.
    pub bucket: String,
    /// Request path prefix that routes to the map endpoint, e.g. `/map/`.
    #[serde(default)]
    pub map_prefix: String,
    /// Query parameter carrying comma-separated extra resources. Empty disables injection.
    #[serde(default)]
    pub extra_resources_param: String,
    /// Standard filename filter. Empty matches every filename.
    #[serde(default)]
    pub regex_filter: String,
    /// Filter used for prefixes carrying the `__HD` marker.
    #[serde(default)]
    pub regex_hd_filter: String,
    /// Alternate locations queried with the request's last path segment.
    #[serde(default)]
    pub extra_prefixes: Vec<String>,
    /// List physical prefixes concurrently instead of one after another.
    #[serde(default)]
    pub parallel_listing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `s3` or `memory`.
    pub backend: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: Redacted<String>,
    /// Path-style addressing (`{endpoint}/{bucket}/{key}`) for listings.
    /// Signed URLs are always path-style.
    #[serde(default = "default_path_style")]
    pub path_style: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_path_style() -> bool {
    true
}
fn default_request_timeout_secs() -> u64 {
    2
}
fn default_connect_timeout_secs() -> u64 {
    2
}

/// Signed URL generation. Signing is enabled only when both `access_id` and
/// `private_key` are set.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub access_id: String,
    /// Base64-encoded private key material.
    #[serde(default)]
    pub private_key: Redacted<String>,
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,
}

fn default_expiration_secs() -> u64 {
    20 * 60
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            access_id: String::new(),
            private_key: Redacted::default(),
            expiration_secs: default_expiration_secs(),
        }
    }
}

impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerConfig")
            .field("access_id", &self.access_id)
            .field("private_key", &self.private_key)
            .field("expiration_secs", &self.expiration_secs)
            .finish()
    }
}

impl SignerConfig {
    /// Decode the base64 private key. `Ok(None)` means no key is configured.
    pub fn decoded_private_key(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let encoded = self.private_key.expose().trim();
        if encoded.is_empty() {
            return Ok(None);
        }
        BASE64
            .decode(encoded)
            .map(Some)
            .map_err(|e| ConfigError::InvalidPrivateKey {
                reason: e.to_string(),
            })
    }

    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }
}

/// Bounded retry of listing passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further retry. 0 disables backoff.
    #[serde(default)]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Retry every listing error, including ones the backend reports as
    /// permanent (bad credentials, missing bucket).
    #[serde(default)]
    pub retry_all_errors: bool,
}

fn default_max_backoff_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 0,
            max_backoff_ms: default_max_backoff_ms(),
            retry_all_errors: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

impl AppConfig {
    /// Load configuration with layered overrides:
    /// 1. config/default.toml
    /// 2. config/{env}.toml (based on CLIPMAP_ENV)
    /// 3. Environment variables (CLIPMAP_* prefix)
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("config"), |key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::load`] but reading files from `dir` and variables
    /// through `env`.
    pub fn load_from<F>(dir: &Path, env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_path = dir.join("default.toml");
        let default_content = std::fs::read_to_string(&default_path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", default_path.display(), e))?;

        let mut config: AppConfig = toml::from_str(&default_content)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", default_path.display(), e))?;

        // Layer 2: environment-specific file replaces the defaults
        let env_name = env("CLIPMAP_ENV").unwrap_or_else(|| "development".to_string());
        let env_path = dir.join(format!("{}.toml", env_name));
        if let Ok(env_content) = std::fs::read_to_string(&env_path) {
            config = toml::from_str(&env_content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", env_path.display(), e))?;
        }

        // Layer 3: environment variable overrides (selected keys)
        config.apply_env_overrides(env);

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("CLIPMAP_SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(port) = env("CLIPMAP_SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(v) = env("CLIPMAP_BUCKET_NAME") {
            self.mapping.bucket = v;
        }
        if let Some(v) = env("CLIPMAP_MAP_PREFIX") {
            self.mapping.map_prefix = v;
        }
        if let Some(v) = env("CLIPMAP_EXTRA_RESOURCES_TOKEN") {
            self.mapping.extra_resources_param = v;
        }
        if let Some(v) = env("CLIPMAP_MAP_REGEX_FILTER") {
            self.mapping.regex_filter = v;
        }
        if let Some(v) = env("CLIPMAP_MAP_REGEX_HD_FILTER") {
            self.mapping.regex_hd_filter = v;
        }
        if let Some(v) = env("CLIPMAP_MAP_EXTRA_PREFIXES") {
            self.mapping.extra_prefixes = split_list(&v);
        }
        if let Some(v) = env("CLIPMAP_STORAGE_BACKEND") {
            self.storage.backend = v;
        }
        if let Some(v) = env("CLIPMAP_STORAGE_ENDPOINT") {
            self.storage.endpoint = v;
        }
        if let Some(v) = env("CLIPMAP_STORAGE_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = env("CLIPMAP_STORAGE_ACCESS_KEY_ID") {
            self.storage.access_key_id = v;
        }
        if let Some(v) = env("CLIPMAP_STORAGE_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Redacted::new(v);
        }
        if let Some(v) = env("CLIPMAP_STORAGE_PATH_STYLE").and_then(|v| parse_bool(&v)) {
            self.storage.path_style = v;
        }
        if let Some(secs) = env("CLIPMAP_STORAGE_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            self.storage.request_timeout_secs = secs;
        }
        if let Some(secs) = env("CLIPMAP_STORAGE_CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            self.storage.connect_timeout_secs = secs;
        }
        if let Some(attempts) = env("CLIPMAP_RETRY_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.retry.max_attempts = attempts;
        }
        if let Some(v) = env("CLIPMAP_RETRY_ALL_ERRORS").and_then(|v| parse_bool(&v)) {
            self.retry.retry_all_errors = v;
        }
        if let Some(v) = env("CLIPMAP_SIGNER_ACCESS_ID") {
            self.signer.access_id = v;
        }
        if let Some(v) = env("CLIPMAP_SIGNER_PRIVATE_KEY") {
            self.signer.private_key = Redacted::new(v);
        }
        if let Some(secs) = env("CLIPMAP_SIGNER_EXPIRATION_SECS").and_then(|v| v.parse().ok()) {
            self.signer.expiration_secs = secs;
        }
        if let Some(v) = env("CLIPMAP_LOG_LEVEL") {
            self.observability.log_level = v;
        }
    }

    /// Reject configuration that could only fail at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mapping.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        compile_pattern("mapping.regex_filter", &self.mapping.regex_filter)?;
        compile_pattern("mapping.regex_hd_filter", &self.mapping.regex_hd_filter)?;
        self.signer.decoded_private_key()?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if !matches!(self.storage.backend.as_str(), "s3" | "memory") {
            return Err(ConfigError::InvalidValue {
                field: "storage.backend",
                reason: format!("unknown backend {:?}", self.storage.backend),
            });
        }
        if self.is_signing_enabled() && self.signer.expiration_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "signer.expiration_secs",
                reason: "must be greater than zero when signing is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Signing needs both an access identity and key material.
    pub fn is_signing_enabled(&self) -> bool {
        !self.signer.access_id.is_empty() && !self.signer.private_key.expose().trim().is_empty()
    }
}

/// Compile a filter pattern, naming the config field on failure.
pub fn compile_pattern(field: &'static str, pattern: &str) -> Result<regex::Regex, ConfigError> {
    regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        field,
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            mapping: MappingConfig {
                bucket: "media".to_string(),
                map_prefix: "/map/".to_string(),
                extra_resources_param: String::new(),
                regex_filter: String::new(),
                regex_hd_filter: String::new(),
                extra_prefixes: Vec::new(),
                parallel_listing: false,
            },
            storage: StorageConfig {
                backend: "s3".to_string(),
                endpoint: String::new(),
                region: default_region(),
                access_key_id: String::new(),
                secret_access_key: Redacted::default(),
                path_style: default_path_style(),
                request_timeout_secs: default_request_timeout_secs(),
                connect_timeout_secs: default_connect_timeout_secs(),
            },
            signer: SignerConfig::default(),
            retry: RetryConfig::default(),
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                log_format: "text".to_string(),
                metrics_enabled: true,
            },
        }
    }
}
