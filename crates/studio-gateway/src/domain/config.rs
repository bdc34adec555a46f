//! Gateway configuration with validation.
//!
//! Every section is `#[serde(default)]` so a TOML file only has to name the
//! values it overrides. Provider credentials are allowed to be empty: an
//! unconfigured provider is reported at startup and surfaces as
//! `NotConfigured` when a request needs it.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Request and listing limits
    pub limits: LimitsConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Daily generation quota
    pub quota: QuotaConfig,
    /// Auth provider (and Google OAuth) configuration
    pub auth: AuthProviderConfig,
    /// Image generation provider configuration
    pub generation: GenerationConfig,
    /// Prompt enhancement provider configuration
    pub enhancement: EnhancementConfig,
    /// Object storage and image table configuration
    pub storage: StorageConfig,
    /// Circuit breaker configuration for provider resilience
    pub circuit_breaker: CircuitBreakerConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::Invalid("http.port cannot be 0".into()));
        }

        if self.rate_limit.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "requests_per_second cannot be 0".into(),
            ));
        }

        if self.limits.max_request_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_size cannot be 0".into(),
            ));
        }
        if self.limits.max_prompt_chars == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_prompt_chars cannot be 0".into(),
            ));
        }
        if self.limits.images_per_page == 0 {
            return Err(ConfigError::InvalidLimit(
                "images_per_page cannot be 0".into(),
            ));
        }

        if self.timeouts.default.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default timeout cannot be 0".into(),
            ));
        }

        if self.quota.enabled && self.quota.daily_limit == 0 {
            return Err(ConfigError::InvalidQuota(
                "daily_limit cannot be 0 while quotas are enabled".into(),
            ));
        }
        if !(self.quota.warning_ratio > 0.0 && self.quota.warning_ratio <= 1.0) {
            return Err(ConfigError::InvalidQuota(format!(
                "warning_ratio must be in (0, 1], got {}",
                self.quota.warning_ratio
            )));
        }

        if self.generation.poll_interval.is_zero() || self.generation.max_poll_attempts == 0 {
            return Err(ConfigError::InvalidTimeout(
                "generation polling needs a non-zero interval and attempt count".into(),
            ));
        }

        for (name, url) in [
            ("auth.base_url", &self.auth.base_url),
            ("storage.base_url", &self.storage.base_url),
        ] {
            if !url.is_empty() && !is_secure_url(url) {
                return Err(ConfigError::InsecureUrl(format!("{name} = {url}")));
            }
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Parse a TOML document; missing sections keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay values from environment-style variables.
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`; empty values
    /// are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("STUDIO_PORT") {
            self.http.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("STUDIO_PORT = {port}")))?;
        }
        if let Some(limit) = get("STUDIO_DAILY_LIMIT") {
            self.quota.daily_limit = limit
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("STUDIO_DAILY_LIMIT = {limit}")))?;
        }
        if let Some(url) = get("SUPABASE_URL") {
            let url = url.trim_end_matches('/').to_string();
            if self.storage.base_url.is_empty() {
                self.storage.base_url = url.clone();
            }
            self.auth.base_url = url;
        }

        let strings: [(&str, &mut String); 8] = [
            ("SUPABASE_ANON_KEY", &mut self.auth.anon_key),
            ("SUPABASE_SERVICE_KEY", &mut self.storage.service_key),
            ("REPLICATE_API_TOKEN", &mut self.generation.api_token),
            ("REPLICATE_MODEL", &mut self.generation.model),
            ("GEMINI_API_KEY", &mut self.enhancement.api_key),
            ("GOOGLE_CLIENT_ID", &mut self.auth.google_client_id),
            ("GOOGLE_CLIENT_SECRET", &mut self.auth.google_client_secret),
            ("GOOGLE_REDIRECT_URI", &mut self.auth.google_redirect_uri),
        ];
        for (key, slot) in strings {
            if let Some(value) = get(key) {
                *slot = value.trim().to_string();
            }
        }
        Ok(())
    }
}

/// `https://` anywhere, plain `http://` only for local development hosts.
pub fn is_secure_url(url: &str) -> bool {
    if url.starts_with("https://") {
        return true;
    }
    match url.strip_prefix("http://") {
        Some(rest) => {
            let host = rest.split(['/', ':']).next().unwrap_or_default();
            host == "localhost" || host == "127.0.0.1"
        }
        None => false,
    }
}

/// True when a credential is present and not one of the template values
/// shipped in sample `.env` files.
pub fn is_real_credential(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_ascii_lowercase();
    !(lower.contains("placeholder") || lower.starts_with("your_") || lower.starts_with("your-"))
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8787)
    pub port: u16,
    /// Enable HTTP server
    pub enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8787,
            enabled: true,
        }
    }
}

/// Rate limiting configuration (per client IP)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second per IP
    pub requests_per_second: u32,
    /// Burst allowance (token bucket)
    pub burst_size: u32,
    /// Enable rate limiting
    pub enabled: bool,
    /// IPs to whitelist from rate limiting
    pub whitelist: Vec<IpAddr>,
    /// Reverse proxies whose `X-Forwarded-For` / `X-Real-IP` headers are
    /// believed. Empty means the socket peer is always the client.
    pub trusted_proxies: Vec<IpAddr>,
    /// Idle time after which a client's bucket is dropped
    #[serde(with = "humantime_serde")]
    pub bucket_idle: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
            enabled: true,
            whitelist: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            trusted_proxies: Vec::new(),
            bucket_idle: Duration::from_secs(300),
        }
    }
}

/// Request and listing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max request body size in bytes (default: 64KB)
    pub max_request_size: usize,
    /// Max prompt length in characters
    pub max_prompt_chars: usize,
    /// Gallery page size
    pub images_per_page: usize,
    /// How many recent rows the explore gallery reads
    pub explore_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 64 * 1024,
            max_prompt_chars: 5000,
            images_per_page: 8,
            explore_limit: 100,
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default timeout for most requests
    #[serde(with = "humantime_serde")]
    pub default: Duration,
    /// Timeout for the generate route (covers provider polling)
    #[serde(with = "humantime_serde")]
    pub generate: Duration,
    /// Timeout for prompt enhancement
    #[serde(with = "humantime_serde")]
    pub enhance: Duration,
    /// Outbound connect timeout for provider calls
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            generate: Duration::from_secs(330),
            enhance: Duration::from_secs(30),
            connect: Duration::from_secs(10),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Expose headers
    pub expose_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
    /// Allow credentials
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            expose_headers: vec!["Retry-After".to_string()],
            max_age: 86400, // 24 hours
            allow_credentials: false,
        }
    }
}

/// Daily generation quota
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Enforce the quota
    pub enabled: bool,
    /// Generations per user per UTC day
    pub daily_limit: u32,
    /// Fraction of the limit at which `nearly_exhausted` is reported
    pub warning_ratio: f64,
    /// Optional JSON snapshot file so counters survive restarts
    pub snapshot_path: Option<String>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_limit: 5,
            warning_ratio: 0.8,
            snapshot_path: None,
        }
    }
}

/// Auth provider configuration (Supabase-compatible auth API)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthProviderConfig {
    /// Project URL, e.g. `https://abc.supabase.co`
    pub base_url: String,
    /// Public anon key sent as `apikey`
    pub anon_key: String,
    /// Google OAuth client id
    pub google_client_id: String,
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// Redirect URI registered with Google
    pub google_redirect_uri: String,
}

impl AuthProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
            && is_real_credential(&self.anon_key)
            && self.anon_key.trim().len() > 20
    }

    pub fn google_configured(&self) -> bool {
        is_real_credential(&self.google_client_id)
            && is_real_credential(&self.google_client_secret)
            && !self.google_redirect_uri.is_empty()
    }
}

/// Image generation provider configuration (Replicate predictions API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// API root, e.g. `https://api.replicate.com/v1`
    pub api_url: String,
    /// API token
    pub api_token: String,
    /// Model/version identifier
    pub model: String,
    /// Delay between prediction status polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Status polls before giving up
    pub max_poll_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.replicate.com/v1".to_string(),
            api_token: String::new(),
            model: "google/imagen-3".to_string(),
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 60,
        }
    }
}

impl GenerationConfig {
    pub fn is_configured(&self) -> bool {
        is_real_credential(&self.api_token)
    }
}

/// Prompt enhancement provider configuration (Gemini generateContent API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// API root, e.g. `https://generativelanguage.googleapis.com/v1beta`
    pub api_url: String,
    /// API key
    pub api_key: String,
    /// Model name
    pub model: String,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl EnhancementConfig {
    pub fn is_configured(&self) -> bool {
        is_real_credential(&self.api_key)
    }
}

/// Object storage and image table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Project URL (usually the same as `auth.base_url`)
    pub base_url: String,
    /// Service key used for uploads and row access
    pub service_key: String,
    /// Bucket holding generated images
    pub bucket: String,
    /// Table holding image rows
    pub table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            service_key: String::new(),
            bucket: "generated-images".to_string(),
            table: "generated_images".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && is_real_credential(&self.service_key)
    }
}

/// Circuit breaker configuration for provider resilience
///
/// When a provider fails repeatedly the circuit opens and requests to it are
/// rejected immediately until a probe succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breaker
    pub enabled: bool,
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Number of successes in half-open state before closing
    pub success_threshold: u32,
    /// Duration before half-open from open state (in seconds)
    pub open_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 1,
            open_timeout_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    /// Convert to the middleware CircuitBreakerConfig
    pub fn to_middleware_config(&self) -> crate::middleware::CircuitBreakerConfig {
        crate::middleware::CircuitBreakerConfig {
            enabled: self.enabled,
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            open_timeout: Duration::from_secs(self.open_timeout_secs),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid quota settings
    #[error("invalid quota: {0}")]
    InvalidQuota(String),
    /// Provider URL without TLS
    #[error("provider URL must use https: {0}")]
    InsecureUrl(String),
    /// Config file could not be parsed
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
