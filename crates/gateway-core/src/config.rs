use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_PORT: u16 = 8088;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Credential prefix that activates LLM mock mode — see `gateway-llm`.
/// Exists so integration tests can exercise the whole orchestration core
/// without a real provider credential.
pub const MOCK_CREDENTIAL_PREFIX: &str = "sk-ant-gw-test-";

/// Top-level config (gateway.toml + GATEWAY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub tool_servers: Vec<ToolServerConfig>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// 0 disables heartbeat comments entirely.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

/// Token verification settings for the identity provider's issued tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// URL serving the signing-key set (JWKS-shaped).
    pub jwks_url: String,
    /// The primary issuer this deployment trusts.
    pub issuer: String,
    /// Additional trusted issuers (split-horizon deployments).
    #[serde(default)]
    pub extra_issuers: Vec<String>,
    /// This deployment's OAuth/OIDC client id — must appear in `aud`.
    pub client_id: String,
    /// How long fetched signing keys are cached before a re-fetch.
    #[serde(default = "default_jwks_cache_secs")]
    pub jwks_cache_secs: u64,
    /// Revocation-record TTL fallback when a token carries no `exp`.
    #[serde(default = "default_revocation_ttl_secs")]
    pub revocation_ttl_secs: u64,
}

/// LLM provider settings. `credential` starting with
/// [`MOCK_CREDENTIAL_PREFIX`] activates mock mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub credential: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub name: String,
    pub endpoint: String,
    pub required_roles: HashSet<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_read_timeout_ms")]
    pub read_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_ms: u64,
    #[serde(default = "default_llm_timeout_ms")]
    pub llm_ms: u64,
    /// Outermost per-request budget; bounds the sum of every downstream call.
    #[serde(default = "default_total_budget_ms")]
    pub total_budget_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_ms: default_read_timeout_ms(),
            write_ms: default_write_timeout_ms(),
            llm_ms: default_llm_timeout_ms(),
            total_budget_ms: default_total_budget_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_general_per_min")]
    pub general_per_min: u32,
    #[serde(default = "default_query_per_min")]
    pub query_per_min: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general_per_min: default_general_per_min(),
            query_per_min: default_query_per_min(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_confirmation_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_confirmation_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_heartbeat_ms() -> u64 {
    15_000
}
fn default_jwks_cache_secs() -> u64 {
    300
}
fn default_revocation_ttl_secs() -> u64 {
    86_400
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_read_timeout_ms() -> u64 {
    5_000
}
fn default_write_timeout_ms() -> u64 {
    10_000
}
fn default_llm_timeout_ms() -> u64 {
    60_000
}
fn default_total_budget_ms() -> u64 {
    90_000
}
fn default_general_per_min() -> u32 {
    500
}
fn default_query_per_min() -> u32 {
    10
}
fn default_max_pages() -> u32 {
    10
}
fn default_confirmation_ttl_secs() -> u64 {
    300
}
fn default_drain_timeout_secs() -> u64 {
    30
}

impl GatewayConfig {
    /// Load from a TOML file with `GATEWAY_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, `GATEWAY_CONFIG` env var,
    /// `./gateway.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("GATEWAY_CONFIG").ok())
            .unwrap_or_else(|| "gateway.toml".to_string());

        let config: GatewayConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("GATEWAY_").split("__"))
            .extract()
            .map_err(|e| crate::error::GatewayError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn is_mock_mode(&self) -> bool {
        self.llm.credential.starts_with(MOCK_CREDENTIAL_PREFIX)
    }
}
