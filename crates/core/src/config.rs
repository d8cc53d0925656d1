use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Name of the fallback tier every table must carry.
pub const DEFAULT_TIER: &str = "default";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub request: RequestConfig,
    pub guardrails: GuardrailConfig,
    pub safety: SafetyConfig,
    pub cost: CostConfig,
    pub tiers: TierTable,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub enable_tracing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend label used in metrics and responses.
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub health_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: "ollama".into(),
            base_url: "http://ollama:11434".into(),
            model: "tinyllama".into(),
            timeout_secs: 60,
            health_timeout_secs: 5,
        }
    }
}

/// Defaults and clamps applied to inbound requests.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RequestConfig {
    pub default_identity: String,
    pub default_max_tokens: u32,
    /// Requested max tokens are clamped to this before guardrails run.
    pub max_tokens_cap: u32,
    pub default_temperature: f64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_identity: "anonymous".into(),
            default_max_tokens: 50,
            max_tokens_cap: 200,
            default_temperature: 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GuardrailConfig {
    pub max_prompt_chars: usize,
    pub max_tokens: u32,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 4000,
            max_tokens: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SafetyConfig {
    /// Matched case-insensitively as substrings.
    pub banned_keywords: Vec<String>,
    /// Replaces email addresses in sanitized text.
    pub redaction_token: String,
    /// Returned instead of backend output that fails the safety scan.
    pub filtered_placeholder: String,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            banned_keywords: vec![
                "bomb".into(),
                "malware".into(),
                "ransomware".into(),
                "terrorist".into(),
                "weapon".into(),
            ],
            redaction_token: "[REDACTED_EMAIL]".into(),
            filtered_placeholder: "[content filtered]".into(),
        }
    }
}

/// Linear pricing and budget enforcement mode.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CostConfig {
    /// USD per 1K prompt tokens.
    pub input_cost_per_1k: f64,
    /// USD per 1K generated tokens.
    pub output_cost_per_1k: f64,
    /// Cap on the output length assumed by the pre-call estimate.
    pub precheck_output_ceiling: u32,
    /// Reserve estimated cost at precheck time (hard budget enforcement).
    pub reserve_budget: bool,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            input_cost_per_1k: 0.01,
            output_cost_per_1k: 0.03,
            precheck_output_ceiling: 200,
            reserve_budget: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit logs as JSON lines.
    pub json: bool,
}

// =============================================================================
// Tiers
// =============================================================================

/// Per-tier governance limits.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TierConfig {
    /// Requests per trailing minute.
    pub rate_limit: u32,
    /// USD per 24-hour epoch.
    pub daily_budget: f64,
    /// Stricter output-token ceiling for restricted identities.
    #[serde(default)]
    pub max_tokens_override: Option<u32>,
}

impl TierConfig {
    pub fn new(rate_limit: u32, daily_budget: f64) -> Self {
        Self {
            rate_limit,
            daily_budget,
            max_tokens_override: None,
        }
    }

    pub fn with_max_tokens_override(mut self, max_tokens: u32) -> Self {
        self.max_tokens_override = Some(max_tokens);
        self
    }
}

/// Immutable mapping from identity (or tier name) to limits, with a
/// `default` fallback for unknown identities.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct TierTable {
    tiers: HashMap<String, TierConfig>,
}

impl TierTable {
    /// Build a table. Fails if no `default` tier is present.
    pub fn new(tiers: HashMap<String, TierConfig>) -> Result<Self> {
        let table = Self { tiers };
        table.validate()?;
        Ok(table)
    }

    /// Ensure the fallback tier exists.
    pub fn validate(&self) -> Result<()> {
        if self.tiers.contains_key(DEFAULT_TIER) {
            Ok(())
        } else {
            Err(Error::config("tier table has no `default` entry"))
        }
    }

    /// Add or replace a tier.
    pub fn with_tier(mut self, name: impl Into<String>, tier: TierConfig) -> Self {
        self.tiers.insert(name.into(), tier);
        self
    }

    /// Limits for `identity`, falling back to `default`.
    pub fn resolve(&self, identity: &str) -> &TierConfig {
        self.tiers
            .get(identity)
            .or_else(|| self.tiers.get(DEFAULT_TIER))
            .unwrap_or(&FALLBACK_TIER)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

// Only reachable when a table skipped `validate`.
static FALLBACK_TIER: TierConfig = TierConfig {
    rate_limit: 0,
    daily_budget: 0.0,
    max_tokens_override: None,
};

impl Default for TierTable {
    fn default() -> Self {
        let tiers = HashMap::from([
            (DEFAULT_TIER.to_string(), TierConfig::new(5, 0.5)),
            ("alice".to_string(), TierConfig::new(20, 5.0)),
            ("bob".to_string(), TierConfig::new(1, 0.5)),
            ("premium".to_string(), TierConfig::new(50, 20.0)),
            (
                "restricted".to_string(),
                TierConfig::new(2, 0.1).with_max_tokens_override(50),
            ),
        ]);
        Self { tiers }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let env = std::env::var("LLMOPS_ENV").unwrap_or_else(|_| "development".into());

        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map LLMOPS__SERVER__PORT=9000 to server.port
            .add_source(Environment::with_prefix("LLMOPS").separator("__"))
            .build()?;

        let config: AppConfig = settings.try_deserialize().map_err(|e: ConfigError| {
            Error::config(format!("failed to deserialize configuration: {}", e))
        })?;
        config.tiers.validate()?;
        Ok(config)
    }
}
