//! TOML configuration with environment overrides. Immutable after startup;
//! changing weights or deadlines requires a restart.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use stride_search::RetrievalConfig;
use stride_store::PricingPolicy;

fn default_embedding_dim() -> usize {
    1024
}

fn default_candidate_multiplier() -> usize {
    4
}

fn default_candidate_minimum() -> usize {
    50
}

fn default_max_tool_calls() -> usize {
    5
}

fn default_turn_deadline_ms() -> u64 {
    30_000
}

fn default_call_deadline_ms() -> u64 {
    10_000
}

fn default_tax_rate() -> Decimal {
    Decimal::new(85, 3)
}

fn default_free_shipping_threshold() -> Decimal {
    Decimal::new(7500, 2)
}

fn default_flat_shipping() -> Decimal {
    Decimal::new(799, 2)
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HybridWeights {
    pub semantic: f32,
    pub lexical: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            lexical: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreTransportKind {
    #[default]
    Direct,
    Mediated,
}

impl StoreTransportKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Mediated => "mediated",
        }
    }
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_model() -> String {
    "qwen3".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            embedding_model: None,
            api_key: None,
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost/stride".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediatedConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default)]
    pub hybrid_weights: HybridWeights,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_candidate_minimum")]
    pub candidate_minimum: usize,
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: usize,
    #[serde(default = "default_turn_deadline_ms")]
    pub turn_deadline_ms: u64,
    #[serde(default = "default_call_deadline_ms")]
    pub call_deadline_ms: u64,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: Decimal,
    #[serde(default = "default_flat_shipping")]
    pub flat_shipping: Decimal,
    #[serde(default)]
    pub store_transport: StoreTransportKind,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mediated: Option<MediatedConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            hybrid_weights: HybridWeights::default(),
            candidate_multiplier: default_candidate_multiplier(),
            candidate_minimum: default_candidate_minimum(),
            max_tool_calls: default_max_tool_calls(),
            turn_deadline_ms: default_turn_deadline_ms(),
            call_deadline_ms: default_call_deadline_ms(),
            tax_rate: default_tax_rate(),
            free_shipping_threshold: default_free_shipping_threshold(),
            flat_shipping: default_flat_shipping(),
            store_transport: StoreTransportKind::default(),
            llm: LlmConfig::default(),
            database: DatabaseConfig::default(),
            mediated: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting configuration is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("STRIDE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(key) = std::env::var("STRIDE_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("STRIDE_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(kind) = std::env::var("STRIDE_STORE_TRANSPORT") {
            match kind.as_str() {
                "direct" => self.store_transport = StoreTransportKind::Direct,
                "mediated" => self.store_transport = StoreTransportKind::Mediated,
                other => {
                    tracing::warn!(value = %other, "ignoring unknown STRIDE_STORE_TRANSPORT");
                }
            }
        }
        if let Ok(url) = std::env::var("STRIDE_MEDIATED_URL") {
            self.mediated = Some(MediatedConfig { base_url: url });
        }
    }

    /// # Errors
    ///
    /// Rejects weight sums away from 1.0 and degenerate sizing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.retrieval_config()
            .validate()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        if self.embedding_dim == 0 {
            anyhow::bail!("embedding_dim must be positive");
        }
        if self.max_tool_calls == 0 {
            anyhow::bail!("max_tool_calls must be positive");
        }
        if self.tax_rate < Decimal::ZERO {
            anyhow::bail!("tax_rate must be non-negative");
        }
        Ok(())
    }

    #[must_use]
    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            semantic_weight: self.hybrid_weights.semantic,
            lexical_weight: self.hybrid_weights.lexical,
            candidate_multiplier: self.candidate_multiplier,
            candidate_minimum: self.candidate_minimum,
        }
    }

    #[must_use]
    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate: self.tax_rate,
            free_shipping_threshold: self.free_shipping_threshold,
            flat_shipping: self.flat_shipping,
        }
    }

    #[must_use]
    pub fn call_deadline(&self) -> Duration {
        Duration::from_millis(self.call_deadline_ms)
    }

    #[must_use]
    pub fn turn_deadline(&self) -> Duration {
        Duration::from_millis(self.turn_deadline_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_match_the_contract() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.embedding_dim, 1024);
        assert_eq!(config.max_tool_calls, 5);
        assert_eq!(config.turn_deadline_ms, 30_000);
        assert_eq!(config.candidate_multiplier, 4);
        assert_eq!(config.candidate_minimum, 50);
        assert_eq!(config.tax_rate.to_string(), "0.085");
        assert_eq!(config.flat_shipping.to_string(), "7.99");
        assert_eq!(config.store_transport, StoreTransportKind::Direct);
        assert!((config.hybrid_weights.semantic - 0.7).abs() < 1e-6);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "max_tool_calls = 3\n\
             store_transport = \"mediated\"\n\
             [hybrid_weights]\n\
             semantic = 0.6\n\
             lexical = 0.4\n\
             [llm]\n\
             model = \"nimbus-8b\"\n\
             [mediated]\n\
             base_url = \"http://localhost:8500\""
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.max_tool_calls, 3);
        assert_eq!(config.store_transport, StoreTransportKind::Mediated);
        assert_eq!(config.llm.model, "nimbus-8b");
        assert!((config.hybrid_weights.lexical - 0.4).abs() < 1e-6);
        assert_eq!(config.mediated.unwrap().base_url, "http://localhost:8500");
    }

    #[test]
    fn bad_weights_are_rejected() {
        let config: Config = toml::from_str(
            "[hybrid_weights]\nsemantic = 0.9\nlexical = 0.3",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/stride.toml")).unwrap();
        assert_eq!(config.embedding_dim, 1024);
    }
}
