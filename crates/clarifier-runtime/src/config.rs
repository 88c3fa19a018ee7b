//! Runtime configuration.
//!
//! Configuration is YAML, checked against `schema/config.schema.json`
//! before it is deserialised. Every field has a default, so an empty file
//! (or no file) is a valid configuration.
//!
//! ```yaml
//! provider:
//!   type: anthropic
//!   model: claude-sonnet-4-5
//! timeouts:
//!   default: 60s
//!   per_task:
//!     classify: 15s
//! retry:
//!   max_retries: 2
//! budget:
//!   max_tokens: 200000
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::generators::GenerationTask;
use crate::resilience::CircuitBreakerConfig;

/// Embedded configuration schema.
const CONFIG_SCHEMA_JSON: &str = include_str!("../../../schema/config.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Full runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub provider: ProviderConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub budget: BudgetConfig,
    pub screener: ScreenerConfig,
    pub access: AccessConfig,
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;

        // An empty document parses as null
        let json = match serde_json::to_value(&value) {
            Ok(JsonValue::Null) => JsonValue::Object(JsonMap::new()),
            Ok(json) => json,
            Err(e) => return Err(ConfigError::Invalid(e.to_string())),
        };

        validate_config_schema(&json).map_err(ConfigError::Schema)?;

        let config: RuntimeConfig =
            serde_json::from_value(json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml_str(&yaml)?;
        tracing::debug!(path = %path.display(), provider = %config.provider.kind, "Loaded config");
        Ok(config)
    }

    /// Checks the schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.min_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid(
                "retry.min_delay must not exceed retry.max_delay".to_string(),
            ));
        }

        for task in GenerationTask::ALL {
            if self.timeouts.for_task(task).is_zero() {
                return Err(ConfigError::Invalid(format!("timeout for {} must be positive", task)));
            }
        }

        Ok(())
    }
}

/// Which provider to use and how to call it.
///
/// Keys other than the ones below (e.g. `api_key`, `base_url`) are passed
/// through to the provider factory.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: String,

    /// Provider default when unset
    pub model: Option<String>,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Anthropic prompt caching
    pub prompt_caching: bool,

    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: "openai".to_string(),
            model: None,
            max_tokens: 1024,
            temperature: 0.7,
            prompt_caching: false,
            extra: JsonMap::new(),
        }
    }
}

impl ProviderConfig {
    /// The section as handed to a provider factory.
    pub fn factory_config(&self) -> JsonValue {
        let mut config = self.extra.clone();
        if let Some(model) = &self.model {
            config.insert("model".to_string(), JsonValue::String(model.clone()));
        }
        JsonValue::Object(config)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pass-through keys may hold an api_key; show names only
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("prompt_caching", &self.prompt_caching)
            .field("extra_keys", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-call timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "humantime_serde")]
    pub default: Duration,

    pub per_task: PerTaskTimeouts,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(60),
            per_task: PerTaskTimeouts::default(),
        }
    }
}

impl TimeoutConfig {
    pub fn for_task(&self, task: GenerationTask) -> Duration {
        self.per_task.get(task).unwrap_or(self.default)
    }
}

/// Overrides of the default timeout, one per task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerTaskTimeouts {
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub issues: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub question: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub refine: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub critique: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub title: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub rephrase: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub classify: Option<Duration>,
}

impl PerTaskTimeouts {
    pub fn get(&self, task: GenerationTask) -> Option<Duration> {
        match task {
            GenerationTask::Issues => self.issues,
            GenerationTask::Question => self.question,
            GenerationTask::Refine => self.refine,
            GenerationTask::Critique => self.critique,
            GenerationTask::Title => self.title,
            GenerationTask::Rephrase => self.rephrase,
            GenerationTask::Classify => self.classify,
        }
    }
}

/// Retry of transient provider errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retry
    pub max_retries: usize,

    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,

    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Global token ceiling for the process; unlimited when unset
    pub max_tokens: Option<u64>,
}

/// Stage-2 verdict cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    pub cache_capacity: u64,

    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Credential gate settings, read by the CLI.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub password: Option<String>,
}

impl AccessConfig {
    /// The section as a JSON object, for credential loading.
    pub fn as_json(&self) -> JsonValue {
        serde_json::json!({ "password": self.password })
    }
}

impl std::fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessConfig")
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema: JsonValue = serde_json::from_str(CONFIG_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;
        jsonschema::options()
            .build(&schema)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a config document against the embedded schema.
pub fn validate_config_schema(config: &JsonValue) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(config)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = RuntimeConfig::from_yaml_str("").unwrap();
        assert_eq!(config.provider.kind, "openai");
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.timeouts.for_task(GenerationTask::Refine), Duration::from_secs(60));
        assert!(config.budget.max_tokens.is_none());
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
provider:
  type: anthropic
  model: claude-sonnet-4-5
  temperature: 0.2
  base_url: https://proxy.internal/v1
timeouts:
  default: 45s
  per_task:
    classify: 10s
retry:
  max_retries: 0
  min_delay: 100ms
  max_delay: 1s
circuit_breaker:
  failure_threshold: 5
  recovery_timeout: 2m
budget:
  max_tokens: 50000
screener:
  cache_capacity: 10
  cache_ttl: 5m
"#;
        let config = RuntimeConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.provider.kind, "anthropic");
        assert_eq!(config.provider.extra["base_url"], "https://proxy.internal/v1");
        assert_eq!(config.timeouts.for_task(GenerationTask::Classify), Duration::from_secs(10));
        assert_eq!(config.timeouts.for_task(GenerationTask::Issues), Duration::from_secs(45));
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(120));
        assert_eq!(config.circuit_breaker.success_threshold, 1);
        assert_eq!(config.budget.max_tokens, Some(50000));
        assert_eq!(config.screener.cache_ttl, Duration::from_secs(300));

        let factory = config.provider.factory_config();
        assert_eq!(factory["model"], "claude-sonnet-4-5");
        assert_eq!(factory["base_url"], "https://proxy.internal/v1");
    }

    #[test]
    fn test_schema_errors_are_listed() {
        let yaml = r#"
provider:
  type: llama
  temperature: 7
unknown_section: true
"#;
        match RuntimeConfig::from_yaml_str(yaml) {
            Err(ConfigError::Schema(errors)) => {
                assert!(errors.len() >= 3, "{:?}", errors);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_duration_rejected() {
        let result = RuntimeConfig::from_yaml_str("timeouts:\n  default: soon\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_retry_delays_checked() {
        let yaml = "retry:\n  min_delay: 10s\n  max_delay: 1s\n";
        assert!(matches!(
            RuntimeConfig::from_yaml_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let yaml = "timeouts:\n  per_task:\n    title: 0s\n";
        assert!(matches!(
            RuntimeConfig::from_yaml_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider:\n  type: openai\n  model: gpt-4o").unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.provider.model.as_deref(), Some("gpt-4o"));

        let missing = RuntimeConfig::from_file("/definitely/not/here.yaml");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_secrets_not_in_debug() {
        let yaml = "provider:\n  api_key: sk-live-123\naccess:\n  password: hunter2\n";
        let config = RuntimeConfig::from_yaml_str(yaml).unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-live-123"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("api_key"));
    }
}
