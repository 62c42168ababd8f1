use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{CourtError, SecretValue, require_env};

const DEFAULT_CONFIG_PATH: &str = "histcourt.toml";
const CONFIG_PATH_ENV: &str = "HISTCOURT_CONFIG";
const MODEL_ENV: &str = "MODEL";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub trial: TrialConfig,
    pub verdict: VerdictConfig,
    pub lookup: LookupConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the configured model API key (from environment only).
    pub fn api_key(&self) -> Result<SecretValue, CourtError> {
        require_env(&self.model.api_key_env)
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument (must exist).
    /// 2. `HISTCOURT_CONFIG` environment variable (must exist).
    /// 3. `histcourt.toml` in the current working directory, if present.
    ///
    /// The `MODEL` environment variable overrides `model.name`.
    pub fn load(path: Option<PathBuf>) -> Result<Config, CourtError> {
        let raw = match resolve_path(path) {
            Some(candidate) => fs::read_to_string(&candidate)
                .map_err(|err| CourtError::config_io(candidate.clone(), err))?,
            None => String::new(),
        };
        Self::from_toml(&raw, env::var(MODEL_ENV).ok())
    }

    /// Parse configuration text, applying a `MODEL` override when present.
    pub fn from_toml(raw: &str, model_override: Option<String>) -> Result<Config, CourtError> {
        let mut config: Config = toml::from_str(raw)
            .map_err(|err| CourtError::InvalidConfiguration(err.to_string()))?;

        if let Some(model) = model_override.filter(|value| !value.trim().is_empty()) {
            config.model.name = model.trim().to_string();
        }

        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), CourtError> {
        if config.model.name.trim().is_empty() {
            return Err(CourtError::InvalidConfiguration(format!(
                "no model configured; set {MODEL_ENV} or model.name"
            )));
        }
        if config.model.api_key_env.trim().is_empty() {
            return Err(CourtError::InvalidConfiguration(
                "model.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.retry.attempts == 0 {
            return Err(CourtError::InvalidConfiguration(
                "retry.attempts must be at least 1".into(),
            ));
        }
        if config.trial.max_iterations == 0 {
            return Err(CourtError::InvalidConfiguration(
                "trial.max_iterations must be at least 1".into(),
            ));
        }
        if config.trial.max_tool_rounds == 0 {
            return Err(CourtError::InvalidConfiguration(
                "trial.max_tool_rounds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return Some(PathBuf::from(from_env));
        }
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    default.exists().then(|| default.to_path_buf())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub api_key_env: String,
    /// REST base URL including the API version, e.g. `https://gateway.example.com/v1beta/`.
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 6,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    pub max_iterations: u32,
    pub max_tool_rounds: u32,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_tool_rounds: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerdictConfig {
    /// Directory the `write_file` tool resolves relative paths against.
    pub root: PathBuf,
    /// Directory name the verdict writer is told to use.
    pub directory: String,
    pub language: String,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            directory: "verdicts".to_string(),
            language: "Thai".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub language: String,
    pub top_k_results: usize,
    pub max_chars: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            top_k_results: 3,
            max_chars: 4_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults_with_model_override() {
        let config = ConfigLoader::from_toml("", Some("gemini-2.5-flash".into())).unwrap();
        assert_eq!(config.model.name, "gemini-2.5-flash");
        assert_eq!(config.retry.attempts, 6);
        assert_eq!(config.retry.initial_delay(), Duration::from_secs(1));
        assert_eq!(config.trial.max_iterations, 3);
        assert_eq!(config.verdict.directory, "verdicts");
        assert_eq!(config.verdict.language, "Thai");
    }

    #[test]
    fn model_env_overrides_file_value() {
        let raw = r#"
            [model]
            name = "from-file"

            [trial]
            max_iterations = 5
        "#;
        let config = ConfigLoader::from_toml(raw, Some("from-env".into())).unwrap();
        assert_eq!(config.model.name, "from-env");
        assert_eq!(config.trial.max_iterations, 5);

        let config = ConfigLoader::from_toml(raw, Some("  ".into())).unwrap();
        assert_eq!(config.model.name, "from-file");
    }

    #[test]
    fn missing_model_is_rejected() {
        let err = ConfigLoader::from_toml("", None).unwrap_err();
        assert!(matches!(err, CourtError::InvalidConfiguration(msg) if msg.contains("MODEL")));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let raw = "[retry]\nattempts = 0\n";
        let err = ConfigLoader::from_toml(raw, Some("m".into())).unwrap_err();
        assert!(matches!(err, CourtError::InvalidConfiguration(_)));
    }
}
