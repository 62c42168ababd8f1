//! Gemini model construction from configuration.

use std::sync::Arc;

use adk_rust::Llm;
use adk_rust::model::{GeminiModel, RetryConfig as ModelRetryConfig};

use crate::config::{Config, RetryConfig};
use crate::{CourtError, SecretValue};

const BACKOFF_MULTIPLIER: f32 = 2.0;

/// Retry schedule for model calls. `attempts` counts the first call.
pub fn retry_schedule(retry: &RetryConfig) -> ModelRetryConfig {
    ModelRetryConfig::default()
        .with_max_retries(retry.attempts.saturating_sub(1))
        .with_initial_delay(retry.initial_delay())
        .with_max_delay(retry.max_delay())
        .with_backoff_multiplier(BACKOFF_MULTIPLIER)
}

/// Gemini client for `model.name`, using `model.base_url` when set.
pub fn gemini_model(config: &Config, api_key: &SecretValue) -> Result<GeminiModel, CourtError> {
    let model = match config.model.base_url.as_deref() {
        Some(base_url) => {
            GeminiModel::new_with_base_url(api_key.expose(), &config.model.name, base_url)?
        }
        None => GeminiModel::new(api_key.expose(), &config.model.name)?,
    };
    Ok(model.with_retry_config(retry_schedule(&config.retry)))
}

/// Gemini client with the API key read from `model.api_key_env`.
pub fn model_from_config(config: &Config) -> Result<Arc<dyn Llm>, CourtError> {
    let api_key = config.api_key()?;
    Ok(Arc::new(gemini_model(config, &api_key)?))
}
