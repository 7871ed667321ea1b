//! Environment-driven configuration.
//!
//! Everything is read once at startup into an immutable [`Config`] that is
//! shared across handlers. At least one provider credential must be present,
//! and the preferred provider must have its own key.

use crate::error::{ProxyError, Result};
use crate::providers::Provider;
use std::time::Duration;

const DEFAULT_BIG_MODEL: &str = "gpt-4o";
const DEFAULT_SMALL_MODEL: &str = "gpt-4o-mini";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8082;
const DEFAULT_MAX_TOKENS_LIMIT: u64 = 16384;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub nvidia_nim_api_key: Option<String>,
    pub preferred_provider: Provider,
    /// Alias target for `sonnet`/`opus` model names.
    pub big_model: String,
    /// Alias target for `haiku` model names.
    pub small_model: String,
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,
    pub openai_base_url: Option<String>,
    /// Hard `max_tokens` ceiling for OpenAI-family targets.
    pub max_tokens_limit: u64,
    pub request_timeout: Duration,
}

impl Config {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Split out so tests can supply
    /// variables without mutating the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let preferred_raw = non_empty("PREFERRED_PROVIDER")
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|| "openai".to_string());
        let preferred_provider = match Provider::from_preference(&preferred_raw) {
            Some(p) => p,
            None => {
                tracing::warn!(
                    value = %preferred_raw,
                    "Unknown PREFERRED_PROVIDER, falling back to openai"
                );
                Provider::OpenAi
            }
        };

        let server_port = match non_empty("SERVER_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                ProxyError::config(format!("SERVER_PORT is not a valid port: {raw}"))
            })?,
            None => DEFAULT_PORT,
        };

        let max_tokens_limit = match non_empty("MAX_TOKENS_LIMIT") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ProxyError::config(format!("MAX_TOKENS_LIMIT is not a number: {raw}"))
            })?,
            None => DEFAULT_MAX_TOKENS_LIMIT,
        };

        let timeout_secs = match non_empty("REQUEST_TIMEOUT") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ProxyError::config(format!("REQUEST_TIMEOUT is not a number: {raw}"))
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let config = Config {
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            nvidia_nim_api_key: non_empty("NVIDIA_NIM_API_KEY"),
            preferred_provider,
            big_model: non_empty("BIG_MODEL").unwrap_or_else(|| DEFAULT_BIG_MODEL.to_string()),
            small_model: non_empty("SMALL_MODEL")
                .unwrap_or_else(|| DEFAULT_SMALL_MODEL.to_string()),
            server_host: non_empty("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            server_port,
            log_level: non_empty("LOG_LEVEL")
                .map(|v| v.to_lowercase())
                .unwrap_or_else(|| "info".to_string()),
            openai_base_url: non_empty("OPENAI_BASE_URL"),
            max_tokens_limit,
            request_timeout: Duration::from_secs(timeout_secs),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.anthropic_api_key.is_none()
            && self.openai_api_key.is_none()
            && self.nvidia_nim_api_key.is_none()
        {
            return Err(ProxyError::config(
                "No API keys configured. Set at least one of ANTHROPIC_API_KEY, \
                 OPENAI_API_KEY, or NVIDIA_NIM_API_KEY.",
            ));
        }

        if self.api_key_for(self.preferred_provider).is_err() {
            return Err(ProxyError::config(format!(
                "{} is required when PREFERRED_PROVIDER is '{}'",
                self.preferred_provider.key_env(),
                self.preferred_provider.tag()
            )));
        }

        Ok(())
    }

    /// Resolve the credential for a provider.
    pub fn api_key_for(&self, provider: Provider) -> Result<&str> {
        let key = match provider {
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::NvidiaNim => self.nvidia_nim_api_key.as_deref(),
        };
        key.ok_or_else(|| {
            ProxyError::config(format!(
                "Environment variable '{}' not set but required for this model",
                provider.key_env()
            ))
        })
    }

    /// Base URL for a provider, honoring `OPENAI_BASE_URL` for OpenAI.
    pub fn base_url_for(&self, provider: Provider) -> String {
        if provider == Provider::OpenAi {
            if let Some(ref url) = self.openai_base_url {
                return url.trim_end_matches('/').to_string();
            }
        }
        provider.default_base_url().to_string()
    }

    /// Translate `LOG_LEVEL` into a tracing filter directive.
    pub fn tracing_filter(&self) -> String {
        let level = match self.log_level.as_str() {
            "debug" => "debug",
            "warning" => "warn",
            "error" | "critical" => "error",
            _ => "info",
        };
        format!("claude_bridge={level},tower_http=info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|v| (*v).to_string())
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.preferred_provider, Provider::OpenAi);
        assert_eq!(config.big_model, "gpt-4o");
        assert_eq!(config.small_model, "gpt-4o-mini");
        assert_eq!(config.server_port, 8082);
        assert_eq!(config.max_tokens_limit, 16384);
    }

    #[test]
    fn test_requires_at_least_one_key() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("No API keys"));
    }

    #[test]
    fn test_preferred_provider_needs_its_key() {
        let err = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PREFERRED_PROVIDER", "nvidia"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("NVIDIA_NIM_API_KEY"));
    }

    #[test]
    fn test_unknown_provider_falls_back_to_openai() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PREFERRED_PROVIDER", "bedrock"),
        ]))
        .unwrap();
        assert_eq!(config.preferred_provider, Provider::OpenAi);
    }

    #[test]
    fn test_base_url_override_applies_to_openai_only() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("NVIDIA_NIM_API_KEY", "nv-test"),
            ("OPENAI_BASE_URL", "http://localhost:9999/v1/"),
        ]))
        .unwrap();
        assert_eq!(
            config.base_url_for(Provider::OpenAi),
            "http://localhost:9999/v1"
        );
        assert_eq!(
            config.base_url_for(Provider::NvidiaNim),
            "https://integrate.api.nvidia.com/v1"
        );
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SERVER_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
    }
}
