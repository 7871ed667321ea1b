//! Model-name normalization.
//!
//! Claude Code asks for Claude model names (`claude-3-5-haiku-…`,
//! `claude-sonnet-4-…`). We rewrite those onto the configured alias targets
//! and tag every model with its provider so the rest of the pipeline can
//! route on the prefix. Applied rules, in order:
//!
//! 1. a recognized provider tag (`openai/`, `anthropic/`, `nvidia_nim/`)
//!    passes the name through unchanged,
//! 2. `haiku` names map to `SMALL_MODEL`, `sonnet`/`opus` names to
//!    `BIG_MODEL` (case-insensitive substring match),
//! 3. a still-untagged name gets the preferred provider's tag prepended.
//!
//! Step 1 makes the whole thing idempotent: a second pass sees the tag and
//! stops.

use crate::config::Config;
use crate::providers::Provider;
use crate::translate::anthropic_types::MessagesRequest;

/// Rewrite a requested model name into its effective, provider-tagged form.
pub fn normalize_model(model: &str, config: &Config) -> String {
    if Provider::of_model(model).is_some() {
        return model.to_string();
    }

    let lower = model.to_lowercase();
    let resolved = if lower.contains("haiku") {
        config.small_model.clone()
    } else if lower.contains("sonnet") || lower.contains("opus") {
        config.big_model.clone()
    } else {
        model.to_string()
    };

    if Provider::of_model(&resolved).is_some() {
        resolved
    } else {
        format!("{}/{}", config.preferred_provider.tag(), resolved)
    }
}

/// Normalize the request in place, keeping the client's original model name
/// for response echoing.
pub fn normalize_request(req: &mut MessagesRequest, config: &Config) {
    let effective = normalize_model(&req.model, config);
    if effective != req.model {
        tracing::info!(original = %req.model, effective = %effective, "model mapping");
    }
    req.original_model = Some(std::mem::replace(&mut req.model, effective));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_config() -> Config {
        Config::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn nvidia_config() -> Config {
        Config::from_lookup(|key| match key {
            "NVIDIA_NIM_API_KEY" => Some("nv-test".to_string()),
            "PREFERRED_PROVIDER" => Some("nvidia".to_string()),
            "BIG_MODEL" => Some("meta/llama-3.1-70b-instruct".to_string()),
            "SMALL_MODEL" => Some("meta/llama-3.1-8b-instruct".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_haiku_maps_to_small_model() {
        let config = openai_config();
        assert_eq!(
            normalize_model("claude-3-5-haiku-20241022", &config),
            "openai/gpt-4o-mini"
        );
    }

    #[test]
    fn test_sonnet_and_opus_map_to_big_model() {
        let config = openai_config();
        assert_eq!(
            normalize_model("claude-sonnet-4-20250514", &config),
            "openai/gpt-4o"
        );
        assert_eq!(
            normalize_model("claude-3-opus-20240229", &config),
            "openai/gpt-4o"
        );
    }

    #[test]
    fn test_recognized_tags_pass_through() {
        let config = openai_config();
        for model in [
            "openai/gpt-4o-mini",
            "anthropic/claude-3-5-sonnet-20241022",
            "nvidia_nim/meta/llama-3.1-70b-instruct",
        ] {
            assert_eq!(normalize_model(model, &config), model);
        }
    }

    #[test]
    fn test_unrecognized_model_gets_preferred_tag() {
        let config = openai_config();
        assert_eq!(normalize_model("gpt-4.1", &config), "openai/gpt-4.1");
        // `meta/` is not a provider tag, so the whole path is tagged.
        let config = nvidia_config();
        assert_eq!(
            normalize_model("meta/llama3-8b", &config),
            "nvidia_nim/meta/llama3-8b"
        );
    }

    #[test]
    fn test_nvidia_preference_uses_nim_aliases() {
        let config = nvidia_config();
        assert_eq!(
            normalize_model("claude-3-5-haiku-20241022", &config),
            "nvidia_nim/meta/llama-3.1-8b-instruct"
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let config = openai_config();
        for model in [
            "claude-3-5-haiku-20241022",
            "claude-sonnet-4-20250514",
            "gpt-4.1",
            "openai/gpt-4o",
            "nvidia_nim/meta/llama3-8b",
        ] {
            let once = normalize_model(model, &config);
            let twice = normalize_model(&once, &config);
            assert_eq!(once, twice, "normalize must be idempotent for {model}");
        }
    }

    #[test]
    fn test_normalize_request_preserves_original() {
        let config = openai_config();
        let mut req: MessagesRequest = serde_json::from_value(serde_json::json!({
            "model": "claude-3-5-haiku-20241022",
            "max_tokens": 100,
            "messages": [{"role": "user", "content": "Hi"}],
        }))
        .unwrap();

        normalize_request(&mut req, &config);

        assert_eq!(req.model, "openai/gpt-4o-mini");
        assert_eq!(
            req.original_model.as_deref(),
            Some("claude-3-5-haiku-20241022")
        );
    }
}
