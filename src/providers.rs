//! Upstream provider definitions.
//!
//! Each provider is an OpenAI-compatible chat-completions endpoint with its
//! own base URL and auth header (Anthropic is reached through its OpenAI
//! compatibility surface). The provider of a request is carried as a tag
//! prefix on the effective model name, e.g. `openai/gpt-4o` or
//! `nvidia_nim/meta/llama-3.1-70b-instruct`.

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    NvidiaNim,
}

impl Provider {
    /// The model-name prefix identifying this provider.
    pub fn tag(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::NvidiaNim => "nvidia_nim",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Provider> {
        match tag {
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            "nvidia_nim" => Some(Provider::NvidiaNim),
            _ => None,
        }
    }

    /// `PREFERRED_PROVIDER` values as the environment spells them.
    pub fn from_preference(name: &str) -> Option<Provider> {
        match name {
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            "nvidia" => Some(Provider::NvidiaNim),
            _ => None,
        }
    }

    /// Parse the provider tag off a model name, if it carries one.
    pub fn of_model(model: &str) -> Option<Provider> {
        let (head, _) = model.split_once('/')?;
        Provider::from_tag(head)
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::NvidiaNim => "https://integrate.api.nvidia.com/v1",
        }
    }

    pub fn key_env(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::NvidiaNim => "NVIDIA_NIM_API_KEY",
        }
    }

    pub fn auth_scheme(self) -> AuthScheme {
        match self {
            Provider::OpenAi | Provider::NvidiaNim => AuthScheme::Bearer,
            Provider::Anthropic => AuthScheme::AnthropicApiKey,
        }
    }
}

/// How the provider expects credentials on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-api-key: <key>` plus `anthropic-version`
    AnthropicApiKey,
}

/// Return the model id the provider knows, without our routing tag.
pub fn strip_provider_tag(model: &str) -> &str {
    match model.split_once('/') {
        Some((head, rest)) if Provider::from_tag(head).is_some() => rest,
        _ => model,
    }
}

/// NIM models known to accept a tool catalog. Everything else on NIM gets
/// tools stripped rather than a provider-side rejection.
const NIM_FUNCTION_CALLING_MODELS: &[&str] = &[
    "meta/llama-3.1-8b-instruct",
    "meta/llama-3.1-70b-instruct",
    "meta/llama-3.1-405b-instruct",
    "nvidia/llama-3.1-nemotron-70b-instruct",
    "mistralai/mistral-large-2-instruct",
];

/// Whether the effective model can receive a tool catalog at all.
pub fn supports_function_calling(effective_model: &str) -> bool {
    match Provider::of_model(effective_model) {
        Some(Provider::OpenAi) | Some(Provider::Anthropic) => true,
        Some(Provider::NvidiaNim) => {
            let bare = strip_provider_tag(effective_model);
            NIM_FUNCTION_CALLING_MODELS.contains(&bare)
        }
        None => false,
    }
}

/// Everything the converter and flattener need to know about the resolved
/// target, bundled once per request.
#[derive(Debug, Clone, Copy)]
pub struct TargetProfile {
    pub provider: Provider,
    pub supports_tools: bool,
    /// Rewrite structured content blocks into plain text.
    pub flatten_content: bool,
    pub max_tokens_ceiling: Option<u64>,
}

impl TargetProfile {
    pub fn resolve(effective_model: &str, config: &Config) -> TargetProfile {
        let provider =
            Provider::of_model(effective_model).unwrap_or(config.preferred_provider);
        let supports_tools = supports_function_calling(effective_model);
        TargetProfile {
            provider,
            supports_tools,
            flatten_content: provider == Provider::OpenAi || !supports_tools,
            max_tokens_ceiling: (provider == Provider::OpenAi)
                .then_some(config.max_tokens_limit),
        }
    }
}
