use sitesmith_core::config::ModelConfig;

/// Endpoint and header defaults for an OpenAI-compatible provider.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub needs_api_key: bool,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[("X-Title", "Sitesmith")],
        }),
        "openai" => Some(ProviderPreset {
            default_base_url: "https://api.openai.com/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1/chat/completions",
            needs_api_key: false,
            extra_headers: &[],
        }),
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "together" => Some(ProviderPreset {
            default_base_url: "https://api.together.xyz/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[],
        }),
        _ => None,
    }
}

/// Fill in `base_url` and preset headers for a model config.
///
/// Values already present in the config take precedence.
pub fn apply_preset_defaults(config: &mut ModelConfig) {
    let Some(preset) = get_preset(&config.provider) else {
        return;
    };

    if config.base_url.is_none() {
        config.base_url = Some(preset.default_base_url.to_string());
    }

    for (k, v) in preset.extra_headers {
        config
            .extra_headers
            .entry(k.to_string())
            .or_insert_with(|| v.to_string());
    }

    if preset.needs_api_key && config.api_key.is_none() {
        tracing::warn!(provider = %config.provider, "Provider requires an API key but none is configured");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn model(provider: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.to_string(),
            model_id: "m".into(),
            api_key: Some("k".into()),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.0,
            retry: None,
            extra_headers: HashMap::new(),
        }
    }

    #[test]
    fn test_openrouter_defaults() {
        let mut cfg = model("openrouter");
        apply_preset_defaults(&mut cfg);
        assert_eq!(
            cfg.base_url.as_deref(),
            Some("https://openrouter.ai/api/v1/chat/completions")
        );
        assert_eq!(cfg.extra_headers.get("X-Title").map(String::as_str), Some("Sitesmith"));
    }

    #[test]
    fn test_user_values_take_precedence() {
        let mut cfg = model("openrouter");
        cfg.base_url = Some("http://proxy.local/v1/chat/completions".into());
        cfg.extra_headers.insert("X-Title".into(), "Custom".into());
        apply_preset_defaults(&mut cfg);
        assert_eq!(cfg.base_url.as_deref(), Some("http://proxy.local/v1/chat/completions"));
        assert_eq!(cfg.extra_headers.get("X-Title").map(String::as_str), Some("Custom"));
    }

    #[test]
    fn test_unknown_provider_untouched() {
        let mut cfg = model("custom");
        apply_preset_defaults(&mut cfg);
        assert!(cfg.base_url.is_none());
        assert!(cfg.extra_headers.is_empty());
    }
}
