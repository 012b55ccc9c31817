pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use sitesmith_core::config::AppConfig;
use sitesmith_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use providers::presets::apply_preset_defaults;
pub use retry::RetryingClient;

/// Build the client chain for an app config: primary model, retries, then fallbacks.
///
/// Every supported provider speaks the OpenAI chat-completions dialect;
/// presets only differ in endpoint and headers.
pub fn build_client(config: &mut AppConfig) -> Arc<dyn LlmClient> {
    apply_preset_defaults(&mut config.model);
    for fallback in &mut config.fallback_models {
        apply_preset_defaults(fallback);
    }

    let primary: Box<dyn LlmClient> = Box::new(OpenAiClient::new());
    if config.fallback_models.is_empty() && config.model.retry.is_none() {
        return Arc::from(primary);
    }

    let retry_config = config.model.retry.clone().unwrap_or_default();
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|mc| (mc.clone(), Box::new(OpenAiClient::new()) as Box<dyn LlmClient>))
        .collect();
    Arc::new(RetryingClient::new(primary, fallbacks, retry_config))
}
