use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{info, warn};

use sitesmith_core::config::{ModelConfig, RetryConfig};
use sitesmith_core::error::{Result, SitesmithError};
use sitesmith_core::traits::LlmClient;
use sitesmith_core::types::*;

/// An LLM client that retries failed requests and falls back to alternative models.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &SitesmithError) -> bool {
    match e {
        SitesmithError::LlmRequest(msg) => {
            ["429", "500", "502", "503", "timeout", "connection"]
                .iter()
                .any(|needle| msg.contains(needle))
        }
        SitesmithError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools = tools.to_vec();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self
                    .primary
                    .chat_stream(&config, messages.clone(), &tools)
                    .await
                {
                    Ok(stream) => return Ok(stream),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
                        );
                        tokio::time::sleep(backoff).await;
                        last_err = Some(e);
                    }
                    Err(e) => {
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary LLM exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client
                    .chat_stream(fb_config, messages.clone(), &tools)
                    .await
                {
                    Ok(stream) => {
                        info!(model = %fb_config.model_id, "Fell back to alternative model");
                        return Ok(stream);
                    }
                    Err(e) => {
                        warn!(model = %fb_config.model_id, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| SitesmithError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use sitesmith_test_utils::{test_model_config, MockLlm};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingClient {
        calls: Arc<AtomicUsize>,
        message: &'static str,
    }

    impl LlmClient for FailingClient {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
            _tools: &[ToolDefinition],
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let message = self.message;
            Box::pin(async move { Err(SitesmithError::LlmRequest(message.to_string())) })
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&SitesmithError::LlmRequest("HTTP 429 Too Many Requests".into())));
        assert!(is_retryable(&SitesmithError::LlmStream("reset".into())));
        assert!(!is_retryable(&SitesmithError::LlmRequest("HTTP 401 Unauthorized".into())));
        assert!(!is_retryable(&SitesmithError::Config("bad".into())));
    }

    #[test]
    fn test_backoff_is_capped() {
        let cfg = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let d = calculate_backoff(8, &cfg);
        assert!(d <= Duration::from_millis(6000));
    }

    #[tokio::test]
    async fn test_retries_then_gives_up() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(FailingClient {
                calls: calls.clone(),
                message: "HTTP 503",
            }),
            vec![],
            fast_retry(2),
        );
        let result = client.chat_stream(&test_model_config(), vec![], &[]).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_skips_to_fallback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fallback = MockLlm::new().with_text_turn("from fallback");
        let client = RetryingClient::new(
            Box::new(FailingClient {
                calls: calls.clone(),
                message: "HTTP 401",
            }),
            vec![(test_model_config(), Box::new(fallback))],
            fast_retry(3),
        );
        let mut stream = client
            .chat_stream(&test_model_config(), vec![], &[])
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, StreamDelta::TextDelta(t) if t == "from fallback"));
    }
}
