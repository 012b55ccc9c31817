//! Mocks and fixtures shared by the Sitesmith test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use sitesmith_core::config::{AppConfig, ModelConfig};
use sitesmith_core::error::{Result, SitesmithError};
use sitesmith_core::traits::LlmClient;
use sitesmith_core::types::{ChatMessage, StopReason, StreamDelta, ToolDefinition};

/// One scripted LLM response.
#[derive(Debug, Clone)]
pub enum MockTurn {
    Deltas(Vec<StreamDelta>),
    Fail(String),
}

/// A scripted `LlmClient`. Each `chat_stream` call pops the next turn.
///
/// Running out of turns is reported as a request error.
#[derive(Clone, Default)]
pub struct MockLlm {
    turns: Arc<Mutex<VecDeque<MockTurn>>>,
    requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turn(self, turn: MockTurn) -> Self {
        self.turns.lock().unwrap().push_back(turn);
        self
    }

    /// A plain text answer that ends the turn.
    pub fn with_text_turn(self, text: &str) -> Self {
        self.with_turn(MockTurn::Deltas(vec![
            StreamDelta::TextDelta(text.to_string()),
            StreamDelta::Stop(StopReason::EndTurn),
        ]))
    }

    /// A single tool call whose JSON input is streamed in two pieces.
    pub fn with_tool_call_turn(self, id: &str, name: &str, input: serde_json::Value) -> Self {
        let json = input.to_string();
        let split = json.len() / 2;
        let split = (split..json.len())
            .find(|i| json.is_char_boundary(*i))
            .unwrap_or(json.len());
        self.with_turn(MockTurn::Deltas(vec![
            StreamDelta::ToolUseStart {
                index: 0,
                id: id.to_string(),
                name: name.to_string(),
            },
            StreamDelta::ToolInputDelta {
                index: 0,
                delta: json[..split].to_string(),
            },
            StreamDelta::ToolInputDelta {
                index: 0,
                delta: json[split..].to_string(),
            },
            StreamDelta::Stop(StopReason::ToolUse),
        ]))
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.with_turn(MockTurn::Fail(message.to_string()))
    }

    /// Message lists received so far, one entry per call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().unwrap().len()
    }
}

impl LlmClient for MockLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
        _tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.requests.lock().unwrap().push(messages);
        let turn = self.turns.lock().unwrap().pop_front();
        Box::pin(async move {
            match turn {
                Some(MockTurn::Deltas(deltas)) => {
                    let stream = futures::stream::iter(deltas.into_iter().map(Ok));
                    Ok(Box::pin(stream) as BoxStream<'_, Result<StreamDelta>>)
                }
                Some(MockTurn::Fail(message)) => Err(SitesmithError::LlmRequest(message)),
                None => Err(SitesmithError::LlmRequest("mock script exhausted".into())),
            }
        })
    }
}

pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        provider: "mock".into(),
        model_id: "mock-model".into(),
        api_key: None,
        base_url: None,
        max_tokens: 1024,
        temperature: 0.0,
        retry: None,
        extra_headers: HashMap::new(),
    }
}

/// App config rooted at `sites_dir`, with fast generator limits.
pub fn test_app_config(sites_dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::from_env();
    config.model = test_model_config();
    config.fallback_models.clear();
    config.store.sites_dir = sites_dir.display().to_string();
    config.workflow.generator_timeout_secs = 5;
    config
}

/// Temporary directory for a site tree.
pub fn temp_sites_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create temp sites dir")
}

/// Page body that satisfies both the readiness and verification checks
/// once it replaces the content placeholder of the built-in skeleton.
pub fn sample_site_body() -> String {
    let mut body = String::from(
        r#"<script type="text/babel">
      const { useState } = React;
      function App() {
        const [count, setCount] = useState(0);
        return (
          <main className="min-h-screen flex flex-col items-center justify-center bg-slate-50">
            <h1 className="text-5xl font-bold text-slate-900">Simple Landing Page</h1>
            <p className="mt-4 text-lg text-slate-600">A clean landing page generated for testing.</p>
            <button className="mt-8 rounded bg-indigo-600 px-6 py-3 text-white" onClick={() => setCount(count + 1)}>
              Clicked {count} times
            </button>
          </main>
        );
      }
      ReactDOM.createRoot(document.getElementById("root")).render(<App />);
    </script>"#,
    );
    body.push('\n');
    body
}

/// A complete page that passes verification on its own.
pub fn sample_site_html() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Simple Landing Page</title>
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    <script crossorigin src="https://unpkg.com/react@18/umd/react.production.min.js"></script>
    <script crossorigin src="https://unpkg.com/react-dom@18/umd/react-dom.production.min.js"></script>
    <script src="https://unpkg.com/@babel/standalone/babel.min.js"></script>
</head>
<body>
    <div id="root"></div>
    {}
</body>
</html>"#,
        sample_site_body()
    )
}
