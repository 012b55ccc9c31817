use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use sitesmith_core::config::{ModelConfig, WorkflowConfig};
use sitesmith_core::error::{Result, SitesmithError};
use sitesmith_core::traits::LlmClient;
use sitesmith_core::types::*;
use sitesmith_store::{SiteStore, ToolRegistry, INDEX_FILE};

use crate::prompt::{generation_prompt, GENERATOR_SYSTEM_PROMPT};
use crate::workflow::skeleton::CONTENT_PLACEHOLDER;

/// Inputs for one content-generation attempt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task_id: TaskId,
    pub requirements: String,
    pub site_type: String,
    pub style_preferences: Option<String>,
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    pub max_old_string_len: usize,
}

/// The collaborator that fills a skeleton with content.
///
/// Opaque to the workflow: it may perform any number of artifact operations
/// before returning a short summary.
pub trait ContentGenerator: Send + Sync {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> BoxFuture<'a, Result<String>>;
}

/// Tool calls beyond this index in one turn are dropped.
const MAX_TOOL_CALLS_PER_TURN: usize = 32;

/// Accumulator for streaming tool call deltas.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

/// Tool-calling loop that edits the artifact through `manage_site_files`.
pub struct AgentGenerator {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    tools: ToolRegistry,
    store: Arc<SiteStore>,
    max_turns: usize,
    max_duration: Duration,
}

impl AgentGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        tools: ToolRegistry,
        store: Arc<SiteStore>,
        workflow: &WorkflowConfig,
    ) -> Self {
        Self {
            llm,
            model,
            tools,
            store,
            max_turns: workflow.generator_max_turns,
            max_duration: Duration::from_secs(workflow.generator_timeout_secs),
        }
    }

    async fn run_loop(&self, req: &GenerationRequest) -> Result<String> {
        let start = Instant::now();
        let tool_defs = self.tools.definitions();
        let ctx = ToolContext {
            task_id: Some(req.task_id.clone()),
        };
        let mut messages = vec![
            ChatMessage::system(GENERATOR_SYSTEM_PROMPT),
            ChatMessage::user(generation_prompt(req)),
        ];

        for turn in 0..self.max_turns {
            debug!(task_id = %req.task_id, attempt = req.attempt, turn, "Starting generator turn");

            let mut stream = self
                .llm
                .chat_stream(&self.model, messages.clone(), &tool_defs)
                .await?;

            let mut text_content = String::new();
            let mut tool_calls: Vec<ToolCallAccumulator> = Vec::new();
            let mut stop_reason = None;

            while let Some(delta) = stream.next().await {
                match delta? {
                    StreamDelta::TextDelta(text) => text_content.push_str(&text),
                    StreamDelta::ToolUseStart { index, .. } if index >= MAX_TOOL_CALLS_PER_TURN => {
                        warn!(task_id = %req.task_id, index, "Ignoring tool call with out-of-range index");
                    }
                    StreamDelta::ToolUseStart { index, id, name } => {
                        if tool_calls.len() <= index {
                            tool_calls.resize_with(index + 1, ToolCallAccumulator::default);
                        }
                        tool_calls[index].id = id;
                        tool_calls[index].name = name;
                    }
                    StreamDelta::ToolInputDelta { index, delta } => {
                        if let Some(tc) = tool_calls.get_mut(index) {
                            tc.input_json.push_str(&delta);
                        }
                    }
                    StreamDelta::Stop(reason) => stop_reason = Some(reason),
                    StreamDelta::Usage { .. } => {}
                }
            }
            drop(stream);

            tool_calls.retain(|tc| !tc.name.is_empty());

            let mut content_blocks = Vec::new();
            if !text_content.is_empty() {
                content_blocks.push(ContentBlock::Text {
                    text: text_content.clone(),
                });
            }
            let parsed_inputs: Vec<serde_json::Value> = tool_calls
                .iter()
                .map(|tc| serde_json::from_str(&tc.input_json).unwrap_or(serde_json::Value::Null))
                .collect();
            for (tc, input) in tool_calls.iter().zip(parsed_inputs.iter()) {
                content_blocks.push(ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: input.clone(),
                });
            }
            messages.push(ChatMessage {
                role: Role::Assistant,
                content: content_blocks,
                timestamp: Some(chrono::Utc::now()),
            });

            if tool_calls.is_empty() {
                if stop_reason == Some(StopReason::MaxTokens) {
                    warn!(task_id = %req.task_id, "Generator hit max tokens");
                }
                self.adopt_inline_document(req, &text_content).await;
                info!(
                    task_id = %req.task_id,
                    attempt = req.attempt,
                    turns = turn + 1,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Generation attempt finished"
                );
                return Ok(text_content);
            }

            let mut results = Vec::with_capacity(tool_calls.len());
            for (tc, input) in tool_calls.iter().zip(parsed_inputs) {
                let result = match self.tools.execute(&tc.name, input, ctx.clone()).await {
                    Ok(r) => r,
                    Err(e) => {
                        error!(tool = %tc.name, error = %e, "Tool execution failed");
                        ToolResult::error(e.to_string())
                    }
                };
                debug!(tool = %tc.name, is_error = result.is_error, "Tool call complete");
                results.push(ContentBlock::ToolResult {
                    tool_use_id: tc.id.clone(),
                    content: result.content,
                    is_error: result.is_error,
                });
            }
            messages.push(ChatMessage {
                role: Role::User,
                content: results,
                timestamp: Some(chrono::Utc::now()),
            });
        }

        Err(SitesmithError::MaxTurnsExceeded(self.max_turns))
    }

    /// When the model answers with a whole HTML document instead of editing
    /// the file, and the file still carries its content placeholder, write
    /// the document in place.
    async fn adopt_inline_document(&self, req: &GenerationRequest, text: &str) {
        let Some(html) = extract_html_document(text) else {
            return;
        };
        let current = self.store.read_to_string(&req.task_id, INDEX_FILE).await;
        if current.as_deref().is_some_and(|c| !c.contains(CONTENT_PLACEHOLDER)) {
            return;
        }

        let outcome = match current {
            Some(existing) => {
                self.store
                    .edit(&req.task_id, INDEX_FILE, &existing, &html)
                    .await
            }
            None => self.store.create(&req.task_id, INDEX_FILE, Some(&html)).await,
        };
        if outcome.success {
            info!(task_id = %req.task_id, bytes = html.len(), "Adopted inline HTML document");
        } else {
            warn!(task_id = %req.task_id, error = %outcome.summary(), "Could not adopt inline HTML document");
        }
    }
}

impl ContentGenerator for AgentGenerator {
    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            match tokio::time::timeout(self.max_duration, self.run_loop(request)).await {
                Ok(result) => result,
                Err(_) => Err(SitesmithError::MaxDurationExceeded(self.max_duration.as_secs())),
            }
        })
    }
}

/// Pull a full HTML document out of a reply, stripping markdown fences.
pub fn extract_html_document(text: &str) -> Option<String> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```html") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    let body = body.trim();

    let lower = body.get(..15).unwrap_or(body).to_ascii_lowercase();
    let is_document = lower.starts_with("<!doctype html") || lower.starts_with("<html");
    (is_document && body.to_ascii_lowercase().ends_with("</html>")).then(|| body.to_string())
}
