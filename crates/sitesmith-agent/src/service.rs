use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use sitesmith_core::config::AppConfig;
use sitesmith_core::error::{Result, SitesmithError};
use sitesmith_core::traits::{LlmClient, Tool};
use sitesmith_core::types::{TaskId, ToolContext, ToolResult};
use sitesmith_store::{ManageSiteFilesTool, SiteMetadata, SiteStore, ToolRegistry, INDEX_FILE};

use crate::generator::{AgentGenerator, ContentGenerator};
use crate::graph::{ExecutionResult, GraphExecutor, Outcome, TaskState};
use crate::workflow::build_site_graph;

/// Arguments of `generate_site`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateSiteRequest {
    pub requirements: String,
    #[serde(default)]
    pub site_type: Option<String>,
    #[serde(default)]
    pub style_preferences: Option<String>,
}

/// Structured outcome of one generation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteResult {
    /// The artifact exists. Verification is reported separately.
    pub success: bool,
    pub site_id: TaskId,
    pub url: String,
    pub verification_passed: bool,
    pub attempts: u32,
    pub final_step: String,
    pub error: Option<String>,
}

/// Runs the site-generation workflow and records each run's metadata.
pub struct SiteService {
    config: AppConfig,
    store: Arc<SiteStore>,
    graph: GraphExecutor,
    last_issued: Mutex<Option<DateTime<Utc>>>,
}

impl SiteService {
    pub fn new(
        config: AppConfig,
        store: Arc<SiteStore>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Result<Self> {
        let graph = build_site_graph(&config, store.clone(), generator)?;
        Ok(Self {
            config,
            store,
            graph,
            last_issued: Mutex::new(None),
        })
    }

    /// Wire the default tool-calling generator over `llm`.
    pub fn with_llm(config: AppConfig, store: Arc<SiteStore>, llm: Arc<dyn LlmClient>) -> Result<Self> {
        let generator = AgentGenerator::new(
            llm,
            config.model.clone(),
            generator_tools(&config, store.clone()),
            store.clone(),
            &config.workflow,
        );
        Self::new(config, store, Arc::new(generator))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SiteStore> {
        &self.store
    }

    /// Allocate a timestamp-derived task id, strictly increasing per service.
    pub fn next_task_id(&self) -> TaskId {
        let mut last = self.last_issued.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        TaskId::from_timestamp(now)
    }

    pub async fn generate_site(&self, request: GenerateSiteRequest) -> Result<SiteResult> {
        if request.requirements.trim().is_empty() {
            return Err(SitesmithError::ToolValidation("requirements must not be empty".into()));
        }

        let task_id = self.next_task_id();
        let site_type = request
            .site_type
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "inferred from requirements".to_string());
        let style = request.style_preferences.filter(|s| !s.trim().is_empty());

        info!(task_id = %task_id, site_type = %site_type, "Starting site generation");

        let mut metadata =
            SiteMetadata::new(task_id.clone(), &request.requirements, &site_type, style.clone());
        self.store.write_metadata(&metadata).await?;

        let initial = TaskState::new(task_id.clone(), request.requirements, site_type, style);
        let ExecutionResult { state, outcome, .. } = self.graph.execute(initial).await;
        if outcome == Outcome::CeilingReached {
            warn!(task_id = %task_id, "Workflow stopped at the iteration ceiling");
        }

        let exists = self.store.exists(&task_id, INDEX_FILE).await;

        metadata.completed_at = Some(Utc::now());
        metadata.final_step = Some(state.current_step.clone());
        metadata.attempts = state.attempts;
        metadata.verification_passed = state.verification_passed;
        metadata.last_error = state.last_error.clone();
        if let Err(e) = self.store.write_metadata(&metadata).await {
            warn!(task_id = %task_id, error = %e, "Failed to write final metadata");
        }

        info!(
            task_id = %task_id,
            attempts = state.attempts,
            verified = state.verification_passed,
            final_step = %state.current_step,
            "Site generation finished"
        );

        Ok(SiteResult {
            success: exists,
            url: self.config.gateway.site_url(task_id.as_str()),
            site_id: task_id,
            verification_passed: state.verification_passed,
            attempts: state.attempts,
            final_step: state.current_step,
            error: state.last_error,
        })
    }
}

/// Registry the generator works with: only `manage_site_files`.
pub fn generator_tools(config: &AppConfig, store: Arc<SiteStore>) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(ManageSiteFilesTool::new(
        store,
        config.gateway.clone(),
        config.store.max_old_string_len,
    ));
    tools
}

/// `generate_site` exposed as a tool.
pub struct GenerateSiteTool {
    service: Arc<SiteService>,
}

impl GenerateSiteTool {
    pub fn new(service: Arc<SiteService>) -> Self {
        Self { service }
    }
}

impl Tool for GenerateSiteTool {
    fn name(&self) -> &str {
        "generate_site"
    }

    fn description(&self) -> &str {
        "Generate a complete, production-ready single-page website and save it to disk. \
         Returns a URL where the site can be viewed. Use this to create landing pages, \
         portfolios, games, dashboards, or web apps from scratch."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "requirements": {
                    "type": "string",
                    "description": "Detailed requirements and specifications for the website including features, design preferences, and functionality"
                },
                "site_type": {
                    "type": "string",
                    "description": "Optional: type of site (e.g., 'landing page', 'portfolio', 'game', 'dashboard', 'web app'). Inferred from requirements when omitted."
                },
                "style_preferences": {
                    "type": "string",
                    "description": "Optional styling preferences like color scheme, modern/minimal design, animations, etc."
                }
            },
            "required": ["requirements"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        let workflow = &self.service.config.workflow;
        workflow.generator_timeout_secs * u64::from(workflow.max_attempts.max(1)) + 60
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let request: GenerateSiteRequest = serde_json::from_value(input)
                .map_err(|e| SitesmithError::ToolValidation(e.to_string()))?;
            let result = self.service.generate_site(request).await?;
            let text = serde_json::to_string_pretty(&result)?;
            Ok(ToolResult {
                content: text,
                is_error: !result.success,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesmith_test_utils::{temp_sites_dir, test_app_config, MockLlm};

    #[test]
    fn test_task_ids_strictly_increase() {
        let dir = temp_sites_dir();
        let config = test_app_config(dir.path());
        let store = Arc::new(SiteStore::new(dir.path()));
        let service = SiteService::with_llm(config, store, Arc::new(MockLlm::new())).unwrap();

        let ids: Vec<TaskId> = (0..200).map(|_| service.next_task_id()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
        assert_eq!(ids[0].as_str().len(), "20250101_120000_000000".len());
    }

    #[tokio::test]
    async fn test_empty_requirements_rejected() {
        let dir = temp_sites_dir();
        let config = test_app_config(dir.path());
        let store = Arc::new(SiteStore::new(dir.path()));
        let service = SiteService::with_llm(config, store, Arc::new(MockLlm::new())).unwrap();

        let err = service
            .generate_site(GenerateSiteRequest {
                requirements: "  ".into(),
                site_type: None,
                style_preferences: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SitesmithError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn test_tool_rejects_missing_requirements() {
        let dir = temp_sites_dir();
        let config = test_app_config(dir.path());
        let store = Arc::new(SiteStore::new(dir.path()));
        let service = SiteService::with_llm(config, store, Arc::new(MockLlm::new())).unwrap();
        let tool = GenerateSiteTool::new(Arc::new(service));

        let err = tool
            .execute(json!({"site_type": "blog"}), ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SitesmithError::ToolValidation(_)));
        assert!(tool.timeout_secs() > 5);
    }
}
