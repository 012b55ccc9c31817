use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::{error, info, warn};

use sitesmith_core::config::WorkflowConfig;
use sitesmith_core::error::Result;
use sitesmith_store::{SiteStore, INDEX_FILE};

use super::checks::{is_content_complete, VerificationReport, VERIFICATION_FAILED};
use super::skeleton;
use crate::generator::{ContentGenerator, GenerationRequest};
use crate::graph::{Step, TaskState, TaskUpdate};

/// Renders the skeleton template into `index.html`.
pub struct CreateSkeleton {
    pub store: Arc<SiteStore>,
    pub template_path: Option<String>,
    pub site_title: String,
}

impl Step for CreateSkeleton {
    fn run<'a>(&'a self, state: &'a TaskState) -> BoxFuture<'a, Result<TaskUpdate>> {
        Box::pin(async move {
            let template = skeleton::load_template(self.template_path.as_deref()).await?;
            let html = skeleton::render(&template, &self.site_title, &state.requirements);

            let outcome = self
                .store
                .create(&state.task_id, INDEX_FILE, Some(&html))
                .await;
            let update = TaskUpdate {
                skeleton_created: Some(outcome.success),
                ..TaskUpdate::new()
            };

            if outcome.success {
                Ok(update
                    .step("skeleton_created")
                    .clear_error()
                    .result(json!({"file_path": INDEX_FILE, "bytes": html.len()})))
            } else {
                warn!(task_id = %state.task_id, error = %outcome.summary(), "Skeleton write failed");
                Ok(update.step("skeleton_failed").error(outcome.summary()))
            }
        })
    }
}

/// Runs the content generator once, counting the attempt.
pub struct GenerateContent {
    pub generator: Arc<dyn ContentGenerator>,
    pub max_attempts: u32,
    pub max_old_string_len: usize,
}

impl Step for GenerateContent {
    fn run<'a>(&'a self, state: &'a TaskState) -> BoxFuture<'a, Result<TaskUpdate>> {
        Box::pin(async move {
            let attempt = state.attempts + 1;
            let request = GenerationRequest {
                task_id: state.task_id.clone(),
                requirements: state.requirements.clone(),
                site_type: state.site_type.clone(),
                style_preferences: state.style_preferences.clone(),
                attempt,
                max_attempts: self.max_attempts,
                max_old_string_len: self.max_old_string_len,
            };
            info!(task_id = %state.task_id, attempt, max = self.max_attempts, "Generating content");

            let update = TaskUpdate {
                attempts: Some(attempt),
                ..TaskUpdate::new()
            };
            match self.generator.generate(&request).await {
                Ok(summary) => Ok(TaskUpdate {
                    content_generated: Some(true),
                    ..update
                        .step("content_generated")
                        .clear_error()
                        .result(json!(summary))
                }),
                Err(e) => {
                    error!(task_id = %state.task_id, attempt, error = %e, "Content generation failed");
                    let exhausted = attempt >= self.max_attempts;
                    Ok(TaskUpdate {
                        content_generated: Some(false),
                        // Stop retrying a collaborator that keeps failing.
                        content_ready: exhausted.then_some(true),
                        ..update.step("content_generation_failed").error(e.to_string())
                    })
                }
            }
        })
    }
}

/// Recomputes `content_ready` from the artifact. Never fails.
pub struct CheckReadiness {
    pub store: Arc<SiteStore>,
    pub max_attempts: u32,
}

impl Step for CheckReadiness {
    fn run<'a>(&'a self, state: &'a TaskState) -> BoxFuture<'a, Result<TaskUpdate>> {
        Box::pin(async move {
            let content = self.store.read_to_string(&state.task_id, INDEX_FILE).await;
            let complete = content.as_deref().is_some_and(is_content_complete);
            let ready = complete || state.attempts >= self.max_attempts;

            info!(
                task_id = %state.task_id,
                attempts = state.attempts,
                complete,
                ready,
                "Checked content readiness"
            );
            Ok(TaskUpdate {
                content_ready: Some(ready),
                ..TaskUpdate::new().step(if ready { "content_ready" } else { "content_incomplete" })
            })
        })
    }
}

/// Final structural verification of `index.html`.
pub struct VerifySite {
    pub store: Arc<SiteStore>,
}

impl Step for VerifySite {
    fn run<'a>(&'a self, state: &'a TaskState) -> BoxFuture<'a, Result<TaskUpdate>> {
        Box::pin(async move {
            let report = match self.store.read_to_string(&state.task_id, INDEX_FILE).await {
                Some(content) => VerificationReport::inspect(&content),
                None => VerificationReport::missing(),
            };
            let passed = report.passed();
            if !passed {
                warn!(task_id = %state.task_id, report = ?report, "Site verification failed");
            }

            let update = TaskUpdate {
                verification_passed: Some(passed),
                ..TaskUpdate::new().result(json!(report))
            };
            Ok(if passed {
                update.step("verified").clear_error()
            } else {
                update.step("verification_failed").error(VERIFICATION_FAILED)
            })
        })
    }
}

impl GenerateContent {
    pub fn new(generator: Arc<dyn ContentGenerator>, workflow: &WorkflowConfig, max_old_string_len: usize) -> Self {
        Self {
            generator,
            max_attempts: workflow.max_attempts,
            max_old_string_len,
        }
    }
}
