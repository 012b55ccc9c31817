//! The site-generation workflow: skeleton, generate/check retry loop, verification.

pub mod checks;
pub mod skeleton;
pub mod steps;

use std::sync::Arc;

use sitesmith_core::config::AppConfig;
use sitesmith_core::error::Result;
use sitesmith_store::SiteStore;

use crate::generator::ContentGenerator;
use crate::graph::{Arm, Fallback, GraphBuilder, GraphExecutor, Route, Target, TaskState};
use steps::{CheckReadiness, CreateSkeleton, GenerateContent, VerifySite};

pub const CREATE_SKELETON: &str = "create_skeleton";
pub const GENERATE_CONTENT: &str = "generate_content";
pub const CHECK_READINESS: &str = "check_readiness";
pub const VERIFY_SITE: &str = "verify_site";

/// Route back to generation: content not ready and attempts remain.
pub fn should_continue(state: &TaskState, max_attempts: u32) -> bool {
    !state.content_ready && state.attempts < max_attempts
}

/// Route to verification. Complement of [`should_continue`].
pub fn should_verify(state: &TaskState, max_attempts: u32) -> bool {
    state.content_ready || state.attempts >= max_attempts
}

/// Assemble the site-generation graph.
pub fn build_site_graph(
    config: &AppConfig,
    store: Arc<SiteStore>,
    generator: Arc<dyn ContentGenerator>,
) -> Result<GraphExecutor> {
    let max_attempts = config.workflow.max_attempts;

    GraphBuilder::new(CREATE_SKELETON)
        .step(
            CREATE_SKELETON,
            CreateSkeleton {
                store: store.clone(),
                template_path: config.workflow.template_path.clone(),
                site_title: config.workflow.site_title.clone(),
            },
        )
        .step(
            GENERATE_CONTENT,
            GenerateContent::new(generator, &config.workflow, config.store.max_old_string_len),
        )
        .step(
            CHECK_READINESS,
            CheckReadiness {
                store: store.clone(),
                max_attempts,
            },
        )
        .step(VERIFY_SITE, VerifySite { store })
        .route(CREATE_SKELETON, Route::always(Target::step(GENERATE_CONTENT)))
        .route(GENERATE_CONTENT, Route::always(Target::step(CHECK_READINESS)))
        .route(
            CHECK_READINESS,
            Route::branch(
                vec![
                    Arm::new(
                        "should_continue",
                        move |s| should_continue(s, max_attempts),
                        Target::step(GENERATE_CONTENT),
                    ),
                    Arm::new(
                        "should_verify",
                        move |s| should_verify(s, max_attempts),
                        Target::step(VERIFY_SITE),
                    ),
                ],
                Fallback::Fail,
            ),
        )
        .route(VERIFY_SITE, Route::always(Target::End))
        .ceiling(config.workflow.max_iterations)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesmith_core::types::TaskId;

    #[test]
    fn test_guards_are_complements() {
        let mut state = TaskState::new(TaskId::new("t"), "req", "landing", None);
        for attempts in 0..6 {
            for ready in [false, true] {
                state.attempts = attempts;
                state.content_ready = ready;
                assert_ne!(
                    should_continue(&state, 3),
                    should_verify(&state, 3),
                    "attempts={attempts} ready={ready}"
                );
            }
        }
    }
}
