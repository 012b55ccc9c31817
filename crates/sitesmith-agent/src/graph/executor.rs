use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use sitesmith_core::error::{Result, SitesmithError};

use super::edge::{Resolution, Route, Target};
use super::state::{TaskState, TaskUpdate};

/// A named unit of work in the graph: task state in, partial update out.
///
/// Handlers may perform I/O. An `Err` is recorded in `last_error` by the
/// executor; routing continues as if the step produced no other update.
pub trait Step: Send + Sync {
    fn run<'a>(&'a self, state: &'a TaskState) -> BoxFuture<'a, Result<TaskUpdate>>;
}

/// Adapter turning an async closure over an owned state into a [`Step`].
pub struct FnStep<F>(pub F);

impl<F, Fut> Step for FnStep<F>
where
    F: Fn(TaskState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskUpdate>> + Send + 'static,
{
    fn run<'a>(&'a self, state: &'a TaskState) -> BoxFuture<'a, Result<TaskUpdate>> {
        Box::pin((self.0)(state.clone()))
    }
}

/// Record of one step execution.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: String,
    pub succeeded: bool,
    pub elapsed_ms: u64,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The terminal marker was reached.
    Completed,
    /// The iteration ceiling ran out first.
    CeilingReached,
    /// A branch matched no arm and had no fallback target.
    NoRoute { from: String },
}

/// Result of running a whole graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub state: TaskState,
    pub path: Vec<StepRecord>,
    pub outcome: Outcome,
    pub total_elapsed_ms: u64,
}

/// Builder that validates a graph before it can run.
pub struct GraphBuilder {
    entry: String,
    steps: HashMap<String, Arc<dyn Step>>,
    routes: HashMap<String, Route>,
    ceiling: usize,
}

impl GraphBuilder {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            steps: HashMap::new(),
            routes: HashMap::new(),
            ceiling: 20,
        }
    }

    pub fn step(mut self, name: impl Into<String>, step: impl Step + 'static) -> Self {
        self.steps.insert(name.into(), Arc::new(step));
        self
    }

    pub fn route(mut self, from: impl Into<String>, route: Route) -> Self {
        self.routes.insert(from.into(), route);
        self
    }

    /// Maximum number of step executions per run.
    pub fn ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Check that the entry exists, every step has a route, and every
    /// route target names a declared step or the terminal marker.
    pub fn build(self) -> Result<GraphExecutor> {
        if !self.steps.contains_key(&self.entry) {
            return Err(SitesmithError::Workflow(format!(
                "entry step '{}' is not declared",
                self.entry
            )));
        }
        if self.ceiling == 0 {
            return Err(SitesmithError::Workflow("iteration ceiling must be at least 1".into()));
        }
        for name in self.steps.keys() {
            if !self.routes.contains_key(name) {
                return Err(SitesmithError::Workflow(format!(
                    "step '{}' has no outgoing route",
                    name
                )));
            }
        }
        for (from, route) in &self.routes {
            if !self.steps.contains_key(from) {
                return Err(SitesmithError::Workflow(format!(
                    "route declared from unknown step '{}'",
                    from
                )));
            }
            for target in route.targets() {
                if let Target::Step(name) = target {
                    if !self.steps.contains_key(name) {
                        return Err(SitesmithError::Workflow(format!(
                            "route from '{}' targets unknown step '{}'",
                            from, name
                        )));
                    }
                }
            }
        }

        Ok(GraphExecutor {
            entry: self.entry,
            steps: self.steps,
            routes: self.routes,
            ceiling: self.ceiling,
        })
    }
}

/// Runs a declared graph of steps over a task state.
///
/// Starting from the entry step, each iteration runs the current step,
/// merges its update, then follows the route resolved against the merged
/// state. A run ends at the terminal marker, when no route matches, or when
/// the iteration ceiling is spent.
pub struct GraphExecutor {
    entry: String,
    steps: HashMap<String, Arc<dyn Step>>,
    routes: HashMap<String, Route>,
    ceiling: usize,
}

impl GraphExecutor {
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub async fn execute(&self, initial: TaskState) -> ExecutionResult {
        let start = Instant::now();
        let mut state = initial;
        let mut path = Vec::new();
        let mut current = self.entry.clone();

        for iteration in 0..self.ceiling {
            let (Some(step), Some(route)) = (self.steps.get(&current), self.routes.get(&current))
            else {
                // Unreachable for graphs built through GraphBuilder.
                state.last_error = Some(format!("graph config error: unknown step '{}'", current));
                return finish(state, path, Outcome::NoRoute { from: current }, start);
            };

            debug!(task_id = %state.task_id, step = %current, iteration, "Running step");
            let step_start = Instant::now();
            let succeeded = match step.run(&state).await {
                Ok(update) => {
                    update.apply_to(&mut state);
                    true
                }
                Err(e) => {
                    error!(task_id = %state.task_id, step = %current, error = %e, "Step failed");
                    state.last_error = Some(e.to_string());
                    false
                }
            };
            path.push(StepRecord {
                step: current.clone(),
                succeeded,
                elapsed_ms: step_start.elapsed().as_millis() as u64,
            });

            match route.resolve(&state) {
                Resolution::Next {
                    target: Target::End,
                    via,
                } => {
                    debug!(task_id = %state.task_id, from = %current, via, "Reached end");
                    info!(
                        task_id = %state.task_id,
                        steps = path.len(),
                        final_step = %state.current_step,
                        "Workflow complete"
                    );
                    return finish(state, path, Outcome::Completed, start);
                }
                Resolution::Next {
                    target: Target::Step(next),
                    via,
                } => {
                    debug!(task_id = %state.task_id, from = %current, to = %next, via, "Routing");
                    current = next.clone();
                }
                Resolution::NoMatch => {
                    warn!(task_id = %state.task_id, from = %current, "No route matched");
                    state.last_error = Some(format!(
                        "graph config error: no route matched from step '{}'",
                        current
                    ));
                    return finish(state, path, Outcome::NoRoute { from: current }, start);
                }
            }
        }

        warn!(
            task_id = %state.task_id,
            ceiling = self.ceiling,
            last_step = %state.current_step,
            "Iteration ceiling reached"
        );
        finish(state, path, Outcome::CeilingReached, start)
    }
}

fn finish(state: TaskState, path: Vec<StepRecord>, outcome: Outcome, start: Instant) -> ExecutionResult {
    ExecutionResult {
        state,
        path,
        outcome,
        total_elapsed_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::{Arm, Fallback};
    use sitesmith_core::types::TaskId;

    fn initial() -> TaskState {
        TaskState::new(TaskId::new("t"), "req", "landing", None)
    }

    fn label(name: &'static str) -> FnStep<impl Fn(TaskState) -> futures::future::Ready<Result<TaskUpdate>>> {
        FnStep(move |_s: TaskState| futures::future::ready(Ok(TaskUpdate::new().step(name))))
    }

    fn bump() -> FnStep<impl Fn(TaskState) -> futures::future::Ready<Result<TaskUpdate>>> {
        FnStep(|s: TaskState| {
            futures::future::ready(Ok(TaskUpdate {
                attempts: Some(s.attempts + 1),
                ..TaskUpdate::new().step("bumped")
            }))
        })
    }

    #[tokio::test]
    async fn test_linear_graph_completes() {
        let graph = GraphBuilder::new("a")
            .step("a", label("a_done"))
            .step("b", label("b_done"))
            .route("a", Route::always(Target::step("b")))
            .route("b", Route::always(Target::End))
            .build()
            .unwrap();

        let result = graph.execute(initial()).await;
        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(result.state.current_step, "b_done");
        let steps: Vec<&str> = result.path.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(steps, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_guards_see_post_update_state() {
        let graph = GraphBuilder::new("bump")
            .step("bump", bump())
            .route(
                "bump",
                Route::branch(
                    vec![
                        Arm::new("again", |s| s.attempts < 3, Target::step("bump")),
                        Arm::new("done", |s| s.attempts >= 3, Target::End),
                    ],
                    Fallback::Fail,
                ),
            )
            .build()
            .unwrap();

        let result = graph.execute(initial()).await;
        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(result.state.attempts, 3);
        assert_eq!(result.path.len(), 3);
    }

    #[tokio::test]
    async fn test_cycle_stops_at_ceiling() {
        let graph = GraphBuilder::new("bump")
            .step("bump", bump())
            .route("bump", Route::always(Target::step("bump")))
            .ceiling(7)
            .build()
            .unwrap();

        let result = graph.execute(initial()).await;
        assert_eq!(result.outcome, Outcome::CeilingReached);
        assert_eq!(result.path.len(), 7);
        assert_eq!(result.state.attempts, 7);
        assert!(result.state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_step_records_error_and_keeps_routing() {
        let failing = FnStep(|_s: TaskState| async {
            Err::<TaskUpdate, _>(SitesmithError::Store("disk full".into()))
        });
        let graph = GraphBuilder::new("fail")
            .step("fail", failing)
            .step("after", label("after_done"))
            .route(
                "fail",
                Route::branch(
                    vec![Arm::new("errored", |s| s.last_error.is_some(), Target::step("after"))],
                    Fallback::Fail,
                ),
            )
            .route("after", Route::always(Target::End))
            .build()
            .unwrap();

        let result = graph.execute(initial()).await;
        assert_eq!(result.outcome, Outcome::Completed);
        assert!(!result.path[0].succeeded);
        assert_eq!(result.state.current_step, "after_done");
        assert_eq!(result.state.last_error.as_deref(), Some("Store error: disk full"));
    }

    #[tokio::test]
    async fn test_no_matching_route_sets_config_error() {
        let graph = GraphBuilder::new("a")
            .step("a", label("a_done"))
            .route(
                "a",
                Route::branch(vec![Arm::new("never", |_| false, Target::End)], Fallback::Fail),
            )
            .build()
            .unwrap();

        let result = graph.execute(initial()).await;
        assert_eq!(result.outcome, Outcome::NoRoute { from: "a".into() });
        assert_eq!(result.state.current_step, "a_done");
        assert!(result
            .state
            .last_error
            .as_deref()
            .unwrap()
            .starts_with("graph config error"));
    }

    #[test]
    fn test_builder_rejects_invalid_graphs() {
        assert!(GraphBuilder::new("missing").build().is_err());

        let no_route = GraphBuilder::new("a").step("a", label("a")).build();
        assert!(no_route.is_err());

        let dangling = GraphBuilder::new("a")
            .step("a", label("a"))
            .route("a", Route::always(Target::step("ghost")))
            .build();
        assert!(matches!(dangling, Err(SitesmithError::Workflow(m)) if m.contains("ghost")));
    }
}
