//! Step executor: a directed graph of named steps over a shared `TaskState`.
//!
//! Each step returns a partial `TaskUpdate` that is merged into the state.
//! Routes are either unconditional or an ordered list of guarded arms with an
//! explicit fallback. The `GraphExecutor` walks the graph from the entry step
//! until it reaches the terminal marker, finds no route, or spends its
//! iteration ceiling.

pub mod edge;
pub mod executor;
pub mod state;

pub use edge::{Arm, Fallback, Guard, Resolution, Route, Target};
pub use executor::{ExecutionResult, FnStep, GraphBuilder, GraphExecutor, Outcome, Step, StepRecord};
pub use state::{TaskState, TaskUpdate};
