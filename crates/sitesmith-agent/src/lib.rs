pub mod generator;
pub mod graph;
pub mod prompt;
pub mod service;
pub mod workflow;

pub use generator::{AgentGenerator, ContentGenerator, GenerationRequest};
pub use graph::{ExecutionResult, GraphBuilder, GraphExecutor, Outcome, Step, TaskState, TaskUpdate};
pub use service::{GenerateSiteRequest, GenerateSiteTool, SiteResult, SiteService};
