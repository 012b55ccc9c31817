use serde::Serialize;

use sitesmith_core::types::TaskId;

/// Mutable record threaded through every step of one workflow run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskState {
    pub task_id: TaskId,
    pub requirements: String,
    pub site_type: String,
    pub style_preferences: Option<String>,
    /// Label of the most recently completed step.
    pub current_step: String,
    pub skeleton_created: bool,
    pub content_generated: bool,
    pub content_ready: bool,
    pub verification_passed: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_result: Option<serde_json::Value>,
}

impl TaskState {
    pub fn new(
        task_id: TaskId,
        requirements: impl Into<String>,
        site_type: impl Into<String>,
        style_preferences: Option<String>,
    ) -> Self {
        Self {
            task_id,
            requirements: requirements.into(),
            site_type: site_type.into(),
            style_preferences,
            current_step: "start".to_string(),
            skeleton_created: false,
            content_generated: false,
            content_ready: false,
            verification_passed: false,
            attempts: 0,
            last_error: None,
            last_result: None,
        }
    }
}

/// Partial update produced by a step. `None` fields leave state untouched.
///
/// `last_error` and `last_result` are doubly optional so a step can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub current_step: Option<String>,
    pub skeleton_created: Option<bool>,
    pub content_generated: Option<bool>,
    pub content_ready: Option<bool>,
    pub verification_passed: Option<bool>,
    pub attempts: Option<u32>,
    pub last_error: Option<Option<String>>,
    pub last_result: Option<Option<serde_json::Value>>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, label: impl Into<String>) -> Self {
        self.current_step = Some(label.into());
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.last_error = Some(None);
        self
    }

    pub fn result(mut self, value: serde_json::Value) -> Self {
        self.last_result = Some(Some(value));
        self
    }

    /// Field-wise overwrite of `state`.
    pub fn apply_to(self, state: &mut TaskState) {
        if let Some(v) = self.current_step {
            state.current_step = v;
        }
        if let Some(v) = self.skeleton_created {
            state.skeleton_created = v;
        }
        if let Some(v) = self.content_generated {
            state.content_generated = v;
        }
        if let Some(v) = self.content_ready {
            state.content_ready = v;
        }
        if let Some(v) = self.verification_passed {
            state.verification_passed = v;
        }
        if let Some(v) = self.attempts {
            state.attempts = v;
        }
        if let Some(v) = self.last_error {
            state.last_error = v;
        }
        if let Some(v) = self.last_result {
            state.last_result = v;
        }
    }
}
