use std::fmt;
use std::sync::Arc;

use super::state::TaskState;

/// Pure predicate over task state used to pick the next step.
pub type Guard = Arc<dyn Fn(&TaskState) -> bool + Send + Sync>;

/// Where a route leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Step(String),
    /// The reserved terminal marker.
    End,
}

impl Target {
    pub fn step(name: impl Into<String>) -> Self {
        Self::Step(name.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Step(name) => f.write_str(name),
            Target::End => f.write_str("END"),
        }
    }
}

/// One guarded arm of a branch.
#[derive(Clone)]
pub struct Arm {
    pub name: String,
    pub guard: Guard,
    pub target: Target,
}

impl Arm {
    pub fn new(
        name: impl Into<String>,
        guard: impl Fn(&TaskState) -> bool + Send + Sync + 'static,
        target: Target,
    ) -> Self {
        Self {
            name: name.into(),
            guard: Arc::new(guard),
            target,
        }
    }
}

impl fmt::Debug for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arm")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish()
    }
}

/// What happens when no arm of a branch matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    Goto(Target),
    /// Stop the run with a graph configuration error.
    Fail,
}

/// Outgoing routing of a step.
#[derive(Debug, Clone)]
pub enum Route {
    Always(Target),
    /// Arms are evaluated in declaration order against the post-update state;
    /// the first whose guard holds wins.
    Branch { arms: Vec<Arm>, fallback: Fallback },
}

/// Outcome of evaluating a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    Next { target: &'a Target, via: &'a str },
    NoMatch,
}

impl Route {
    pub fn always(target: Target) -> Self {
        Self::Always(target)
    }

    pub fn branch(arms: Vec<Arm>, fallback: Fallback) -> Self {
        Self::Branch { arms, fallback }
    }

    pub fn resolve(&self, state: &TaskState) -> Resolution<'_> {
        match self {
            Route::Always(target) => Resolution::Next {
                target,
                via: "always",
            },
            Route::Branch { arms, fallback } => {
                if let Some(arm) = arms.iter().find(|arm| (arm.guard)(state)) {
                    return Resolution::Next {
                        target: &arm.target,
                        via: &arm.name,
                    };
                }
                match fallback {
                    Fallback::Goto(target) => Resolution::Next {
                        target,
                        via: "fallback",
                    },
                    Fallback::Fail => Resolution::NoMatch,
                }
            }
        }
    }

    /// Every target this route can lead to.
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Route::Always(target) => vec![target],
            Route::Branch { arms, fallback } => {
                let mut targets: Vec<&Target> = arms.iter().map(|a| &a.target).collect();
                if let Fallback::Goto(target) = fallback {
                    targets.push(target);
                }
                targets
            }
        }
    }
}
