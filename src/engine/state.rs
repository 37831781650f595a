use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How a running aggregator should stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownMode {
    /// Stop taking updates, let an in-flight invocation finish
    Graceful,
    /// Stop taking updates, abandon an in-flight invocation and ignore its outcome
    Hard,
}

/// Aggregator runtime lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeState {
    Idle,
    Running {
        #[serde(skip)]
        start_time: Option<Instant>,
        subscriptions: usize,
    },
    Stopping {
        mode: ShutdownMode,
    },
    Stopped {
        #[serde(skip)]
        uptime: Option<Duration>,
    },
    Error {
        error_msg: String,
    },
}

impl RuntimeState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &RuntimeState) -> bool {
        use RuntimeState::*;

        matches!(
            (self, target),
            (Idle, Running { .. }) |
            (Idle, Error { .. }) |

            (Running { .. }, Stopping { .. }) |
            (Running { .. }, Error { .. }) |

            (Stopping { .. }, Stopped { .. }) |
            (Stopped { .. }, Running { .. }) |
            (Stopped { .. }, Error { .. }) |

            (Error { .. }, Idle)
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RuntimeState::Running { .. })
    }

    /// Get human-readable state name
    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Running { .. } => "Running",
            Self::Stopping { .. } => "Stopping",
            Self::Stopped { .. } => "Stopped",
            Self::Error { .. } => "Error",
        }
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::Idle
    }
}
