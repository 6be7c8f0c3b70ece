use crate::agent::AgentKind;
use crate::tools::ToolState;

/// Overall lifecycle of the current run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Read-only snapshot of a `RunSessionController`.
///
/// Published through a watch channel after every change; consumers render
/// from it and never write back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSessionState {
    /// Incremented by every `start` and `reset`.
    pub generation: u64,
    /// Active agent selection, if any.
    pub agent: Option<AgentKind>,
    pub status: RunStatus,
    /// Progress lines of the current run, in arrival order.
    pub log: Vec<String>,
    /// Final output, or the error message when `is_error` is set.
    pub result: Option<String>,
    pub is_error: bool,
    /// Tool roster state derived from `log` and `status`.
    pub tools: Vec<ToolState>,
}

impl RunSessionState {
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}
