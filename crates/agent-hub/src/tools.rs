use crate::agent::{AgentKind, ToolDescriptor};
use crate::state::RunStatus;

/// Lifecycle of one tool within a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Idle,
    Running,
    Completed,
    /// Only reported under [`TerminalToolPolicy::FailRunning`].
    Failed,
}

/// Derived state of one roster entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolState {
    pub descriptor: ToolDescriptor,
    pub status: ToolStatus,
}

/// What happens to tools still running when the run reaches a terminal state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TerminalToolPolicy {
    /// Running tools become Completed, whether the run succeeded or failed.
    #[default]
    CompleteRunning,
    /// Running tools become Completed on success and Failed on failure.
    FailRunning,
}

/// Derives per-tool state for the active agent.
///
/// Implementations must be pure: the same inputs always produce the same
/// output, in roster order.
pub trait ToolActivityInferencer: Send + Sync {
    fn infer(&self, agent: AgentKind, log: &[String], status: RunStatus) -> Vec<ToolState>;
}

/// Infers tool activity by looking for tool names in run log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSubstringInferencer {
    policy: TerminalToolPolicy,
}

impl LogSubstringInferencer {
    pub fn new(policy: TerminalToolPolicy) -> Self {
        Self { policy }
    }

    fn terminal_status(&self, status: RunStatus) -> ToolStatus {
        match (status, self.policy) {
            (RunStatus::Failed, TerminalToolPolicy::FailRunning) => ToolStatus::Failed,
            _ => ToolStatus::Completed,
        }
    }
}

impl ToolActivityInferencer for LogSubstringInferencer {
    fn infer(&self, agent: AgentKind, log: &[String], status: RunStatus) -> Vec<ToolState> {
        let roster = agent.tools();
        if status == RunStatus::Idle {
            return idle_roster(roster);
        }

        let needles: Vec<String> = roster.iter().map(|d| d.name.to_lowercase()).collect();
        let mut seen = vec![false; roster.len()];
        let mut remaining = roster.len();
        for line in log {
            if remaining == 0 {
                break;
            }
            let line = line.to_lowercase();
            for (needle, hit) in needles.iter().zip(seen.iter_mut()) {
                if !*hit && line.contains(needle.as_str()) {
                    *hit = true;
                    remaining -= 1;
                }
            }
        }

        roster
            .iter()
            .zip(seen)
            .map(|(descriptor, seen)| {
                let status = match (seen, status) {
                    (false, _) => ToolStatus::Idle,
                    (true, RunStatus::Completed | RunStatus::Failed) => {
                        self.terminal_status(status)
                    }
                    (true, _) => ToolStatus::Running,
                };
                ToolState {
                    descriptor: *descriptor,
                    status,
                }
            })
            .collect()
    }
}

/// Roster with every tool Idle, as shown before and at the start of a run.
pub fn idle_roster(roster: &[ToolDescriptor]) -> Vec<ToolState> {
    roster
        .iter()
        .map(|descriptor| ToolState {
            descriptor: *descriptor,
            status: ToolStatus::Idle,
        })
        .collect()
}
