use std::time::Duration;

use crate::errors::HubError;
use crate::observability::parse_bool;
use crate::tools::TerminalToolPolicy;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Configuration shared by the run controller, the transports and the chat
/// session manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Backend base URL; also used to resolve relative image results.
    pub base_url: String,
    /// Optional HTTP timeout. Runs have no timeout of their own.
    pub timeout: Option<Duration>,
    /// Fail a run after this many malformed frames. `None` never fails.
    pub max_unparseable_lines: Option<usize>,
    /// Status given to tools still running when a run ends.
    pub terminal_tool_policy: TerminalToolPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            max_unparseable_lines: None,
            terminal_tool_policy: TerminalToolPolicy::default(),
        }
    }
}

impl HubConfig {
    /// Builds a config from the environment.
    ///
    /// - `AGENT_HUB_BASE_URL`: backend address (default `http://localhost:8000`).
    /// - `AGENT_HUB_TIMEOUT_SECS`: optional HTTP timeout in seconds.
    /// - `AGENT_HUB_MAX_UNPARSEABLE_LINES`: optional malformed-frame threshold.
    /// - `AGENT_HUB_FAIL_RUNNING_TOOLS`: mark running tools Failed when a run fails.
    pub fn from_env() -> Result<Self, HubError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HubError> {
        let mut config = Self::default();
        if let Some(base_url) = lookup("AGENT_HUB_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = base_url.trim().to_string();
        }
        if let Some(raw) = lookup("AGENT_HUB_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                HubError::Config(format!("AGENT_HUB_TIMEOUT_SECS is not a number: {raw}"))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(raw) = lookup("AGENT_HUB_MAX_UNPARSEABLE_LINES") {
            let max: usize = raw.trim().parse().map_err(|_| {
                HubError::Config(format!(
                    "AGENT_HUB_MAX_UNPARSEABLE_LINES is not a number: {raw}"
                ))
            })?;
            config.max_unparseable_lines = Some(max);
        }
        if let Some(raw) = lookup("AGENT_HUB_FAIL_RUNNING_TOOLS") {
            let fail = parse_bool(&raw).ok_or_else(|| {
                HubError::Config(format!("AGENT_HUB_FAIL_RUNNING_TOOLS is not a boolean: {raw}"))
            })?;
            if fail {
                config.terminal_tool_policy = TerminalToolPolicy::FailRunning;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the backend base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_unparseable_lines(mut self, max: usize) -> Self {
        self.max_unparseable_lines = Some(max);
        self
    }

    pub fn terminal_tool_policy(mut self, policy: TerminalToolPolicy) -> Self {
        self.terminal_tool_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), HubError> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(HubError::Config(format!(
                "base url must start with http:// or https://: {base}"
            )));
        }
        Ok(())
    }

    /// Joins `path` onto the base URL with exactly one slash between them.
    pub fn resolve(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
