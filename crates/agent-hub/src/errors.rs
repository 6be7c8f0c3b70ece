use crate::agent::AgentKind;

/// Caller-side problems that prevent a run from starting.
///
/// No network traffic happens when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("no agent selected")]
    MissingAgent,
    #[error("agent {0} requires an image")]
    MissingImage(AgentKind),
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("agent {0} does not support streaming runs")]
    NotStreamable(AgentKind),
    #[error("request targets agent {requested} but {active} is selected")]
    AgentMismatch {
        requested: AgentKind,
        active: AgentKind,
    },
    /// A run is already in flight for this controller.
    #[error("a run is already in progress")]
    RunInProgress,
}

impl PreconditionError {
    /// Short title and description for a user-facing notice.
    pub fn notice_text(&self) -> (&'static str, &'static str) {
        match self {
            Self::MissingAgent | Self::NotStreamable(_) | Self::AgentMismatch { .. } => {
                ("Select an agent", "Please choose an AI agent to run")
            }
            Self::MissingImage(_) => ("Upload an image", "Please upload a product image"),
            Self::EmptyPrompt => ("Enter a prompt", "Please provide a text prompt"),
            Self::RunInProgress => ("Run in progress", "Wait for the current run to finish"),
        }
    }
}

/// Stream open or read failure reported by a `RunTransport`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Request could not be sent or the connection failed.
    #[error("request failed: {0}")]
    Request(String),
    /// Backend answered with a non-success status.
    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },
    /// Reading the next chunk of the stream failed.
    #[error("stream read failed: {0}")]
    Read(String),
}

/// Terminal failure of a run, surfaced as the run result with `is_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunFailure {
    /// Stream open or read failed.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Backend sent an explicit error frame; the message is shown verbatim.
    #[error("{message}")]
    Upstream { message: String },
    /// Stream closed without a final result or error frame.
    #[error("stream ended without result")]
    IncompleteStream,
    /// Too many malformed frames.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl From<TransportError> for RunFailure {
    fn from(value: TransportError) -> Self {
        RunFailure::Transport {
            message: value.to_string(),
        }
    }
}

/// Failures of the document chat session manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Another chat call is still outstanding.
    #[error("a chat request is already in progress")]
    InProgress,
    /// A message was sent before any document created a session.
    #[error("no session: please upload a document first")]
    NoSession,
    #[error("message must not be empty")]
    EmptyMessage,
    /// The session was reset while the call was outstanding.
    #[error("chat session was reset")]
    Reset,
    #[error("document backend error: {0}")]
    Backend(String),
}

/// Top-level error type for the public API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Identifier outside the closed agent set.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}
