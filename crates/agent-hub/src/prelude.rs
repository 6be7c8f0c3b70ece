//! Common imports for typical hub usage.
pub use crate::{
    AgentHub, AgentKind, ChatMessage, ChatSender, Document, HubConfig, HubError, Notice,
    NoticeLevel, PreconditionError, RunEvent, RunRequest, RunSessionState, RunStatus, RunTicket,
    ToolState, ToolStatus,
};
