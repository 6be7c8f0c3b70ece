//! Agent hub client: launches backend AI agents, follows their event streams
//! and tracks per-run session state.
//!
//! Streaming agents (SEO copy, image enhancement) run through
//! [`RunSessionController`]; the document agent is a multi-turn
//! [`ChatSessionManager`]. [`AgentHub`] owns both and resets them whenever the
//! active agent changes.
//!
//! # Streaming a run
//!
//! ```no_run
//! use agent_hub::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), HubError> {
//! let hub = AgentHub::builder().config(HubConfig::from_env()?).build()?;
//! hub.select_agent(Some(AgentKind::Seo));
//!
//! let request = RunRequest::builder()
//!     .image(std::fs::read("bottle.png").unwrap_or_default())
//!     .prompt("Eco-friendly water bottle");
//!
//! let state = hub.run(request)?.wait().await;
//! match state.status {
//!     RunStatus::Completed => println!("{}", state.result.unwrap_or_default()),
//!     _ => eprintln!("{}", state.result.unwrap_or_default()),
//! }
//! # Ok(())
//! # }
//! ```

/// Agent catalogue: kinds, modes, tool rosters and prompt suggestions.
pub mod agent;
/// Document chat sessions and their backend contract.
pub mod chat;
/// Classification of decoded lines into run events.
pub mod classifier;
/// Environment-driven hub configuration.
pub mod config;
/// Run session controller and run tickets.
pub mod controller;
/// Byte-chunk to line decoder for event streams.
pub mod decoder;
/// Public error types.
pub mod errors;
/// Hub entry point and builder.
pub mod hub;
/// User-facing notices and sinks.
pub mod notify;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Run requests and precondition checks.
pub mod request;
/// Observable run session state.
pub mod state;
/// Tool roster status inference.
pub mod tools;
/// Run stream transports.
pub mod transport;

pub use agent::{AgentKind, AgentMode, OutputKind, ToolDescriptor};
pub use chat::{
    AgentReply, ChatMessage, ChatSender, ChatSessionManager, ChatSnapshot, Document,
    DocumentBackend, HttpDocumentBackend,
};
pub use classifier::{RunEvent, classify_line};
pub use config::HubConfig;
pub use controller::{RunSessionController, RunTicket};
pub use decoder::EventLineDecoder;
pub use errors::{ChatError, HubError, PreconditionError, RunFailure, TransportError};
pub use hub::{AgentHub, AgentHubBuilder};
pub use notify::{LogNotifier, Notice, NoticeLevel, NotificationSink};
pub use observability::init_observability;
pub use request::{RunRequest, RunRequestBuilder};
pub use state::{RunSessionState, RunStatus};
pub use tools::{
    LogSubstringInferencer, TerminalToolPolicy, ToolActivityInferencer, ToolState, ToolStatus,
};
pub use transport::{ByteStream, HttpRunTransport, RunTransport};
