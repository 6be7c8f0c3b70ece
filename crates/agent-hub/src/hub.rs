use std::sync::Arc;

use crate::agent::AgentKind;
use crate::chat::{ChatSessionManager, DocumentBackend, HttpDocumentBackend};
use crate::config::HubConfig;
use crate::controller::{RunSessionController, RunTicket};
use crate::errors::{HubError, PreconditionError};
use crate::notify::{LogNotifier, NotificationSink};
use crate::request::RunRequestBuilder;
use crate::tools::{LogSubstringInferencer, ToolActivityInferencer};
use crate::transport::{HttpRunTransport, RunTransport};

/// Application-level owner of the agent selection, the run controller and the
/// chat session.
#[derive(Clone)]
pub struct AgentHub {
    config: HubConfig,
    runs: RunSessionController,
    chat: ChatSessionManager,
}

impl AgentHub {
    pub fn builder() -> AgentHubBuilder {
        AgentHubBuilder::default()
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn runs(&self) -> &RunSessionController {
        &self.runs
    }

    pub fn chat(&self) -> &ChatSessionManager {
        &self.chat
    }

    pub fn active_agent(&self) -> Option<AgentKind> {
        self.runs.snapshot().agent
    }

    /// Changes the active agent. Any change resets both the run session and
    /// the chat session, discarding work still in flight.
    pub fn select_agent(&self, agent: Option<AgentKind>) -> bool {
        let changed = self.runs.select_agent(agent);
        if changed {
            self.chat.reset();
        }
        changed
    }

    /// Validates the form and starts a streamed run.
    ///
    /// A builder without an agent runs against the active selection. Rejections
    /// are also sent to the notifier.
    pub fn run(&self, request: RunRequestBuilder) -> Result<RunTicket, PreconditionError> {
        let request = if request.has_agent() {
            request
        } else {
            request.selected_agent(self.active_agent())
        };
        self.runs.submit(request)
    }
}

/// Builder for [`AgentHub`]; unset collaborators default to the HTTP
/// implementations configured from [`HubConfig`].
#[derive(Default)]
pub struct AgentHubBuilder {
    config: Option<HubConfig>,
    transport: Option<Arc<dyn RunTransport>>,
    backend: Option<Arc<dyn DocumentBackend>>,
    inferencer: Option<Arc<dyn ToolActivityInferencer>>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl AgentHubBuilder {
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn RunTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn document_backend(mut self, backend: Arc<dyn DocumentBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replaces the log-substring tool heuristic.
    pub fn inferencer(mut self, inferencer: Arc<dyn ToolActivityInferencer>) -> Self {
        self.inferencer = Some(inferencer);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<AgentHub, HubError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpRunTransport::new(&config)?),
        };
        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpDocumentBackend::new(config.clone())?),
        };
        let inferencer = self.inferencer.unwrap_or_else(|| {
            Arc::new(LogSubstringInferencer::new(config.terminal_tool_policy))
        });
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        let runs =
            RunSessionController::new(config.clone(), transport, inferencer, notifier.clone());
        let chat = ChatSessionManager::new(backend, notifier);
        Ok(AgentHub { config, runs, chat })
    }
}
