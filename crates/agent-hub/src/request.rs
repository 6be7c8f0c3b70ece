use bytes::Bytes;

use crate::agent::{AgentKind, AgentMode};
use crate::errors::PreconditionError;

/// One submitted run. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    agent: AgentKind,
    prompt: String,
    image: Option<Bytes>,
}

impl RunRequest {
    pub fn builder() -> RunRequestBuilder {
        RunRequestBuilder::default()
    }

    pub fn agent(&self) -> AgentKind {
        self.agent
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Decoded image bytes, if any.
    pub fn image(&self) -> Option<&Bytes> {
        self.image.as_ref()
    }
}

/// Collects request fields and checks caller-side preconditions.
#[derive(Clone, Debug, Default)]
pub struct RunRequestBuilder {
    agent: Option<AgentKind>,
    prompt: String,
    image: Option<Bytes>,
}

impl RunRequestBuilder {
    pub fn agent(mut self, agent: AgentKind) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Sets the agent from an optional selection, as a selector widget holds it.
    pub fn selected_agent(mut self, agent: Option<AgentKind>) -> Self {
        self.agent = agent;
        self
    }

    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Attaches already-decoded image bytes. An empty payload counts as no image.
    pub fn image(mut self, image: impl Into<Bytes>) -> Self {
        let image = image.into();
        self.image = (!image.is_empty()).then_some(image);
        self
    }

    /// Validates the fields in the order a form reports them: agent, image,
    /// then prompt.
    pub fn build(self) -> Result<RunRequest, PreconditionError> {
        let agent = self.agent.ok_or(PreconditionError::MissingAgent)?;
        if agent.mode() != AgentMode::Streaming {
            return Err(PreconditionError::NotStreamable(agent));
        }
        if agent.requires_image() && self.image.is_none() {
            return Err(PreconditionError::MissingImage(agent));
        }
        if self.prompt.trim().is_empty() {
            return Err(PreconditionError::EmptyPrompt);
        }
        Ok(RunRequest {
            agent,
            prompt: self.prompt,
            image: self.image,
        })
    }
}
