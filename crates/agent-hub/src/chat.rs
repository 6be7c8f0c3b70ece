use std::sync::Arc;

use base64::Engine as _;
use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::errors::{ChatError, HubError};
use crate::notify::{Notice, NotificationSink};

/// Author of a chat message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatSender {
    User,
    Agent,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub sender: ChatSender,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: ChatSender::User,
            content: content.into(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            sender: ChatSender::Agent,
            content: content.into(),
        }
    }
}

/// A document handed over by an upload widget, already decoded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Document {
    pub name: String,
    pub bytes: Bytes,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Reply to a question, with the backend's execution log.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AgentReply {
    pub content: String,
    pub log: Vec<String>,
}

/// Read-only view of a chat session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChatSnapshot {
    /// Incremented on every reset.
    pub generation: u64,
    pub session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// A call is outstanding.
    pub running: bool,
    /// Execution log of the latest call.
    pub log: Vec<String>,
}

/// Request/response backend of the document QA agent.
#[async_trait::async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Creates a new session and returns its identifier.
    async fn create_session(&self) -> Result<String, ChatError>;

    /// Adds a document to the session's knowledge base; returns log lines.
    async fn ingest(&self, session_id: &str, document: &Document) -> Result<Vec<String>, ChatError>;

    async fn ask(&self, session_id: &str, question: &str) -> Result<AgentReply, ChatError>;
}

/// Non-streaming sibling of the run controller for the document QA agent.
///
/// One call may be outstanding at a time; others fail with
/// [`ChatError::InProgress`].
#[derive(Clone)]
pub struct ChatSessionManager {
    inner: Arc<ChatInner>,
}

struct ChatInner {
    state: watch::Sender<ChatSnapshot>,
    backend: Arc<dyn DocumentBackend>,
    notifier: Arc<dyn NotificationSink>,
}

impl ChatSessionManager {
    pub fn new(backend: Arc<dyn DocumentBackend>, notifier: Arc<dyn NotificationSink>) -> Self {
        let (state, _) = watch::channel(ChatSnapshot::default());
        Self {
            inner: Arc::new(ChatInner {
                state,
                backend,
                notifier,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.state.borrow().session_id.clone()
    }

    /// Drops the session and its messages; replies still in flight are
    /// discarded when they arrive.
    pub fn reset(&self) {
        self.inner.state.send_modify(|state| {
            state.generation += 1;
            state.session_id = None;
            state.messages.clear();
            state.running = false;
            state.log.clear();
        });
        debug!("chat session reset");
    }

    /// Returns the session identifier, creating the session if there is none.
    pub async fn start_session(&self) -> Result<String, ChatError> {
        if let Some(session_id) = self.session_id() {
            return Ok(session_id);
        }
        let generation = self.begin()?;
        let result = self.ensure_session(generation).await;
        self.end(generation, |_| {});
        result
    }

    /// Ingests `document`, creating the session first if needed, and appends
    /// a confirmation message.
    pub async fn upload_document(&self, document: Document) -> Result<(), ChatError> {
        let generation = self.begin()?;
        let outcome = async {
            let session_id = self.ensure_session(generation).await?;
            self.inner.backend.ingest(&session_id, &document).await
        }
        .await;

        match outcome {
            Ok(log) => {
                let applied = self.end(generation, |state| {
                    state.log = log;
                    state.messages.push(ChatMessage::agent(format!(
                        "✅ Successfully added '{}' to the knowledge base. You can now ask questions about this document.",
                        document.name
                    )));
                });
                if !applied {
                    return Err(ChatError::Reset);
                }
                info!(document = %document.name, "document ingested");
                self.inner.notifier.notify(Notice::success(
                    "Document uploaded",
                    format!("{} has been added to the knowledge base", document.name),
                ));
                Ok(())
            }
            Err(err) => {
                if !self.end(generation, |_| {}) {
                    return Err(ChatError::Reset);
                }
                self.report_failure("Upload failed", &err);
                Err(err)
            }
        }
    }

    /// Appends the user's message, asks the backend and appends its reply.
    ///
    /// Returns the reply text.
    pub async fn send_message(&self, text: &str) -> Result<String, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut outcome = Err(ChatError::InProgress);
        self.inner.state.send_if_modified(|state| {
            if state.running {
                return false;
            }
            let Some(session_id) = state.session_id.clone() else {
                outcome = Err(ChatError::NoSession);
                return false;
            };
            state.running = true;
            state.log.clear();
            state.messages.push(ChatMessage::user(text));
            outcome = Ok((state.generation, session_id));
            true
        });
        let (generation, session_id) = match outcome {
            Ok(started) => started,
            Err(err) => {
                if err == ChatError::NoSession {
                    self.inner
                        .notifier
                        .notify(Notice::error("No session", "Please upload a document first"));
                }
                return Err(err);
            }
        };

        match self.inner.backend.ask(&session_id, text).await {
            Ok(reply) => {
                let content = reply.content.clone();
                let applied = self.end(generation, |state| {
                    state.log = reply.log;
                    state.messages.push(ChatMessage::agent(reply.content));
                });
                if applied {
                    Ok(content)
                } else {
                    Err(ChatError::Reset)
                }
            }
            Err(err) => {
                if !self.end(generation, |_| {}) {
                    return Err(ChatError::Reset);
                }
                self.report_failure("Error", &err);
                Err(err)
            }
        }
    }

    fn begin(&self) -> Result<u64, ChatError> {
        let mut outcome = Err(ChatError::InProgress);
        self.inner.state.send_if_modified(|state| {
            if state.running {
                return false;
            }
            state.running = true;
            state.log.clear();
            outcome = Ok(state.generation);
            true
        });
        outcome
    }

    /// Clears the running flag and applies `change`, unless a reset happened
    /// since `generation` began.
    fn end(&self, generation: u64, change: impl FnOnce(&mut ChatSnapshot)) -> bool {
        self.inner.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            state.running = false;
            change(state);
            true
        })
    }

    async fn ensure_session(&self, generation: u64) -> Result<String, ChatError> {
        if let Some(session_id) = self.session_id() {
            return Ok(session_id);
        }
        self.inner
            .notifier
            .notify(Notice::info("Starting session", "Initializing chat session..."));
        let created = self.inner.backend.create_session().await?;

        let mut stored = None;
        self.inner.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            let session_id = state.session_id.get_or_insert(created);
            stored = Some(session_id.clone());
            true
        });
        let session_id = stored.ok_or(ChatError::Reset)?;
        info!(session_id = %session_id, "chat session started");
        Ok(session_id)
    }

    fn report_failure(&self, title: &str, err: &ChatError) {
        if *err == ChatError::Reset {
            return;
        }
        warn!(error = %err, "chat call failed");
        self.inner
            .notifier
            .notify(Notice::error(title, err.to_string()));
    }
}

#[derive(serde::Deserialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(serde::Deserialize)]
struct IngestResponse {
    #[serde(default)]
    log: Vec<String>,
}

#[derive(serde::Deserialize)]
struct AskResponse {
    reply: String,
    #[serde(default)]
    log: Vec<String>,
}

/// `DocumentBackend` speaking JSON over HTTP.
pub struct HttpDocumentBackend {
    client: reqwest::Client,
    config: HubConfig,
}

impl HttpDocumentBackend {
    pub fn new(config: HubConfig) -> Result<Self, HubError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| HubError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn sessions_url(&self) -> String {
        self.config.resolve("sessions")
    }

    fn session_url(&self, session_id: &str, leaf: &str) -> String {
        self.config.resolve(&format!("sessions/{session_id}/{leaf}"))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> Result<T, ChatError> {
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Backend(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ChatError::Backend(format!("status {status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ChatError::Backend(format!("invalid response from {url}: {e}")))
    }
}

#[async_trait::async_trait]
impl DocumentBackend for HttpDocumentBackend {
    async fn create_session(&self) -> Result<String, ChatError> {
        let response: CreateSessionResponse = self
            .post_json(self.sessions_url(), serde_json::json!({}))
            .await?;
        Ok(response.session_id)
    }

    async fn ingest(&self, session_id: &str, document: &Document) -> Result<Vec<String>, ChatError> {
        let body = serde_json::json!({
            "file_name": document.name,
            "content_base64": base64::engine::general_purpose::STANDARD.encode(&document.bytes),
        });
        let response: IngestResponse = self
            .post_json(self.session_url(session_id, "documents"), body)
            .await?;
        Ok(response.log)
    }

    async fn ask(&self, session_id: &str, question: &str) -> Result<AgentReply, ChatError> {
        let body = serde_json::json!({ "message": question });
        let response: AskResponse = self
            .post_json(self.session_url(session_id, "messages"), body)
            .await?;
        Ok(AgentReply {
            content: response.reply,
            log: response.log,
        })
    }
}
