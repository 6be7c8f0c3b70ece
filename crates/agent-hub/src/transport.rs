use std::pin::Pin;

use base64::Engine as _;
use futures::StreamExt as _;
use tracing::debug;

use crate::config::HubConfig;
use crate::errors::{HubError, TransportError};
use crate::request::RunRequest;

/// Raw chunks of an open event-stream response.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Opens the event stream for a run.
///
/// Implementations only move bytes; decoding and classification happen in the
/// controller.
#[async_trait::async_trait]
pub trait RunTransport: Send + Sync {
    async fn open(&self, request: &RunRequest) -> Result<ByteStream, TransportError>;
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct RunAgentBody<'a> {
    agent_name: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_base64: Option<String>,
}

pub(crate) fn build_request_body(request: &RunRequest) -> RunAgentBody<'_> {
    RunAgentBody {
        agent_name: request.agent().backend_name(),
        prompt: request.prompt(),
        image_base64: request
            .image()
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
    }
}

/// `RunTransport` that POSTs to `{base_url}/run_agent` and streams the
/// response body.
pub struct HttpRunTransport {
    client: reqwest::Client,
    run_url: String,
}

impl HttpRunTransport {
    pub fn new(config: &HubConfig) -> Result<Self, HubError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| HubError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            run_url: config.resolve("run_agent"),
        })
    }

    pub fn run_url(&self) -> &str {
        &self.run_url
    }
}

#[async_trait::async_trait]
impl RunTransport for HttpRunTransport {
    async fn open(&self, request: &RunRequest) -> Result<ByteStream, TransportError> {
        let body = build_request_body(request);
        debug!(agent = %request.agent(), url = %self.run_url, "opening run stream");

        let response = self
            .client
            .post(&self.run_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())));
        Ok(Box::pin(stream))
    }
}
