use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument as _, debug, info, warn};

use crate::agent::{AgentKind, OutputKind};
use crate::classifier::{RunEvent, classify_line};
use crate::config::HubConfig;
use crate::decoder::EventLineDecoder;
use crate::errors::{PreconditionError, RunFailure};
use crate::notify::{Notice, NotificationSink};
use crate::request::{RunRequest, RunRequestBuilder};
use crate::state::{RunSessionState, RunStatus};
use crate::tools::{ToolActivityInferencer, idle_roster};
use crate::transport::RunTransport;

struct ControllerInner {
    state: watch::Sender<RunSessionState>,
    transport: Arc<dyn RunTransport>,
    inferencer: Arc<dyn ToolActivityInferencer>,
    notifier: Arc<dyn NotificationSink>,
    config: HubConfig,
}

/// Owns the state of one streamed run at a time.
///
/// Cloning yields another handle to the same controller. Every state change
/// goes through the controller's operations and is published as a
/// [`RunSessionState`] snapshot.
///
/// Each `start` and `reset` bumps a generation counter. The task driving a
/// run applies a change only while its generation is still current, so events
/// from an abandoned run never reach the new state.
#[derive(Clone)]
pub struct RunSessionController {
    inner: Arc<ControllerInner>,
}

impl RunSessionController {
    pub fn new(
        config: HubConfig,
        transport: Arc<dyn RunTransport>,
        inferencer: Arc<dyn ToolActivityInferencer>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (state, _) = watch::channel(RunSessionState::default());
        Self {
            inner: Arc::new(ControllerInner {
                state,
                transport,
                inferencer,
                notifier,
                config,
            }),
        }
    }

    /// Returns a receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<RunSessionState> {
        self.inner.state.subscribe()
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> RunSessionState {
        self.inner.state.borrow().clone()
    }

    /// Sets the active agent. A different agent resets the session, even
    /// mid-run; selecting the active agent again changes nothing.
    ///
    /// Returns whether the selection changed.
    pub fn select_agent(&self, agent: Option<AgentKind>) -> bool {
        let changed = self.inner.state.send_if_modified(|state| {
            if state.agent == agent {
                return false;
            }
            state.agent = agent;
            clear_run(state);
            true
        });
        if changed {
            let generation = self.inner.state.borrow().generation;
            debug!(agent = ?agent, generation, "agent selection changed");
        }
        changed
    }

    /// Forces the session back to Idle and discards any in-flight run.
    ///
    /// The task driving an in-flight run stops as soon as it observes the new
    /// generation and drops its stream, even if the backend has gone silent.
    pub fn reset(&self) {
        self.inner.state.send_modify(clear_run);
        debug!(generation = self.inner.state.borrow().generation, "run session reset");
    }

    /// Validates the form fields in `builder` and starts the run.
    ///
    /// Every precondition failure, including missing form fields, is also
    /// reported to the notification sink.
    pub fn submit(&self, builder: RunRequestBuilder) -> Result<RunTicket, PreconditionError> {
        match builder.build() {
            Ok(request) => self.start(request),
            Err(err) => Err(self.reject(err)),
        }
    }

    fn reject(&self, err: PreconditionError) -> PreconditionError {
        warn!(error = %err, "run rejected");
        let (title, description) = err.notice_text();
        self.inner.notifier.notify(Notice::error(title, description));
        err
    }

    /// Starts a run and spawns the task that drives it.
    ///
    /// Must be called within a tokio runtime. Fails without any network call
    /// while another run is in progress or when the request targets an agent
    /// other than the selected one.
    pub fn start(&self, request: RunRequest) -> Result<RunTicket, PreconditionError> {
        let agent = request.agent();
        let mut outcome = Err(PreconditionError::RunInProgress);
        self.inner.state.send_if_modified(|state| {
            if state.is_running() {
                return false;
            }
            if let Some(active) = state.agent
                && active != agent
            {
                outcome = Err(PreconditionError::AgentMismatch {
                    requested: agent,
                    active,
                });
                return false;
            }
            state.agent = Some(agent);
            state.generation += 1;
            state.status = RunStatus::Running;
            state.log.clear();
            state.result = None;
            state.is_error = false;
            state.tools = self.inner.inferencer.infer(agent, &[], RunStatus::Running);
            outcome = Ok(state.generation);
            true
        });

        let generation = match outcome {
            Ok(generation) => generation,
            Err(err) => return Err(self.reject(err)),
        };

        let run_id = uuid::Uuid::new_v4();
        info!(%run_id, generation, agent = %agent, "run started");
        self.inner.notifier.notify(Notice::info(
            "Running agent",
            format!("{} started", agent.display_name()),
        ));

        let span = tracing::info_span!("run", %run_id, generation, agent = %agent);
        let handle =
            tokio::spawn(drive_run(self.inner.clone(), generation, request).instrument(span));
        Ok(RunTicket {
            generation,
            run_id,
            handle,
            state: self.subscribe(),
        })
    }
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunTicket {
    generation: u64,
    run_id: uuid::Uuid,
    handle: JoinHandle<RunSessionState>,
    state: watch::Receiver<RunSessionState>,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Waits for the driving task to stop and returns the state it left.
    ///
    /// For a run that was reset this is the state after the reset, not a
    /// terminal state of the abandoned run.
    pub async fn wait(self) -> RunSessionState {
        match self.handle.await {
            Ok(state) => state,
            Err(err) => {
                warn!(run_id = %self.run_id, error = %err, "run task ended abnormally");
                self.state.borrow().clone()
            }
        }
    }
}

fn clear_run(state: &mut RunSessionState) {
    state.generation += 1;
    state.status = RunStatus::Idle;
    state.log.clear();
    state.result = None;
    state.is_error = false;
    state.tools = state.agent.map(|a| idle_roster(a.tools())).unwrap_or_default();
}

impl ControllerInner {
    fn snapshot(&self) -> RunSessionState {
        self.state.borrow().clone()
    }

    /// Applies `change` only while `generation` is the running generation.
    fn apply(&self, generation: u64, change: impl FnOnce(&mut RunSessionState)) -> bool {
        self.state.send_if_modified(|state| {
            if state.generation != generation || !state.is_running() {
                return false;
            }
            change(state);
            true
        })
    }

    fn append_progress(&self, generation: u64, agent: AgentKind, text: String) -> bool {
        self.apply(generation, |state| {
            state.log.push(text);
            state.tools = self.inferencer.infer(agent, &state.log, RunStatus::Running);
        })
    }

    fn complete(&self, generation: u64, agent: AgentKind, result: String) {
        let applied = self.apply(generation, |state| {
            state.status = RunStatus::Completed;
            state.result = Some(result);
            state.is_error = false;
            state.tools = self.inferencer.infer(agent, &state.log, RunStatus::Completed);
        });
        if applied {
            info!("run completed");
            self.notifier
                .notify(Notice::success("Success!", "Agent completed successfully"));
        }
    }

    fn fail(&self, generation: u64, agent: AgentKind, failure: RunFailure) {
        let message = failure.to_string();
        let applied = self.apply(generation, |state| {
            state.status = RunStatus::Failed;
            state.result = Some(message.clone());
            state.is_error = true;
            state.tools = self.inferencer.infer(agent, &state.log, RunStatus::Failed);
        });
        if applied {
            warn!(error = %message, "run failed");
            self.notifier
                .notify(Notice::error("Error", format!("Failed to run agent: {message}")));
        }
    }

    fn resolve_output(&self, agent: AgentKind, payload: String) -> String {
        match agent.output_kind() {
            OutputKind::ImageUrl => {
                let trimmed = payload.trim();
                if ["http://", "https://", "data:"]
                    .iter()
                    .any(|scheme| trimmed.starts_with(scheme))
                {
                    trimmed.to_string()
                } else {
                    self.config.resolve(trimmed)
                }
            }
            OutputKind::Markdown | OutputKind::ChatReply => payload,
        }
    }
}

/// Resolves once `generation` is no longer the running generation.
async fn superseded(mut state: watch::Receiver<RunSessionState>, generation: u64) {
    loop {
        {
            let current = state.borrow_and_update();
            if current.generation != generation || !current.is_running() {
                return;
            }
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

async fn drive_run(
    inner: Arc<ControllerInner>,
    generation: u64,
    request: RunRequest,
) -> RunSessionState {
    let agent = request.agent();
    let stale = superseded(inner.state.subscribe(), generation);
    tokio::pin!(stale);

    let opened = tokio::select! {
        () = &mut stale => {
            debug!("run superseded before the stream opened");
            return inner.snapshot();
        }
        opened = inner.transport.open(&request) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            inner.fail(generation, agent, err.into());
            return inner.snapshot();
        }
    };

    let mut decoder = EventLineDecoder::new();
    let mut unparseable = 0_usize;
    loop {
        let next = tokio::select! {
            () = &mut stale => {
                debug!("run superseded, dropping stream");
                return inner.snapshot();
            }
            next = stream.next() => next,
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                inner.fail(generation, agent, err.into());
                return inner.snapshot();
            }
            None => {
                decoder.close();
                inner.fail(generation, agent, RunFailure::IncompleteStream);
                return inner.snapshot();
            }
        };

        for line in decoder.push_chunk(&chunk) {
            match classify_line(&line) {
                RunEvent::Progress { text } => {
                    if !inner.append_progress(generation, agent, text) {
                        debug!("dropping progress from superseded run");
                        return inner.snapshot();
                    }
                }
                RunEvent::FinalOutput { payload } => {
                    let result = inner.resolve_output(agent, payload);
                    inner.complete(generation, agent, result);
                    return inner.snapshot();
                }
                RunEvent::Error { message } => {
                    inner.fail(generation, agent, RunFailure::Upstream { message });
                    return inner.snapshot();
                }
                RunEvent::StreamEnd => {
                    inner.fail(generation, agent, RunFailure::IncompleteStream);
                    return inner.snapshot();
                }
                RunEvent::Unparseable { raw_line, reason } => {
                    if raw_line.trim().is_empty() {
                        continue;
                    }
                    unparseable += 1;
                    debug!(line = %raw_line, %reason, "dropping unparseable line");
                    if let Some(max) = inner.config.max_unparseable_lines
                        && unparseable > max
                    {
                        inner.fail(
                            generation,
                            agent,
                            RunFailure::Protocol {
                                message: format!("more than {max} malformed frames"),
                            },
                        );
                        return inner.snapshot();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use crate::notify::NoticeLevel;
    use crate::tools::{LogSubstringInferencer, ToolStatus};
    use crate::transport::ByteStream;
    use bytes::Bytes;
    use futures::channel::mpsc as fmpsc;
    use futures::stream;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    type Chunk = Result<Bytes, TransportError>;

    enum FakeBehavior {
        Chunks(Vec<Chunk>),
        Channel(Mutex<Option<fmpsc::UnboundedReceiver<Chunk>>>),
        OpenError(TransportError),
        OpenNever,
    }

    struct FakeTransport {
        calls: AtomicUsize,
        behavior: FakeBehavior,
    }

    #[async_trait::async_trait]
    impl RunTransport for FakeTransport {
        async fn open(&self, _request: &RunRequest) -> Result<ByteStream, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                FakeBehavior::Chunks(chunks) => Ok(Box::pin(stream::iter(chunks.clone()))),
                FakeBehavior::Channel(rx) => {
                    let rx = rx.lock().expect("lock").take().expect("single open");
                    Ok(Box::pin(rx))
                }
                FakeBehavior::OpenError(err) => Err(err.clone()),
                FakeBehavior::OpenNever => futures::future::pending().await,
            }
        }
    }

    struct Fixture {
        controller: RunSessionController,
        transport: Arc<FakeTransport>,
        notices: mpsc::UnboundedReceiver<Notice>,
    }

    impl Fixture {
        fn drain_notices(&mut self) -> Vec<NoticeLevel> {
            let mut levels = Vec::new();
            while let Ok(notice) = self.notices.try_recv() {
                levels.push(notice.level);
            }
            levels
        }
    }

    fn fixture_with(behavior: FakeBehavior, config: HubConfig) -> Fixture {
        let transport = Arc::new(FakeTransport {
            calls: AtomicUsize::new(0),
            behavior,
        });
        let (tx, notices) = mpsc::unbounded_channel();
        let controller = RunSessionController::new(
            config,
            transport.clone(),
            Arc::new(LogSubstringInferencer::default()),
            Arc::new(tx),
        );
        Fixture {
            controller,
            transport,
            notices,
        }
    }

    fn fixture(behavior: FakeBehavior) -> Fixture {
        fixture_with(behavior, HubConfig::default().base_url("http://backend:8000"))
    }

    fn lines(lines: &[&str]) -> Vec<Chunk> {
        lines
            .iter()
            .map(|line| Ok(Bytes::from(format!("{line}\n"))))
            .collect()
    }

    fn request(agent: AgentKind) -> RunRequest {
        RunRequest::builder()
            .agent(agent)
            .prompt("make it shine")
            .image(vec![0_u8, 1, 2])
            .build()
            .expect("request")
    }

    fn channel_fixture() -> (Fixture, fmpsc::UnboundedSender<Chunk>) {
        let (tx, rx) = fmpsc::unbounded();
        let fixture = fixture(FakeBehavior::Channel(Mutex::new(Some(rx))));
        (fixture, tx)
    }

    fn send_line(tx: &fmpsc::UnboundedSender<Chunk>, line: &str) {
        tx.unbounded_send(Ok(Bytes::from(format!("{line}\n"))))
            .expect("send chunk");
    }

    /// Sends to a run that may already have stopped reading.
    fn send_late_line(tx: &fmpsc::UnboundedSender<Chunk>, line: &str) {
        let _ = tx.unbounded_send(Ok(Bytes::from(format!("{line}\n"))));
    }

    #[tokio::test]
    async fn final_output_completes_run_with_resolved_image_url() {
        let mut fx = fixture(FakeBehavior::Chunks(lines(&[
            r#"data:{"message":"step A"}"#,
            r#"data:{"message":"FINAL_OUTPUT:/img/out.png"}"#,
            r#"data:{"message":"STREAM_END"}"#,
        ])));

        let state = fx
            .controller
            .start(request(AgentKind::ImageEnhancer))
            .expect("start")
            .wait()
            .await;

        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.result.as_deref(), Some("http://backend:8000/img/out.png"));
        assert!(!state.is_error);
        assert_eq!(state.log, vec!["step A"]);
        assert_eq!(fx.controller.snapshot(), state);
        assert_eq!(
            fx.drain_notices(),
            vec![NoticeLevel::Info, NoticeLevel::Success]
        );
    }

    #[tokio::test]
    async fn markdown_output_is_kept_verbatim() {
        let fx = fixture(FakeBehavior::Chunks(lines(&[
            r#"data: {"message":"Calling InitialImageDescriptionTool"}"#,
            r##"data: {"message":"FINAL_OUTPUT:# Title\n\n**bold**"}"##,
        ])));

        let state = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start")
            .wait()
            .await;

        assert_eq!(state.result.as_deref(), Some("# Title\n\n**bold**"));
        assert_eq!(state.tools[0].status, ToolStatus::Completed);
        assert!(state.tools[1..].iter().all(|t| t.status == ToolStatus::Idle));
    }

    #[tokio::test]
    async fn absolute_image_url_is_not_rejoined() {
        let fx = fixture(FakeBehavior::Chunks(lines(&[
            r#"data: {"message":"FINAL_OUTPUT:https://cdn.example.com/a.png"}"#,
        ])));
        let state = fx
            .controller
            .start(request(AgentKind::ImageEnhancer))
            .expect("start")
            .wait()
            .await;
        assert_eq!(state.result.as_deref(), Some("https://cdn.example.com/a.png"));
    }

    #[tokio::test]
    async fn stream_closing_without_terminal_frame_fails() {
        let mut fx = fixture(FakeBehavior::Chunks(lines(&[r#"data:{"message":"step A"}"#])));

        let state = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start")
            .wait()
            .await;

        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.result.as_deref(), Some("stream ended without result"));
        assert!(state.is_error);
        assert_eq!(state.log, vec!["step A"]);
        assert_eq!(fx.drain_notices(), vec![NoticeLevel::Info, NoticeLevel::Error]);
    }

    #[tokio::test]
    async fn stream_end_without_result_fails() {
        let fx = fixture(FakeBehavior::Chunks(lines(&[
            r#"data:{"message":"step A"}"#,
            r#"data:{"message":"STREAM_END"}"#,
            r#"data:{"message":"FINAL_OUTPUT:late"}"#,
        ])));
        let state = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start")
            .wait()
            .await;
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.result.as_deref(), Some("stream ended without result"));
    }

    #[tokio::test]
    async fn malformed_lines_between_progress_are_ignored() {
        let fx = fixture(FakeBehavior::Chunks(lines(&[
            r#"data:{"message":"first"}"#,
            "not-a-data-line",
            "",
            r#"data:{"message":"second"}"#,
            r#"data:{"message":"FINAL_OUTPUT:done"}"#,
        ])));
        let state = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start")
            .wait()
            .await;
        assert_eq!(state.log, vec!["first", "second"]);
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn nothing_after_terminal_frame_is_consumed() {
        let chunk = concat!(
            "data:{\"message\":\"step A\"}\n",
            "data:{\"message\":\"ERROR: upstream exploded\"}\n",
            "data:{\"message\":\"step B\"}\n",
        );
        let fx = fixture(FakeBehavior::Chunks(vec![
            Ok(Bytes::from_static(chunk.as_bytes())),
            Ok(Bytes::from_static(b"data:{\"message\":\"step C\"}\n")),
        ]));
        let state = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start")
            .wait()
            .await;
        assert_eq!(state.log, vec!["step A"]);
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.result.as_deref(), Some("ERROR: upstream exploded"));
        assert!(state.is_error);
    }

    #[tokio::test]
    async fn error_frame_forces_running_tools_completed() {
        let fx = fixture(FakeBehavior::Chunks(lines(&[
            r#"data:{"message":"GenerativeImageTool: rendering"}"#,
            r#"data:{"message":"ERROR: render failed"}"#,
        ])));
        let state = fx
            .controller
            .start(request(AgentKind::ImageEnhancer))
            .expect("start")
            .wait()
            .await;
        assert_eq!(state.tools[0].status, ToolStatus::Completed);
    }

    #[tokio::test]
    async fn open_failure_is_transport_failure() {
        let fx = fixture(FakeBehavior::OpenError(TransportError::Request(
            "connection refused".into(),
        )));
        let state = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start")
            .wait()
            .await;
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(
            state.result.as_deref(),
            Some("transport error: request failed: connection refused")
        );
        assert!(state.log.is_empty());
    }

    #[tokio::test]
    async fn read_failure_mid_stream_keeps_log_and_fails() {
        let mut chunks = lines(&[r#"data:{"message":"step A"}"#]);
        chunks.push(Err(TransportError::Read("connection reset".into())));
        let fx = fixture(FakeBehavior::Chunks(chunks));
        let state = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start")
            .wait()
            .await;
        assert_eq!(state.log, vec!["step A"]);
        assert_eq!(
            state.result.as_deref(),
            Some("transport error: stream read failed: connection reset")
        );
    }

    #[tokio::test]
    async fn concurrent_start_is_rejected_without_opening_a_stream() {
        let (mut fx, tx) = channel_fixture();
        let ticket = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("first start");

        let err = fx
            .controller
            .start(request(AgentKind::Seo))
            .err()
            .expect("second start rejected");
        assert_eq!(err, PreconditionError::RunInProgress);

        send_line(&tx, r#"data:{"message":"FINAL_OUTPUT:ok"}"#);
        let state = ticket.wait().await;
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(fx.transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            fx.drain_notices(),
            vec![NoticeLevel::Info, NoticeLevel::Error, NoticeLevel::Success]
        );
    }

    #[tokio::test]
    async fn request_for_other_agent_is_rejected() {
        let fx = fixture(FakeBehavior::Chunks(Vec::new()));
        fx.controller.select_agent(Some(AgentKind::Seo));
        let err = fx
            .controller
            .start(request(AgentKind::ImageEnhancer))
            .err()
            .expect("mismatch");
        assert!(matches!(err, PreconditionError::AgentMismatch { .. }));
        assert_eq!(fx.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn progress_is_published_before_the_run_ends() {
        let (fx, tx) = channel_fixture();
        let mut rx = fx.controller.subscribe();
        let ticket = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start");

        send_line(&tx, r#"data:{"message":"Running SEOEnhancementTool"}"#);
        let state = rx
            .wait_for(|s| s.log.len() == 1)
            .await
            .expect("progress")
            .clone();
        assert_eq!(state.status, RunStatus::Running);
        assert_eq!(state.tools[1].status, ToolStatus::Running);

        send_line(&tx, r#"data:{"message":"FINAL_OUTPUT:text"}"#);
        let state = ticket.wait().await;
        assert_eq!(state.tools[1].status, ToolStatus::Completed);
    }

    #[tokio::test]
    async fn reset_mid_run_discards_late_events() {
        let (fx, tx) = channel_fixture();
        let mut rx = fx.controller.subscribe();
        let ticket = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start");

        send_line(&tx, r#"data:{"message":"step A"}"#);
        rx.wait_for(|s| s.log.len() == 1).await.expect("step A");

        fx.controller.reset();
        let after_reset = fx.controller.snapshot();
        assert_eq!(after_reset.status, RunStatus::Idle);
        assert!(after_reset.log.is_empty());
        assert!(after_reset.generation > ticket.generation());

        send_late_line(&tx, r#"data:{"message":"step B"}"#);
        send_late_line(&tx, r#"data:{"message":"FINAL_OUTPUT:stale"}"#);
        let state = ticket.wait().await;

        assert_eq!(state, after_reset);
        assert_eq!(fx.controller.snapshot(), after_reset);
    }

    #[tokio::test]
    async fn submit_reports_missing_image_as_notice() {
        let mut fx = fixture(FakeBehavior::Chunks(Vec::new()));
        let err = fx
            .controller
            .submit(RunRequest::builder().agent(AgentKind::Seo).prompt("copy"))
            .expect_err("image required");

        assert_eq!(err, PreconditionError::MissingImage(AgentKind::Seo));
        let notice = fx.notices.try_recv().expect("notice");
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.title, "Upload an image");
        assert_eq!(fx.transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.controller.snapshot().status, RunStatus::Idle);
    }

    #[tokio::test]
    async fn submit_starts_a_valid_request() {
        let fx = fixture(FakeBehavior::Chunks(lines(&[
            r#"data:{"message":"FINAL_OUTPUT:copy"}"#,
        ])));
        let state = fx
            .controller
            .submit(
                RunRequest::builder()
                    .agent(AgentKind::Seo)
                    .prompt("copy")
                    .image(vec![1_u8]),
            )
            .expect("start")
            .wait()
            .await;
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.result.as_deref(), Some("copy"));
    }

    #[tokio::test]
    async fn reset_releases_a_silent_stream() {
        let (fx, tx) = channel_fixture();
        let mut rx = fx.controller.subscribe();
        let ticket = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start");
        send_line(&tx, r#"data:{"message":"step A"}"#);
        rx.wait_for(|s| s.log.len() == 1).await.expect("step A");

        fx.controller.reset();
        let after_reset = fx.controller.snapshot();
        let state = tokio::time::timeout(Duration::from_secs(2), ticket.wait())
            .await
            .expect("drive task stops after reset");

        assert_eq!(state, after_reset);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn agent_switch_while_opening_stops_the_run() {
        let fx = fixture(FakeBehavior::OpenNever);
        fx.controller.select_agent(Some(AgentKind::Seo));
        let ticket = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start");
        tokio::task::yield_now().await;

        assert!(fx.controller.select_agent(Some(AgentKind::ImageEnhancer)));
        let state = tokio::time::timeout(Duration::from_secs(2), ticket.wait())
            .await
            .expect("drive task stops after switch");
        assert_eq!(state.status, RunStatus::Idle);
        assert_eq!(state.agent, Some(AgentKind::ImageEnhancer));
    }

    #[tokio::test]
    async fn agent_switch_mid_run_leaves_new_idle_state_untouched() {
        let (mut fx, tx) = channel_fixture();
        fx.controller.select_agent(Some(AgentKind::Seo));
        let ticket = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start");

        assert!(fx.controller.select_agent(Some(AgentKind::ImageEnhancer)));
        let switched = fx.controller.snapshot();
        assert_eq!(switched.agent, Some(AgentKind::ImageEnhancer));
        assert_eq!(switched.status, RunStatus::Idle);
        assert_eq!(switched.tools.len(), 1);

        send_late_line(&tx, r#"data:{"message":"late progress"}"#);
        drop(tx);
        let _ = ticket.wait().await;

        assert_eq!(fx.controller.snapshot(), switched);
        assert_eq!(fx.drain_notices(), vec![NoticeLevel::Info]);
    }

    #[tokio::test]
    async fn selecting_same_agent_keeps_state() {
        let fx = fixture(FakeBehavior::Chunks(lines(&[
            r#"data:{"message":"FINAL_OUTPUT:done"}"#,
        ])));
        assert!(fx.controller.select_agent(Some(AgentKind::Seo)));
        let finished = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start")
            .wait()
            .await;
        assert!(!fx.controller.select_agent(Some(AgentKind::Seo)));
        assert_eq!(fx.controller.snapshot(), finished);
    }

    #[tokio::test]
    async fn new_run_after_failure_starts_clean() {
        let fx = fixture(FakeBehavior::Chunks(lines(&[r#"data:{"message":"only"}"#])));
        let first = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("first")
            .wait()
            .await;
        assert_eq!(first.status, RunStatus::Failed);

        let ticket = fx.controller.start(request(AgentKind::Seo)).expect("second");
        assert!(ticket.generation() > first.generation);
        let second = ticket.wait().await;
        assert_eq!(second.log, vec!["only"]);
        assert_eq!(second.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn poison_line_threshold_fails_the_run() {
        let fx = fixture_with(
            FakeBehavior::Chunks(lines(&[
                "garbage one",
                r#"data:{"message":"fine"}"#,
                "garbage two",
                r#"data:{"message":"FINAL_OUTPUT:never"}"#,
            ])),
            HubConfig::default().max_unparseable_lines(1),
        );
        let state = fx
            .controller
            .start(request(AgentKind::Seo))
            .expect("start")
            .wait()
            .await;
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(
            state.result.as_deref(),
            Some("protocol error: more than 1 malformed frames")
        );
        assert_eq!(state.log, vec!["fine"]);
    }
}
