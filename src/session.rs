//! Protocol session — owns the engine process and its message channel.
//!
//! Exactly one child process and one duplex channel per session. The state
//! machine is driven by `start()`/`stop()` and by channel-close events from
//! the reader task; `Failed` is terminal for a session instance.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{RpcReader, RpcWriter};
use crate::error::LaunchError;
use crate::filter::SessionFilter;
use crate::launcher::LaunchSpec;
use crate::protocol::{self, Inbound, Notification, PublishDiagnosticsParams, Request};
use crate::types::{Document, SessionEvent, SessionState, StopReason};

/// How long the initialize handshake may take.
const INIT_TIMEOUT_SECS: u64 = 30;

/// Bounded wait during teardown: first for the shutdown response, then for
/// the process to exit before it is killed. Keeps editor shutdown from
/// hanging on a wedged engine.
const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

const WRITER_CHANNEL_CAPACITY: usize = 64;

enum WriterCommand {
    Frame(serde_json::Value),
    /// Stop the writer even while other senders are still alive, closing
    /// the engine's stdin.
    Close,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

fn lock_state(state: &StdMutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ProtocolSession {
    launch: LaunchSpec,
    filter: SessionFilter,
    trace_io: bool,
    state: Arc<StdMutex<SessionState>>,
    child: Option<Child>,
    writer_tx: Option<mpsc::Sender<WriterCommand>>,
    event_tx: mpsc::Sender<SessionEvent>,
    next_id: u64,
    pending: PendingMap,
    /// Per-document version counters; presence means didOpen was sent.
    doc_versions: HashMap<String, i32>,
    reader_handle: Option<tokio::task::JoinHandle<()>>,
    writer_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ProtocolSession {
    #[must_use]
    pub fn new(
        launch: LaunchSpec,
        filter: SessionFilter,
        trace_io: bool,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            launch,
            filter,
            trace_io,
            state: Arc::new(StdMutex::new(SessionState::Idle)),
            child: None,
            writer_tx: None,
            event_tx,
            next_id: 1,
            pending: Arc::new(Mutex::new(HashMap::new())),
            doc_versions: HashMap::new(),
            reader_handle: None,
            writer_handle: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *lock_state(&self.state)
    }

    /// OS pid of the engine process while the session holds one.
    #[must_use]
    pub fn engine_pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    fn set_state(&self, next: SessionState) {
        *lock_state(&self.state) = next;
    }

    /// Spawn the engine and complete the handshake.
    ///
    /// Suspends until the initialize exchange finishes. Called in any state
    /// other than Idle this is a no-op — the existing process is kept and
    /// no second one is spawned. If the returned future is dropped mid
    /// handshake the child handle stays on the session, so a later `stop()`
    /// (or dropping the session, via `kill_on_drop`) terminates it.
    pub async fn start(&mut self) -> Result<(), LaunchError> {
        if self.state() != SessionState::Idle {
            tracing::debug!(state = ?self.state(), "start() ignored: session already started");
            return Ok(());
        }
        self.set_state(SessionState::Starting);
        tracing::info!(command = %self.launch.command.display(), "launching validation engine");

        let mut cmd = Command::new(&self.launch.command);
        cmd.args(&self.launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.launch.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| {
            self.set_state(SessionState::Failed);
            LaunchError::Spawn {
                command: self.launch.command.display().to_string(),
                source,
            }
        })?;

        let Some(stdout) = child.stdout.take() else {
            self.set_state(SessionState::Failed);
            return Err(LaunchError::HandshakeFailed(
                "engine stdout was not captured".to_string(),
            ));
        };
        let Some(stdin) = child.stdin.take() else {
            self.set_state(SessionState::Failed);
            return Err(LaunchError::HandshakeFailed(
                "engine stdin was not captured".to_string(),
            ));
        };
        self.child = Some(child);

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let trace_io = self.trace_io;
        self.writer_handle = Some(tokio::spawn(async move {
            let mut writer = RpcWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Frame(frame) => {
                        if trace_io {
                            tracing::debug!(%frame, "-> engine");
                        }
                        if let Err(e) = writer.send_frame(&frame).await {
                            tracing::warn!("engine write failed: {e:#}");
                            break;
                        }
                    }
                    WriterCommand::Close => break,
                }
            }
        }));

        let pending = self.pending.clone();
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let reader_writer_tx = writer_tx.clone();
        self.reader_handle = Some(tokio::spawn(async move {
            let mut reader = RpcReader::new(stdout);
            loop {
                match reader.next_frame().await {
                    Ok(Some(frame)) => {
                        if trace_io {
                            tracing::debug!(%frame, "<- engine");
                        }
                        Self::dispatch(&frame, &pending, &event_tx, &reader_writer_tx).await;
                    }
                    Ok(None) => {
                        Self::channel_closed(&state, &pending, &event_tx, "engine closed the channel")
                            .await;
                        break;
                    }
                    Err(e) => {
                        Self::channel_closed(
                            &state,
                            &pending,
                            &event_tx,
                            &format!("channel read failed: {e:#}"),
                        )
                        .await;
                        break;
                    }
                }
            }
        }));
        self.writer_tx = Some(writer_tx);

        self.handshake().await.map_err(|e| {
            self.set_state(SessionState::Failed);
            e
        })?;
        // The reader may have seen the channel drop while the handshake was
        // settling; don't resurrect a Failed session.
        {
            let mut st = lock_state(&self.state);
            if *st != SessionState::Starting {
                return Err(LaunchError::HandshakeFailed(
                    "engine exited during handshake".to_string(),
                ));
            }
            *st = SessionState::Running;
        }
        tracing::info!("validation engine session running");
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), LaunchError> {
        let root = self
            .launch
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));
        let root_uri = protocol::path_to_file_uri(&root)
            .map_err(|e| LaunchError::HandshakeFailed(e.to_string()))?;

        let response = self
            .request(
                "initialize",
                Some(protocol::initialize_params(root_uri.as_str())),
                Duration::from_secs(INIT_TIMEOUT_SECS),
            )
            .await
            .map_err(|e| LaunchError::HandshakeFailed(format!("{e:#}")))?;

        if let Some(error) = response.get("error") {
            return Err(LaunchError::InitializeRejected(
                error["message"].as_str().unwrap_or("unknown error").to_string(),
            ));
        }

        self.send_notification("initialized", Some(serde_json::json!({})))
            .await
            .map_err(|e| LaunchError::HandshakeFailed(format!("{e:#}")))?;
        Ok(())
    }

    /// Forward a document-open event, if the document is in scope.
    pub async fn notify_opened(&mut self, doc: &Document, text: &str) -> Result<()> {
        if !self.in_scope(doc) {
            return Ok(());
        }
        let version = 1;
        self.doc_versions.insert(doc.uri.clone(), version);
        self.send_notification(
            "textDocument/didOpen",
            Some(protocol::did_open_params(
                &doc.uri,
                &doc.language_id,
                version,
                text,
            )),
        )
        .await
    }

    /// Forward a document-change event. A change for a document the engine
    /// has not seen yet is promoted to an open.
    pub async fn notify_changed(&mut self, doc: &Document, text: &str) -> Result<()> {
        if !self.in_scope(doc) {
            return Ok(());
        }
        if let Some(version) = self.doc_versions.get_mut(&doc.uri) {
            *version += 1;
            let params = protocol::did_change_params(&doc.uri, *version, text);
            self.send_notification("textDocument/didChange", Some(params))
                .await
        } else {
            self.notify_opened(doc, text).await
        }
    }

    /// Forward a document-close event for a document the engine saw opened.
    pub async fn notify_closed(&mut self, doc: &Document) -> Result<()> {
        if !self.in_scope(doc) || self.doc_versions.remove(&doc.uri).is_none() {
            return Ok(());
        }
        self.send_notification(
            "textDocument/didClose",
            Some(protocol::did_close_params(&doc.uri)),
        )
        .await
    }

    fn in_scope(&self, doc: &Document) -> bool {
        if !self.filter.matches_document(doc) {
            tracing::trace!(uri = %doc.uri, "document out of scope");
            return false;
        }
        if self.state() != SessionState::Running {
            tracing::trace!(uri = %doc.uri, state = ?self.state(), "dropping document event");
            return false;
        }
        true
    }

    /// Shut the session down and reap the engine process.
    ///
    /// Completes only once the process has exited and the channel is
    /// released, so repeated start/stop cycles cannot leak children. No-op
    /// when Idle or already Stopped. From Starting the graceful exchange is
    /// skipped and the just-spawned process is terminated directly.
    pub async fn stop(&mut self) {
        let state = self.state();
        match state {
            SessionState::Idle | SessionState::Stopped | SessionState::Stopping => {
                tracing::debug!(?state, "stop() ignored");
                return;
            }
            SessionState::Failed => {
                // Terminal state stays; just make sure nothing is leaked.
                self.teardown(false).await;
                return;
            }
            SessionState::Starting | SessionState::Running => {}
        }

        let graceful = state == SessionState::Running;
        self.set_state(SessionState::Stopping);

        if graceful {
            let wait = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
            match self.request("shutdown", None, wait).await {
                Ok(response) if response.get("error").is_none() => {
                    let _ = self.send_notification("exit", None).await;
                }
                Ok(_) | Err(_) => {
                    tracing::debug!("engine did not acknowledge shutdown");
                }
            }
        }

        self.teardown(graceful).await;
        self.set_state(SessionState::Stopped);
        tracing::info!("validation engine session stopped");
    }

    /// Release the channel and reap the child. With `wait_for_exit` the
    /// child gets a bounded window to leave on its own; otherwise (or after
    /// the window elapses) it is killed outright.
    async fn teardown(&mut self, wait_for_exit: bool) {
        // Stop the writer explicitly — the reader still holds a sender
        // clone, so dropping ours would not close the engine's stdin.
        if let Some(writer_tx) = self.writer_tx.take() {
            let _ = writer_tx.send(WriterCommand::Close).await;
        }
        if let Some(mut child) = self.child.take() {
            let exited = wait_for_exit
                && tokio::time::timeout(
                    Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
                    child.wait(),
                )
                .await
                .is_ok();
            if !exited {
                tracing::debug!("engine still alive after bounded wait, killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
        // With the child gone the reader sees EOF and winds down; join both
        // tasks so the channel is fully released before stop() completes.
        // Bounded in case a task is parked on a full event queue.
        let grace = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
        if let Some(handle) = self.reader_handle.take() {
            let _ = tokio::time::timeout(grace, handle).await;
        }
        if let Some(handle) = self.writer_handle.take() {
            let _ = tokio::time::timeout(grace, handle).await;
        }
        self.pending.lock().await.clear();
    }

    async fn request(
        &mut self,
        method: &'static str,
        params: Option<serde_json::Value>,
        wait: Duration,
    ) -> Result<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = serde_json::to_value(Request::new(id, method, params))
            .context("serializing request")?;
        let enqueued = match &self.writer_tx {
            Some(writer_tx) => writer_tx.send(WriterCommand::Frame(frame)).await.is_ok(),
            None => false,
        };
        if !enqueued {
            self.pending.lock().await.remove(&id);
            bail!("channel is closed");
        }
        // The reader may have observed the channel closing before this
        // request was registered; its pending-map sweep would then miss us.
        // It flips the state to Failed first, so check after registering.
        if self.state() == SessionState::Failed {
            self.pending.lock().await.remove(&id);
            bail!("engine closed the channel before responding to `{method}`");
        }

        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                bail!("engine closed the channel before responding to `{method}`")
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                bail!("`{method}` timed out after {}s", wait.as_secs())
            }
        }
    }

    async fn send_notification(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        let frame = serde_json::to_value(Notification::new(method, params))
            .context("serializing notification")?;
        let writer_tx = self.writer_tx.as_ref().context("channel is closed")?;
        writer_tx
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| anyhow!("channel is closed"))
    }

    /// Route one inbound frame: responses complete their pending request,
    /// engine-initiated requests get a method-not-found reply (a silent
    /// client here can deadlock the engine), diagnostics become events.
    async fn dispatch(
        frame: &serde_json::Value,
        pending: &Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
        event_tx: &mpsc::Sender<SessionEvent>,
        writer_tx: &mpsc::Sender<WriterCommand>,
    ) {
        let Some(inbound) = protocol::classify(frame) else {
            tracing::trace!("ignoring malformed frame from engine");
            return;
        };
        match inbound {
            Inbound::Response { id, body } => {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(body);
                }
            }
            Inbound::EngineRequest { id, method } => {
                tracing::debug!(%method, "engine request unsupported, replying method-not-found");
                let _ = writer_tx
                    .send(WriterCommand::Frame(protocol::method_not_found_response(
                        &id, &method,
                    )))
                    .await;
            }
            Inbound::Notification { method, params } => {
                if method == "textDocument/publishDiagnostics" {
                    Self::relay_diagnostics(params, event_tx).await;
                } else {
                    tracing::trace!(%method, "ignoring engine notification");
                }
            }
        }
    }

    async fn relay_diagnostics(
        params: Option<serde_json::Value>,
        event_tx: &mpsc::Sender<SessionEvent>,
    ) {
        let Some(params) = params else { return };
        match serde_json::from_value::<PublishDiagnosticsParams>(params) {
            Ok(payload) => {
                let _ = event_tx
                    .send(SessionEvent::Diagnostics {
                        uri: payload.uri,
                        diagnostics: payload.diagnostics,
                    })
                    .await;
            }
            Err(e) => {
                tracing::debug!("unparseable publishDiagnostics payload: {e}");
            }
        }
    }

    /// The reader hit EOF or a read error. While Running that is a lost
    /// protocol connection and is surfaced exactly once; during Stopping or
    /// after Stopped it is the expected end of the stream.
    async fn channel_closed(
        state: &StdMutex<SessionState>,
        pending: &Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
        event_tx: &mpsc::Sender<SessionEvent>,
        detail: &str,
    ) {
        let lost_while_running = {
            let mut st = lock_state(state);
            match *st {
                SessionState::Running => {
                    *st = SessionState::Failed;
                    true
                }
                SessionState::Stopping | SessionState::Stopped => false,
                _ => {
                    // Mid-handshake: the dropped pending sender fails the
                    // start() call; no separate event.
                    *st = SessionState::Failed;
                    false
                }
            }
        };
        // Wake any request still waiting on a response.
        pending.lock().await.clear();
        if lost_while_running {
            tracing::warn!("{detail}");
            let _ = event_tx
                .send(SessionEvent::Stopped {
                    reason: StopReason::ProtocolLost(detail.to_string()),
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml_filter() -> SessionFilter {
        SessionFilter::new("file", "yaml").unwrap()
    }

    /// A session wired to fake channels, parked in the given state. No
    /// child process; the recording receiver observes every frame that
    /// would have gone over the wire.
    fn test_session(
        state: SessionState,
    ) -> (
        ProtocolSession,
        mpsc::Receiver<WriterCommand>,
        mpsc::Receiver<SessionEvent>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(32);
        let (writer_tx, writer_rx) = mpsc::channel(32);
        let launch = LaunchSpec {
            command: PathBuf::from("/bin/true"),
            args: Vec::new(),
            working_dir: None,
        };
        let mut session = ProtocolSession::new(launch, yaml_filter(), false, event_tx);
        session.writer_tx = Some(writer_tx);
        session.set_state(state);
        (session, writer_rx, event_rx)
    }

    fn recorded_frame(rx: &mut mpsc::Receiver<WriterCommand>) -> serde_json::Value {
        match rx.try_recv().expect("a frame should have been written") {
            WriterCommand::Frame(frame) => frame,
            WriterCommand::Close => panic!("expected Frame, got Close"),
        }
    }

    fn test_channels() -> (
        PendingMap,
        mpsc::Sender<SessionEvent>,
        mpsc::Receiver<SessionEvent>,
        mpsc::Sender<WriterCommand>,
        mpsc::Receiver<WriterCommand>,
    ) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(32);
        let (writer_tx, writer_rx) = mpsc::channel(32);
        (pending, event_tx, event_rx, writer_tx, writer_rx)
    }

    #[tokio::test]
    async fn out_of_scope_documents_never_reach_the_channel() {
        let (mut session, mut writer_rx, _events) = test_session(SessionState::Running);

        let wrong_language = Document::new("file", "markdown", "file:///w/notes.md");
        let wrong_scheme = Document::new("untitled", "yaml", "untitled:draft.yaml");

        session.notify_opened(&wrong_language, "# notes").await.unwrap();
        session.notify_changed(&wrong_scheme, "a: 1").await.unwrap();
        session.notify_closed(&wrong_language).await.unwrap();

        assert!(writer_rx.try_recv().is_err(), "no frame may be written");
    }

    #[tokio::test]
    async fn open_change_close_sequence_is_forwarded_with_versions() {
        let (mut session, mut writer_rx, _events) = test_session(SessionState::Running);
        let doc = Document::new("file", "yaml", "file:///w/a.yaml");

        session.notify_opened(&doc, "a: 1\n").await.unwrap();
        session.notify_changed(&doc, "a: 2\n").await.unwrap();
        session.notify_closed(&doc).await.unwrap();

        let open = recorded_frame(&mut writer_rx);
        assert_eq!(open["method"], "textDocument/didOpen");
        assert_eq!(open["params"]["textDocument"]["uri"], "file:///w/a.yaml");
        assert_eq!(open["params"]["textDocument"]["version"], 1);

        let change = recorded_frame(&mut writer_rx);
        assert_eq!(change["method"], "textDocument/didChange");
        assert_eq!(change["params"]["textDocument"]["version"], 2);
        assert_eq!(change["params"]["contentChanges"][0]["text"], "a: 2\n");

        let close = recorded_frame(&mut writer_rx);
        assert_eq!(close["method"], "textDocument/didClose");
        assert!(writer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn change_before_open_is_promoted_to_open() {
        let (mut session, mut writer_rx, _events) = test_session(SessionState::Running);
        let doc = Document::new("file", "yaml", "file:///w/b.yaml");

        session.notify_changed(&doc, "b: 1\n").await.unwrap();

        let frame = recorded_frame(&mut writer_rx);
        assert_eq!(frame["method"], "textDocument/didOpen");
        assert_eq!(frame["params"]["textDocument"]["version"], 1);
    }

    #[tokio::test]
    async fn close_without_open_writes_nothing() {
        let (mut session, mut writer_rx, _events) = test_session(SessionState::Running);
        let doc = Document::new("file", "yaml", "file:///w/never-opened.yaml");

        session.notify_closed(&doc).await.unwrap();
        assert!(writer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn document_events_are_dropped_outside_running() {
        for state in [SessionState::Idle, SessionState::Stopping, SessionState::Failed] {
            let (mut session, mut writer_rx, _events) = test_session(state);
            let doc = Document::new("file", "yaml", "file:///w/a.yaml");
            session.notify_opened(&doc, "a: 1").await.unwrap();
            assert!(writer_rx.try_recv().is_err(), "state {state:?} must not forward");
        }
    }

    #[tokio::test]
    async fn start_outside_idle_spawns_nothing() {
        let (mut session, _writer_rx, _events) = test_session(SessionState::Running);
        session.start().await.unwrap();
        assert!(session.child.is_none(), "no second process may be spawned");
        assert_eq!(session.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn stop_is_a_noop_when_idle_or_stopped() {
        for state in [SessionState::Idle, SessionState::Stopped] {
            let (mut session, _writer_rx, _events) = test_session(state);
            session.stop().await;
            assert_eq!(session.state(), state);
        }
    }

    #[tokio::test]
    async fn dispatch_routes_response_to_pending_request() {
        let (pending, event_tx, _event_rx, writer_tx, _writer_rx) = test_channels();
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(1, tx);

        let frame = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {"capabilities": {}}});
        ProtocolSession::dispatch(&frame, &pending, &event_tx, &writer_tx).await;

        let body = rx.await.unwrap();
        assert!(body["result"]["capabilities"].is_object());
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn dispatch_relays_diagnostics_unmodified() {
        let (pending, event_tx, mut event_rx, writer_tx, _writer_rx) = test_channels();
        let diagnostic = serde_json::json!({
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 4, "character": 0}},
            "message": "1 validation error for Spec"
        });
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {"uri": "file:///w/a.yaml", "diagnostics": [diagnostic.clone()]}
        });

        ProtocolSession::dispatch(&frame, &pending, &event_tx, &writer_tx).await;

        match event_rx.try_recv().unwrap() {
            SessionEvent::Diagnostics { uri, diagnostics } => {
                assert_eq!(uri, "file:///w/a.yaml");
                assert_eq!(diagnostics, vec![diagnostic]);
            }
            other @ SessionEvent::Stopped { .. } => panic!("expected Diagnostics, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_answers_engine_requests_with_method_not_found() {
        let (pending, event_tx, _event_rx, writer_tx, mut writer_rx) = test_channels();
        let frame = serde_json::json!({
            "jsonrpc": "2.0", "id": 5, "method": "workspace/configuration", "params": {}
        });

        ProtocolSession::dispatch(&frame, &pending, &event_tx, &writer_tx).await;

        let reply = recorded_frame(&mut writer_rx);
        assert_eq!(reply["id"], 5);
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn dispatch_ignores_unknown_notifications_and_garbage() {
        let (pending, event_tx, mut event_rx, writer_tx, mut writer_rx) = test_channels();

        let log = serde_json::json!({
            "jsonrpc": "2.0", "method": "window/logMessage",
            "params": {"type": 3, "message": "hi"}
        });
        ProtocolSession::dispatch(&log, &pending, &event_tx, &writer_tx).await;
        ProtocolSession::dispatch(&serde_json::json!({"jsonrpc": "2.0"}), &pending, &event_tx, &writer_tx)
            .await;

        assert!(event_rx.try_recv().is_err());
        assert!(writer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn channel_close_while_running_surfaces_one_protocol_lost() {
        let (pending, event_tx, mut event_rx, _writer_tx, _writer_rx) = test_channels();
        let state = Arc::new(StdMutex::new(SessionState::Running));

        ProtocolSession::channel_closed(&state, &pending, &event_tx, "engine closed the channel")
            .await;

        assert_eq!(*lock_state(&state), SessionState::Failed);
        match event_rx.try_recv().unwrap() {
            SessionEvent::Stopped {
                reason: StopReason::ProtocolLost(detail),
            } => assert!(detail.contains("closed")),
            other => panic!("expected ProtocolLost, got {other:?}"),
        }
        assert!(event_rx.try_recv().is_err(), "exactly one event");
    }

    #[tokio::test]
    async fn channel_close_while_stopping_is_silent() {
        let (pending, event_tx, mut event_rx, _writer_tx, _writer_rx) = test_channels();
        let state = Arc::new(StdMutex::new(SessionState::Stopping));

        ProtocolSession::channel_closed(&state, &pending, &event_tx, "engine closed the channel")
            .await;

        assert_eq!(*lock_state(&state), SessionState::Stopping);
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn channel_close_mid_handshake_fails_pending_without_event() {
        let (pending, event_tx, mut event_rx, _writer_tx, _writer_rx) = test_channels();
        let state = Arc::new(StdMutex::new(SessionState::Starting));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(1, tx);

        ProtocolSession::channel_closed(&state, &pending, &event_tx, "engine closed the channel")
            .await;

        assert_eq!(*lock_state(&state), SessionState::Failed);
        assert!(rx.await.is_err(), "pending handshake must be woken");
        assert!(event_rx.try_recv().is_err(), "no event before Running");
    }
}
