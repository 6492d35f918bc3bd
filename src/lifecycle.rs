//! Lifecycle controller — the host's single entry point.
//!
//! Owns zero or one [`ProtocolSession`] for the life of the process. The
//! host calls [`on_system_start`] when the extension activates and
//! [`on_system_stop`] when it deactivates; in between it forwards document
//! events and drains [`SessionEvent`]s.
//!
//! [`on_system_start`]: LifecycleController::on_system_start
//! [`on_system_stop`]: LifecycleController::on_system_stop

use tokio::sync::mpsc;

use crate::error::StartError;
use crate::filter::SessionFilter;
use crate::launcher::build_launch_spec;
use crate::session::ProtocolSession;
use crate::types::{ClientConfig, Document, SessionEvent, SessionState};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct LifecycleController {
    session: Option<ProtocolSession>,
    event_rx: mpsc::Receiver<SessionEvent>,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleController {
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session: None,
            event_rx,
            event_tx,
        }
    }

    /// Resolve the launch spec, construct the one permitted session, and
    /// start it. Suspends until the engine is spawned and the handshake
    /// completes. Errors are returned for the host to present to the user;
    /// a failed attempt leaves no session and no child process behind.
    ///
    /// Called while a session already exists this is a no-op.
    pub async fn on_system_start(&mut self, config: &ClientConfig) -> Result<(), StartError> {
        if self.session.is_some() {
            tracing::debug!("on_system_start ignored: session already exists");
            return Ok(());
        }

        let filter = SessionFilter::new(config.scheme.clone(), config.language_id.clone())?;
        let launch = build_launch_spec(config)?;
        let mut session =
            ProtocolSession::new(launch, filter, config.trace_io, self.event_tx.clone());

        if let Err(e) = session.start().await {
            // The spawn may have succeeded even though the handshake did
            // not; reap before reporting.
            session.stop().await;
            return Err(e.into());
        }

        self.session = Some(session);
        Ok(())
    }

    /// Tear the session down. Completes only after the engine process has
    /// exited, so the host can treat return as "nothing left running".
    /// No-op when no session exists.
    pub async fn on_system_stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop().await;
        }
    }

    pub async fn document_opened(&mut self, doc: &Document, text: &str) {
        if let Some(session) = &mut self.session {
            if let Err(e) = session.notify_opened(doc, text).await {
                tracing::warn!(uri = %doc.uri, "didOpen not delivered: {e:#}");
            }
        }
    }

    pub async fn document_changed(&mut self, doc: &Document, text: &str) {
        if let Some(session) = &mut self.session {
            if let Err(e) = session.notify_changed(doc, text).await {
                tracing::warn!(uri = %doc.uri, "didChange not delivered: {e:#}");
            }
        }
    }

    pub async fn document_closed(&mut self, doc: &Document) {
        if let Some(session) = &mut self.session {
            if let Err(e) = session.notify_closed(doc).await {
                tracing::warn!(uri = %doc.uri, "didClose not delivered: {e:#}");
            }
        }
    }

    /// Next event from the session, if any is queued. Non-blocking.
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait for the next event from the session.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// State of the owned session, if one exists.
    #[must_use]
    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(ProtocolSession::state)
    }

    /// OS pid of the engine process, while one is held.
    #[must_use]
    pub fn engine_pid(&self) -> Option<u32> {
        self.session.as_ref().and_then(ProtocolSession::engine_pid)
    }
}
