//! Public types consumed by the editor host.
//!
//! The host constructs a [`ClientConfig`], forwards [`Document`] events
//! through the lifecycle controller, and drains [`SessionEvent`]s to render
//! diagnostics and session failures.

use std::path::PathBuf;

use serde::Deserialize;

/// Interpreter resolved from `PATH` when no explicit path is configured.
pub const DEFAULT_INTERPRETER: &str = "python3";

fn default_scheme() -> String {
    "file".to_string()
}

fn default_language_id() -> String {
    "yaml".to_string()
}

/// Configuration for the validator client.
///
/// Only `server_script` is required; everything else has a sensible default.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Explicit interpreter path. Overrides `PATH` resolution; must exist.
    #[serde(default)]
    pub interpreter_path: Option<PathBuf>,
    /// Absolute path to the validation engine's entry script.
    pub server_script: PathBuf,
    /// Working directory for the engine process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// URI scheme in scope for this session (default `"file"`).
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Language identifier in scope for this session (default `"yaml"`).
    #[serde(default = "default_language_id")]
    pub language_id: String,
    /// Log every protocol frame at debug level.
    #[serde(default)]
    pub trace_io: bool,
}

/// A document event as observed by the host.
///
/// The scheme and language id are carried explicitly because editor hosts
/// report them alongside the URI; the client never re-derives them.
#[derive(Debug, Clone)]
pub struct Document {
    pub scheme: String,
    pub language_id: String,
    pub uri: String,
}

impl Document {
    #[must_use]
    pub fn new(
        scheme: impl Into<String>,
        language_id: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            language_id: language_id.into(),
            uri: uri.into(),
        }
    }
}

/// Lifecycle state of a protocol session.
///
/// `Failed` is terminal for that session instance; retry means constructing
/// a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Why a session stopped delivering events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Clean shutdown through `stop()`.
    Exited,
    /// The channel closed or the engine died while the session was Running.
    ProtocolLost(String),
}

/// An event emitted by the session for the host to render.
#[derive(Debug)]
pub enum SessionEvent {
    /// Diagnostics published by the engine for one document.
    ///
    /// Payloads are relayed unmodified; this core routes them, it does not
    /// interpret them.
    Diagnostics {
        uri: String,
        diagnostics: Vec<serde_json::Value>,
    },
    /// The session left the Running state on its own.
    Stopped { reason: StopReason },
}
