//! Error taxonomy surfaced to the host.
//!
//! All three classes are user-visible: the host is expected to render them
//! as notifications, never to swallow them. Filtered-out documents and
//! duplicate `start()`/`stop()` calls are not errors and never reach here.

use std::path::PathBuf;

/// The engine executable could not be resolved. User-actionable; retry
/// after fixing the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "configured interpreter does not exist: {} (check `interpreter_path`)",
        path.display()
    )]
    InterpreterMissing { path: PathBuf },

    #[error("interpreter not found: no `{name}` on PATH and no `interpreter_path` configured")]
    InterpreterNotFound { name: String },

    #[error("validation engine script does not exist: {}", path.display())]
    ScriptMissing { path: PathBuf },

    #[error("session filter `{field}` must not be empty")]
    EmptyFilterField { field: &'static str },
}

/// The engine process failed to spawn, or died before the handshake
/// completed. Fatal to this session attempt; a new session may be started.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine did not complete the handshake: {0}")]
    HandshakeFailed(String),

    #[error("engine rejected the initialize request: {0}")]
    InitializeRejected(String),
}

/// Everything that can go wrong inside [`on_system_start`].
///
/// [`on_system_start`]: crate::LifecycleController::on_system_start
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}
