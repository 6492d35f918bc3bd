//! Editor-side lifecycle manager for the out-of-process YAML workflow
//! validation engine.
//!
//! The engine speaks the Language Server Protocol over its stdio; this
//! crate launches it, runs the handshake, forwards in-scope document
//! events, and relays diagnostics back to the host. It owns at most one
//! session per process and guarantees the child is reaped on teardown.

pub mod codec;
pub mod error;
pub mod types;

pub(crate) mod protocol;

mod filter;
mod launcher;
mod lifecycle;
mod session;

pub use error::{ConfigError, LaunchError, StartError};
pub use filter::SessionFilter;
pub use launcher::{LaunchSpec, build_launch_spec};
pub use lifecycle::LifecycleController;
pub use session::ProtocolSession;
pub use types::{ClientConfig, Document, SessionEvent, SessionState, StopReason};
