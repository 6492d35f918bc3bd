//! Resolves the command used to launch the validation engine.
//!
//! Resolution is pure — the actual spawn happens in the session. Failing
//! here is the point: a missing interpreter must surface as a diagnosable
//! [`ConfigError`] instead of a silent spawn failure.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::types::{ClientConfig, DEFAULT_INTERPRETER};

/// Fully resolved launch parameters for the engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Absolute path to the interpreter binary.
    pub command: PathBuf,
    /// Arguments, starting with the engine's entry script.
    pub args: Vec<String>,
    /// Working directory, if the configuration names one.
    pub working_dir: Option<PathBuf>,
}

/// Build a [`LaunchSpec`] from configuration.
///
/// Resolution order: explicit `interpreter_path` (must exist), then
/// [`DEFAULT_INTERPRETER`] from `PATH`. Either way the entry script must
/// also exist; it is passed to the engine as an absolute path.
pub fn build_launch_spec(config: &ClientConfig) -> Result<LaunchSpec, ConfigError> {
    let command = match &config.interpreter_path {
        Some(path) => {
            if !path.is_file() {
                return Err(ConfigError::InterpreterMissing { path: path.clone() });
            }
            path.clone()
        }
        None => {
            which::which(DEFAULT_INTERPRETER).map_err(|_| ConfigError::InterpreterNotFound {
                name: DEFAULT_INTERPRETER.to_string(),
            })?
        }
    };

    // Canonicalize so the argument stays valid inside the child, whose
    // working directory may differ from ours.
    let script = config
        .server_script
        .canonicalize()
        .map_err(|_| ConfigError::ScriptMissing {
            path: config.server_script.clone(),
        })?;
    if !script.is_file() {
        return Err(ConfigError::ScriptMissing {
            path: config.server_script.clone(),
        });
    }

    Ok(LaunchSpec {
        command,
        args: vec![script.to_string_lossy().into_owned()],
        working_dir: config.working_dir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(interpreter: Option<&str>, script: &std::path::Path) -> ClientConfig {
        serde_json::from_value(serde_json::json!({
            "interpreter_path": interpreter,
            "server_script": script,
        }))
        .unwrap()
    }

    fn scratch_script(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("server.py");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# stand-in engine script").unwrap();
        path
    }

    #[test]
    fn missing_explicit_interpreter_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = scratch_script(&dir);
        let err = build_launch_spec(&config(Some("/bin/doesnotexist"), &script)).unwrap_err();
        assert!(matches!(err, ConfigError::InterpreterMissing { .. }));
    }

    #[test]
    fn explicit_interpreter_wins_over_path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let script = scratch_script(&dir);
        // /bin/sh exists everywhere the tests run
        let spec = build_launch_spec(&config(Some("/bin/sh"), &script)).unwrap();
        assert_eq!(spec.command, PathBuf::from("/bin/sh"));
        let canonical = script.canonicalize().unwrap();
        assert_eq!(spec.args, vec![canonical.to_string_lossy().into_owned()]);
        assert!(spec.working_dir.is_none());
    }

    #[test]
    fn script_argument_is_always_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let script = scratch_script(&dir);
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        // A path with a `..` component would break once the engine runs
        // under a different working directory.
        let dotted = dir.path().join("sub").join("..").join("server.py");

        let mut cfg = config(Some("/bin/sh"), &dotted);
        cfg.working_dir = Some(dir.path().join("sub"));
        let spec = build_launch_spec(&cfg).unwrap();

        let arg = std::path::Path::new(&spec.args[0]);
        assert!(arg.is_absolute());
        assert_eq!(arg, script.canonicalize().unwrap());
        assert!(!spec.args[0].contains(".."));
    }

    #[test]
    fn missing_script_is_config_error() {
        let err =
            build_launch_spec(&config(Some("/bin/sh"), std::path::Path::new("/no/such/server.py")))
                .unwrap_err();
        assert!(matches!(err, ConfigError::ScriptMissing { .. }));
    }

    #[test]
    fn working_dir_is_carried_through() {
        let dir = tempfile::tempdir().unwrap();
        let script = scratch_script(&dir);
        let mut cfg = config(Some("/bin/sh"), &script);
        cfg.working_dir = Some(dir.path().to_path_buf());
        let spec = build_launch_spec(&cfg).unwrap();
        assert_eq!(spec.working_dir.as_deref(), Some(dir.path()));
    }
}
