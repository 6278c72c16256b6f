/// Launch script executor
///
/// Runs the rewritten launch script with bash in the sandbox directory. Stdio
/// is inherited so the real executable writes wherever the engine redirected
/// the mock's streams.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::env::EnvKey;
use crate::logging::{operations, services};

/// Result of running a launch script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Seam between the sandbox runner and process spawning
pub trait LaunchExecutor {
    fn execute(&self, script: &Path, cwd: &Path) -> Result<ExecutionResult>;
}

/// Executes launch scripts with bash
pub struct BashExecutor {
    shell: PathBuf,
}

impl BashExecutor {
    pub fn new() -> Self {
        let shell = which::which("bash").unwrap_or_else(|e| {
            warn!("Could not find 'bash' in PATH: {}. Trying as-is.", e);
            PathBuf::from("bash")
        });
        Self { shell }
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for BashExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchExecutor for BashExecutor {
    fn execute(&self, script: &Path, cwd: &Path) -> Result<ExecutionResult> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg(script).current_dir(cwd);
        // The real executable must not see the mock contract, or a nested
        // reprise-mock would pick it up.
        for key in EnvKey::ALL {
            cmd.env_remove(key.as_str());
        }

        debug!(
            service = services::SANDBOX,
            operation = operations::EXECUTE,
            command = ?cmd,
            "running launch script"
        );

        let status = cmd
            .status()
            .with_context(|| format!("Failed to spawn {}", self.shell.display()))?;

        Ok(ExecutionResult {
            exit_code: status.code(),
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_runs_in_cwd() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("_submit.sh");
        fs::write(&script, "#!/bin/bash\necho hello > out.txt\n").unwrap();

        let result = BashExecutor::new().execute(&script, temp.path()).unwrap();

        assert!(result.success());
        assert_eq!(
            fs::read_to_string(temp.path().join("out.txt")).unwrap(),
            "hello\n"
        );
    }

    #[test]
    fn test_exit_code_is_reported() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("_submit.sh");
        fs::write(&script, "exit 3\n").unwrap();

        let result = BashExecutor::new().execute(&script, temp.path()).unwrap();

        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());
    }

    #[test]
    fn test_missing_shell_fails() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("_submit.sh");
        fs::write(&script, "true\n").unwrap();

        let executor = BashExecutor::with_shell(temp.path().join("no-such-shell"));
        assert!(executor.execute(&script, temp.path()).is_err());
    }
}
