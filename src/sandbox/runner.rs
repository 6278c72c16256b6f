/// Sandbox runner
///
/// Replays a stored entry when the sandbox has been seen before, otherwise
/// runs the real executable and captures what it produced.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::executor::{BashExecutor, LaunchExecutor};
use super::spec::LaunchSpec;
use crate::digest::{fingerprint_directory_with, rewrite_launch_script, Fingerprint};
use crate::error::CacheError;
use crate::logging::{operations, services, status};
use crate::store::ContentStore;

/// What a sandbox run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A stored entry was copied into the sandbox
    Replayed {
        fingerprint: Fingerprint,
        entry: PathBuf,
    },
    /// The real executable ran and its outputs were captured
    Executed {
        fingerprint: Fingerprint,
        entry: PathBuf,
        exit_code: Option<i32>,
    },
}

impl Outcome {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Outcome::Replayed { fingerprint, .. } | Outcome::Executed { fingerprint, .. } => {
                fingerprint
            }
        }
    }

    pub fn entry(&self) -> &Path {
        match self {
            Outcome::Replayed { entry, .. } | Outcome::Executed { entry, .. } => entry,
        }
    }

    pub fn is_replayed(&self) -> bool {
        matches!(self, Outcome::Replayed { .. })
    }
}

pub struct SandboxRunner<E = BashExecutor> {
    executor: E,
}

impl SandboxRunner<BashExecutor> {
    pub fn new() -> Self {
        Self::with_executor(BashExecutor::new())
    }
}

impl Default for SandboxRunner<BashExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: LaunchExecutor> SandboxRunner<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Serve the invocation described by `spec` in sandbox `cwd`.
    ///
    /// Outputs are captured whatever the executable's exit code; the engine
    /// judges success from the files, not from the mock's status.
    pub fn run(&self, spec: &LaunchSpec, cwd: &Path) -> Result<Outcome> {
        let store = ContentStore::new(&spec.data_dir).with_layout(spec.layout.clone());
        let label = spec.label.as_str();
        let fingerprint = fingerprint_directory_with(cwd, &spec.layout)?;

        if spec.regenerate {
            store.regenerate(label, &fingerprint)?;
        }

        if store.exists(label, &fingerprint) {
            store.restore(label, &fingerprint, cwd)?;
            return Ok(Outcome::Replayed {
                entry: store.entry_dir(label, &fingerprint),
                fingerprint,
            });
        }

        let Some(executable) = spec.executable_path.as_deref() else {
            warn!(
                service = services::SANDBOX,
                operation = operations::RUN,
                status = status::ERROR,
                label,
                fingerprint = %fingerprint,
                "no stored entry and no executable"
            );
            return Err(CacheError::NoExecutableAvailable {
                label: label.to_string(),
            }
            .into());
        };

        info!(
            service = services::SANDBOX,
            operation = operations::RUN,
            status = status::MISS,
            label,
            fingerprint = %fingerprint,
            executable = %executable.display(),
            "no stored entry, running executable"
        );

        let exclusions = spec.exclusions()?;
        let script = cwd.join(&spec.layout.launch_script);
        let content = fs::read_to_string(&script)
            .with_context(|| format!("Failed to read launch script: {}", script.display()))?;
        fs::write(&script, rewrite_launch_script(&content, executable))
            .with_context(|| format!("Failed to rewrite launch script: {}", script.display()))?;

        let result = self.executor.execute(&script, cwd)?;
        info!(
            service = services::SANDBOX,
            operation = operations::EXECUTE,
            label,
            exit_code = ?result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            "executable finished"
        );

        let saved = store.save(label, &fingerprint, cwd, &exclusions)?;

        Ok(Outcome::Executed {
            fingerprint,
            entry: saved.path,
            exit_code: result.exit_code,
        })
    }
}
