/// Mock code factory
///
/// Test suites ask the factory for a mocked code per label. The factory
/// resolves the real executable, checks the data directory, and produces the
/// launch-script fragments that route the engine's invocation through
/// `reprise-mock`.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::LaunchSpec;
use crate::config::{ConfigAction, TestingConfig};
use crate::digest::launch_script::shell_quote;
use crate::digest::MOCK_EXECUTABLE_NAME;
use crate::error::CacheError;

/// Per-code overrides for [`MockCodeFactory::create`]
#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Replaces the configured file exclusions when set
    pub ignore_files: Option<Vec<String>>,
    /// Added to the configured path exclusions
    pub ignore_paths: Vec<String>,
    /// Name looked up on PATH; defaults to the label
    pub executable_name: Option<String>,
}

pub struct MockCodeFactory {
    config: TestingConfig,
    action: ConfigAction,
    regenerate: bool,
    mock_executable: PathBuf,
    dirty: bool,
}

impl MockCodeFactory {
    /// Factory using the `reprise-mock` found on PATH.
    pub fn new(config: TestingConfig, action: ConfigAction, regenerate: bool) -> Result<Self> {
        let mock_executable = which::which(MOCK_EXECUTABLE_NAME)
            .with_context(|| format!("'{MOCK_EXECUTABLE_NAME}' not found in PATH"))?;
        Ok(Self::with_mock_executable(
            config,
            action,
            regenerate,
            mock_executable,
        ))
    }

    pub fn with_mock_executable(
        config: TestingConfig,
        action: ConfigAction,
        regenerate: bool,
        mock_executable: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            action,
            regenerate,
            mock_executable: mock_executable.into(),
            dirty: false,
        }
    }

    pub fn config(&self) -> &TestingConfig {
        &self.config
    }

    /// Mocked code for `label`, storing its outputs under `data_dir`.
    ///
    /// `data_dir` must exist and be absolute. The executable comes from the
    /// configuration or from PATH; with [`ConfigAction::Require`] a label
    /// missing from the configuration is an error, and with
    /// [`ConfigAction::Generate`] a PATH lookup is recorded for
    /// [`MockCodeFactory::finish`].
    pub fn create(&mut self, label: &str, data_dir: &Path, options: MockOptions) -> Result<MockCode> {
        if !data_dir.exists() {
            return Err(CacheError::InvalidDataDir {
                path: data_dir.to_path_buf(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }
        if !data_dir.is_absolute() {
            return Err(CacheError::InvalidDataDir {
                path: data_dir.to_path_buf(),
                reason: "path must be absolute".to_string(),
            }
            .into());
        }

        let executable_path = self.resolve_executable(label, options.executable_name.as_deref())?;

        let sandbox = &self.config.sandbox;
        let mut ignore_paths = sandbox.ignore_paths.clone();
        ignore_paths.extend(options.ignore_paths);

        let spec = LaunchSpec {
            label: label.to_string(),
            data_dir: data_dir.to_path_buf(),
            executable_path,
            ignore_files: options
                .ignore_files
                .unwrap_or_else(|| sandbox.ignore_files.clone()),
            ignore_paths,
            regenerate: self.regenerate,
            layout: sandbox.layout(),
        };

        debug!(label, data_dir = %data_dir.display(), "created mock code");

        Ok(MockCode {
            spec,
            mock_executable: self.mock_executable.clone(),
        })
    }

    fn resolve_executable(&mut self, label: &str, name: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = self.config.executable_for(label) {
            return Ok(Some(PathBuf::from(path)));
        }
        if self.action == ConfigAction::Require {
            return Err(CacheError::UnknownLabel {
                label: label.to_string(),
            }
            .into());
        }

        let name = name.unwrap_or(label);
        match which::which(name) {
            Ok(path) => {
                if self.action == ConfigAction::Generate {
                    self.config
                        .mock_code
                        .insert(label.to_string(), path.display().to_string());
                    self.dirty = true;
                }
                Ok(Some(path))
            }
            Err(e) => {
                debug!(label, name, "executable not found on PATH: {}", e);
                Ok(None)
            }
        }
    }

    /// Write back executables resolved from PATH when generating.
    ///
    /// Returns true if the file was written.
    pub fn finish(self, config_path: &Path) -> Result<bool> {
        if self.action != ConfigAction::Generate || !self.dirty {
            return Ok(false);
        }
        self.config.to_file(config_path)?;
        info!(path = %config_path.display(), "wrote generated configuration");
        Ok(true)
    }
}

/// A code whose invocations go through `reprise-mock`
#[derive(Debug, Clone)]
pub struct MockCode {
    spec: LaunchSpec,
    mock_executable: PathBuf,
}

impl MockCode {
    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    pub fn mock_executable(&self) -> &Path {
        &self.mock_executable
    }

    /// Export lines for the top of the launch script.
    pub fn prepend_text(&self) -> String {
        self.spec.prepend_text()
    }

    /// Invocation line as the engine would write it.
    pub fn launch_line(&self, args: &[&str]) -> String {
        let mut line = shell_quote(&self.mock_executable.to_string_lossy());
        for arg in args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        line
    }

    /// Write a complete launch script into `sandbox`, optionally redirecting
    /// stdout to `stdout_name`.
    pub fn write_launch_script(
        &self,
        sandbox: &Path,
        args: &[&str],
        stdout_name: Option<&str>,
    ) -> Result<PathBuf> {
        let mut line = self.launch_line(args);
        if let Some(name) = stdout_name {
            line.push_str(" > ");
            line.push_str(&shell_quote(name));
        }

        let script = sandbox.join(&self.spec.layout.launch_script);
        let content = format!("#!/bin/bash\n{}\n{line}\n", self.prepend_text());
        fs::write(&script, content)
            .with_context(|| format!("Failed to write launch script: {}", script.display()))?;
        Ok(script)
    }
}
