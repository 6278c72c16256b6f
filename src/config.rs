use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::digest::directory::{DEFAULT_BOOKKEEPING_DIR, DEFAULT_LAUNCH_SCRIPT};
use crate::digest::SandboxLayout;
use crate::graph::{FieldFilter, HashPolicy};

/// File name searched for by config discovery
pub const CONFIG_FILE_NAME: &str = "reprise.toml";

/// Complete reprise configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TestingConfig {
    /// Label -> absolute path of the real executable
    #[serde(default)]
    pub mock_code: BTreeMap<String, String>,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub graph: GraphConfig,
}

/// Sandbox layout and default capture exclusions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    #[serde(default = "default_launch_script")]
    pub launch_script: String,

    #[serde(default = "default_bookkeeping_dir")]
    pub bookkeeping_dir: String,

    /// File-name globs never captured
    #[serde(default = "default_ignore_files")]
    pub ignore_files: Vec<String>,

    /// Relative-path globs never captured
    #[serde(default)]
    pub ignore_paths: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            launch_script: default_launch_script(),
            bookkeeping_dir: default_bookkeeping_dir(),
            ignore_files: default_ignore_files(),
            ignore_paths: Vec::new(),
        }
    }
}

impl SandboxConfig {
    pub fn layout(&self) -> SandboxLayout {
        SandboxLayout {
            launch_script: self.launch_script.clone(),
            bookkeeping_dir: self.bookkeeping_dir.clone(),
        }
    }
}

/// Graph snapshot cache settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphConfig {
    /// Directory holding snapshot archives (relative to the config file)
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,

    /// Attribute fields dropped from every node kind before hashing
    #[serde(default)]
    pub hash_exclude: Vec<String>,

    /// Per-kind attribute filters
    #[serde(default)]
    pub hash_policy: BTreeMap<String, FieldFilter>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            archive_dir: default_archive_dir(),
            hash_exclude: Vec::new(),
            hash_policy: BTreeMap::new(),
        }
    }
}

impl GraphConfig {
    /// The recommended hash policy with this file's settings on top.
    ///
    /// A kind configured here replaces the recommended filter for that kind.
    pub fn hash_policy(&self) -> HashPolicy {
        let mut policy =
            HashPolicy::recommended().with_global_exclude(self.hash_exclude.iter().cloned());
        for (kind, filter) in &self.hash_policy {
            policy = policy.with_kind(kind.clone(), filter.clone());
        }
        policy
    }
}

/// How a test session treats the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ConfigAction {
    /// Use executables from the file when present
    #[default]
    Read,
    /// Every requested label must be configured
    Require,
    /// Resolve executables from PATH and write them back
    Generate,
}

fn default_launch_script() -> String {
    DEFAULT_LAUNCH_SCRIPT.to_string()
}

fn default_bookkeeping_dir() -> String {
    DEFAULT_BOOKKEEPING_DIR.to_string()
}

fn default_ignore_files() -> Vec<String> {
    vec![DEFAULT_LAUNCH_SCRIPT.to_string()]
}

fn default_archive_dir() -> String {
    "caches".to_string()
}

impl TestingConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: TestingConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Write configuration as TOML
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let mut config = TestingConfig::default();
        config
            .mock_code
            .insert("diff".to_string(), "/usr/bin/diff".to_string());
        config.graph.hash_policy.insert(
            "code".to_string(),
            FieldFilter::exclude(["computer", "hostname"]),
        );

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Executable configured for `label`
    pub fn executable_for(&self, label: &str) -> Option<&str> {
        self.mock_code
            .get(label)
            .map(String::as_str)
            .filter(|path| !path.is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (label, path) in &self.mock_code {
            if label.is_empty() {
                anyhow::bail!("mock_code labels must not be empty");
            }
            if !Path::new(path).is_absolute() {
                anyhow::bail!("mock_code.{label} must be an absolute path: {path}");
            }
        }

        let layout = &self.sandbox;
        if layout.launch_script.is_empty() || layout.launch_script.contains('/') {
            anyhow::bail!("sandbox.launch_script must be a plain file name");
        }
        if layout.bookkeeping_dir.is_empty() || layout.bookkeeping_dir.contains('/') {
            anyhow::bail!("sandbox.bookkeeping_dir must be a plain directory name");
        }
        for pattern in layout.ignore_files.iter().chain(&layout.ignore_paths) {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid ignore pattern: {pattern}"))?;
        }

        if self.graph.archive_dir.is_empty() {
            anyhow::bail!("graph.archive_dir must be set");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TestingConfig::default();
        assert_eq!(config.sandbox.launch_script, "_submit.sh");
        assert_eq!(config.sandbox.bookkeeping_dir, ".engine");
        assert_eq!(config.sandbox.ignore_files, vec!["_submit.sh"]);
        assert_eq!(config.graph.archive_dir, "caches");
        assert!(config.mock_code.is_empty());
    }

    #[test]
    fn test_validate_config() {
        assert!(TestingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_relative_executable_is_rejected() {
        let mut config = TestingConfig::default();
        config.mock_code.insert("diff".into(), "bin/diff".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let mut config = TestingConfig::default();
        config.sandbox.ignore_paths.push("a/[b".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: TestingConfig = toml::from_str(
            r#"
[mock_code]
diff = "/usr/bin/diff"

[graph.hash_policy.diff]
exclude = ["metadata.options"]
"#,
        )
        .unwrap();

        assert_eq!(config.executable_for("diff"), Some("/usr/bin/diff"));
        assert_eq!(config.executable_for("pw"), None);
        assert_eq!(config.sandbox, SandboxConfig::default());
        let policy = config.graph.hash_policy();
        assert_eq!(policy.kinds["diff"].exclude, vec!["metadata.options"]);
        assert!(policy.kinds.contains_key("code"));
    }

    #[test]
    fn test_hash_policy_overrides_recommended_kind() {
        let mut config = TestingConfig::default();
        assert_eq!(config.graph.hash_policy(), HashPolicy::recommended());

        config
            .graph
            .hash_policy
            .insert("code".into(), FieldFilter::include(["label"]));
        config.graph.hash_exclude.push("ctime".into());

        let policy = config.graph.hash_policy();
        assert_eq!(policy.kinds["code"], FieldFilter::include(["label"]));
        assert!(policy.global_exclude.contains(&"engine_version".to_string()));
        assert!(policy.global_exclude.contains(&"ctime".to_string()));
    }

    #[test]
    fn test_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/reprise.toml");

        let mut config = TestingConfig::default();
        config.mock_code.insert("diff".into(), "/usr/bin/diff".into());
        config.to_file(&path).unwrap();

        assert_eq!(TestingConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_example_parses() {
        let example = TestingConfig::example().unwrap();
        let config: TestingConfig = toml::from_str(&example).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.executable_for("diff"), Some("/usr/bin/diff"));
    }
}
