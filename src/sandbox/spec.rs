/// Launch specification
///
/// Everything the sandbox runner needs to know about one invocation travels
/// through the environment of the launch script. [`LaunchSpec::prepend_text`]
/// renders the exports and [`LaunchSpec::from_env_with`] reads them back.
use anyhow::Result;
use std::path::PathBuf;

use super::env::{join_list, split_list, EnvKey};
use crate::digest::SandboxLayout;
use crate::error::CacheError;
use crate::store::Exclusions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Cache namespace, usually the name of the mocked code
    pub label: String,
    /// Root of the content-addressed store
    pub data_dir: PathBuf,
    /// Real executable; `None` means replay-only
    pub executable_path: Option<PathBuf>,
    /// File-name globs never captured
    pub ignore_files: Vec<String>,
    /// Relative-path globs never captured
    pub ignore_paths: Vec<String>,
    /// Discard a matching entry and run again
    pub regenerate: bool,
    pub layout: SandboxLayout,
}

impl LaunchSpec {
    pub fn new(label: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            data_dir: data_dir.into(),
            executable_path: None,
            ignore_files: Vec::new(),
            ignore_paths: Vec::new(),
            regenerate: false,
            layout: SandboxLayout::default(),
        }
    }

    /// Read the specification from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read the specification through `lookup`.
    ///
    /// An empty executable path means no executable. Only the literal
    /// `True` enables regeneration.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: EnvKey| -> Result<Option<String>> {
            match lookup(key.as_str()) {
                Some(value) => Ok(Some(value)),
                None if key.is_required() => Err(CacheError::MissingEnvironment {
                    key: key.as_str().to_string(),
                }
                .into()),
                None => Ok(None),
            }
        };

        let label = get(EnvKey::Label)?.unwrap_or_default();
        let data_dir = get(EnvKey::DataDir)?.unwrap_or_default();
        let executable_path = get(EnvKey::ExecutablePath)?
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        let mut layout = SandboxLayout::default();
        if let Some(script) = get(EnvKey::LaunchScript)?.filter(|v| !v.is_empty()) {
            layout.launch_script = script;
        }
        if let Some(dir) = get(EnvKey::BookkeepingDir)?.filter(|v| !v.is_empty()) {
            layout.bookkeeping_dir = dir;
        }

        Ok(Self {
            label,
            data_dir: PathBuf::from(data_dir),
            executable_path,
            ignore_files: get(EnvKey::IgnoreFiles)?
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            ignore_paths: get(EnvKey::IgnorePaths)?
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            regenerate: get(EnvKey::RegenerateData)?.as_deref() == Some("True"),
            layout,
        })
    }

    /// Key/value pairs of the environment contract.
    pub fn env_pairs(&self) -> Vec<(EnvKey, String)> {
        let executable = self
            .executable_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let regenerate = if self.regenerate { "True" } else { "False" };

        vec![
            (EnvKey::Label, self.label.clone()),
            (EnvKey::DataDir, self.data_dir.display().to_string()),
            (EnvKey::ExecutablePath, executable),
            (EnvKey::IgnoreFiles, join_list(&self.ignore_files)),
            (EnvKey::IgnorePaths, join_list(&self.ignore_paths)),
            (EnvKey::RegenerateData, regenerate.to_string()),
            (EnvKey::LaunchScript, self.layout.launch_script.clone()),
            (EnvKey::BookkeepingDir, self.layout.bookkeeping_dir.clone()),
        ]
    }

    /// Shell lines exporting the contract, for the top of a launch script.
    pub fn prepend_text(&self) -> String {
        self.env_pairs()
            .into_iter()
            .map(|(key, value)| format!("export {key}={}\n", double_quote(&value)))
            .collect()
    }

    /// Compiled capture exclusions.
    pub fn exclusions(&self) -> Result<Exclusions> {
        Exclusions::new(&self.ignore_files, &self.ignore_paths)
    }
}

fn double_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    /// Reads back `export KEY="value"` lines the way a POSIX shell would.
    fn parse_exports(text: &str) -> HashMap<String, String> {
        text.lines()
            .filter_map(|line| line.strip_prefix("export "))
            .filter_map(|assignment| assignment.split_once('='))
            .map(|(key, quoted)| {
                let inner = &quoted[1..quoted.len() - 1];
                let mut value = String::new();
                let mut escaped = false;
                for c in inner.chars() {
                    if c == '\\' && !escaped {
                        escaped = true;
                        continue;
                    }
                    escaped = false;
                    value.push(c);
                }
                (key.to_string(), value)
            })
            .collect()
    }

    fn full_spec() -> LaunchSpec {
        LaunchSpec {
            label: "diff".to_string(),
            data_dir: PathBuf::from("/tmp/data dir/$HOME"),
            executable_path: Some(PathBuf::from("/usr/bin/diff")),
            ignore_files: vec!["_submit.sh".to_string(), "file*".to_string()],
            ignore_paths: vec!["my/subfolder".to_string()],
            regenerate: true,
            layout: SandboxLayout {
                launch_script: "job.sh".to_string(),
                bookkeeping_dir: ".meta".to_string(),
            },
        }
    }

    #[test]
    fn test_prepend_text_round_trips() {
        let spec = full_spec();
        let env = parse_exports(&spec.prepend_text());

        let parsed = LaunchSpec::from_env_with(|key| env.get(key).cloned()).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_every_line_is_a_sentinel_export() {
        let text = full_spec().prepend_text();
        assert_eq!(text.lines().count(), EnvKey::ALL.len());
        for line in text.lines() {
            assert!(line.starts_with("export REPRISE_MOCK_"), "{line}");
        }
    }

    #[test]
    fn test_missing_required_key() {
        let err = LaunchSpec::from_env_with(|key| {
            (key != EnvKey::DataDir.as_str()).then(|| "x".to_string())
        })
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<CacheError>(),
            Some(&CacheError::MissingEnvironment {
                key: "REPRISE_MOCK_DATA_DIR".to_string()
            })
        );
    }

    #[test]
    fn test_optional_keys_default() {
        let env: HashMap<&str, &str> = [
            ("REPRISE_MOCK_LABEL", "diff"),
            ("REPRISE_MOCK_DATA_DIR", "/data"),
            ("REPRISE_MOCK_EXECUTABLE_PATH", ""),
            ("REPRISE_MOCK_REGENERATE_DATA", "true"),
        ]
        .into_iter()
        .collect();

        let spec = LaunchSpec::from_env_with(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(spec.executable_path, None);
        assert!(!spec.regenerate);
        assert!(spec.ignore_files.is_empty());
        assert_eq!(spec.layout, SandboxLayout::default());
    }

    #[test]
    #[serial]
    fn test_from_process_environment() {
        let spec = full_spec();
        for (key, value) in spec.env_pairs() {
            std::env::set_var(key.as_str(), value);
        }

        let parsed = LaunchSpec::from_env();
        for key in EnvKey::ALL {
            std::env::remove_var(key.as_str());
        }
        assert_eq!(parsed.unwrap(), spec);
    }

    #[test]
    fn test_exclusions_compile() {
        let spec = full_spec();
        let exclusions = spec.exclusions().unwrap();
        assert!(exclusions.excludes(std::path::Path::new("file1.txt")));
        assert!(!exclusions.excludes(std::path::Path::new("diff.out")));
    }
}
