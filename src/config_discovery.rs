use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{TestingConfig, CONFIG_FILE_NAME};

/// Discovers reprise configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Ok(Some(config_path));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    if let Some(path) = global_config_path() {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// `~/.config/reprise/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/reprise/config.toml"))
}

/// A configuration together with the file it belongs to
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TestingConfig,
    /// File the configuration was read from, or will be written to
    pub path: PathBuf,
    /// False if no file existed and defaults are in use
    pub found: bool,
}

impl LoadedConfig {
    /// Directory holding snapshot archives; relative settings are resolved
    /// against the config file's directory.
    pub fn archive_root(&self) -> PathBuf {
        let dir = Path::new(&self.config.graph.archive_dir);
        if dir.is_absolute() {
            return dir.to_path_buf();
        }
        match self.path.parent() {
            Some(parent) => parent.join(dir),
            None => dir.to_path_buf(),
        }
    }
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, that file is used; it may not exist yet,
/// in which case defaults are returned with `found == false`. Otherwise the
/// directory tree is searched upward from `start_dir`, and when nothing is
/// found the target becomes `start_dir/reprise.toml`.
pub fn load_config_with_discovery(
    explicit_path: Option<&Path>,
    start_dir: &Path,
) -> Result<LoadedConfig> {
    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(start_dir)?,
    };

    match path {
        Some(path) if path.exists() => {
            let config = TestingConfig::from_file(&path)?;
            config
                .validate()
                .with_context(|| format!("Invalid config file: {}", path.display()))?;
            Ok(LoadedConfig {
                config,
                path,
                found: true,
            })
        }
        Some(path) => Ok(LoadedConfig {
            config: TestingConfig::default(),
            path,
            found: false,
        }),
        None => Ok(LoadedConfig {
            config: TestingConfig::default(),
            path: start_dir.join(CONFIG_FILE_NAME),
            found: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_config_finds_nearest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let project = root.join("project");
        let subdir = project.join("tests/data");
        fs::create_dir_all(&subdir).unwrap();

        let config_path = project.join("reprise.toml");
        fs::write(&config_path, "# test config").unwrap();

        let found = discover_config(&subdir).unwrap();
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_explicit_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");

        let loaded = load_config_with_discovery(Some(&path), temp.path()).unwrap();
        assert!(!loaded.found);
        assert_eq!(loaded.path, path);
        assert_eq!(loaded.config, TestingConfig::default());
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        fs::write(&path, "[mock_code]\ndiff = \"/usr/bin/diff\"\n").unwrap();

        let loaded = load_config_with_discovery(Some(&path), temp.path()).unwrap();
        assert!(loaded.found);
        assert_eq!(loaded.config.executable_for("diff"), Some("/usr/bin/diff"));
    }

    #[test]
    fn test_archive_root_is_relative_to_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tests/reprise.toml");

        let mut loaded = load_config_with_discovery(Some(&path), temp.path()).unwrap();
        assert_eq!(loaded.archive_root(), temp.path().join("tests/caches"));

        loaded.config.graph.archive_dir = "/srv/caches".into();
        assert_eq!(loaded.archive_root(), PathBuf::from("/srv/caches"));
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("reprise.toml");
        fs::write(&path, "[mock_code]\ndiff = \"diff\"\n").unwrap();

        assert!(load_config_with_discovery(Some(&path), temp.path()).is_err());
    }
}
