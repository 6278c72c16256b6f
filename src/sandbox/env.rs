/// Environment contract between the launch script and `reprise-mock`
use crate::digest::launch_script::ENV_PREFIX;

/// Environment variables exported by the launch script prepend text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvKey {
    Label,
    DataDir,
    ExecutablePath,
    IgnoreFiles,
    IgnorePaths,
    RegenerateData,
    LaunchScript,
    BookkeepingDir,
}

impl EnvKey {
    pub const ALL: [EnvKey; 8] = [
        EnvKey::Label,
        EnvKey::DataDir,
        EnvKey::ExecutablePath,
        EnvKey::IgnoreFiles,
        EnvKey::IgnorePaths,
        EnvKey::RegenerateData,
        EnvKey::LaunchScript,
        EnvKey::BookkeepingDir,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnvKey::Label => "REPRISE_MOCK_LABEL",
            EnvKey::DataDir => "REPRISE_MOCK_DATA_DIR",
            EnvKey::ExecutablePath => "REPRISE_MOCK_EXECUTABLE_PATH",
            EnvKey::IgnoreFiles => "REPRISE_MOCK_IGNORE_FILES",
            EnvKey::IgnorePaths => "REPRISE_MOCK_IGNORE_PATHS",
            EnvKey::RegenerateData => "REPRISE_MOCK_REGENERATE_DATA",
            EnvKey::LaunchScript => "REPRISE_MOCK_LAUNCH_SCRIPT",
            EnvKey::BookkeepingDir => "REPRISE_MOCK_BOOKKEEPING_DIR",
        }
    }

    /// Keys without which the sandbox runner can not start
    pub fn is_required(self) -> bool {
        matches!(
            self,
            EnvKey::Label | EnvKey::DataDir | EnvKey::ExecutablePath
        )
    }
}

impl std::fmt::Display for EnvKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Glob lists travel colon-joined.
pub fn join_list(items: &[String]) -> String {
    items.join(":")
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(':')
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
