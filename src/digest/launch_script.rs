/// Launch script normalization
///
/// The workflow engine generates a shell script that exports the mock
/// environment and then invokes `reprise-mock` by absolute path. Neither the
/// exports nor the installation path say anything about the computation, so
/// both are removed before the script participates in a fingerprint, and both
/// are rewritten before the script is handed to the real executable.
use std::path::Path;

/// File name of the indirection executable referenced from launch scripts.
pub const MOCK_EXECUTABLE_NAME: &str = "reprise-mock";

/// Prefix shared by every environment variable of the mock contract.
pub const ENV_PREFIX: &str = "REPRISE_MOCK_";

fn is_sentinel(line: &str) -> bool {
    line.trim_start()
        .strip_prefix("export ")
        .is_some_and(|rest| rest.trim_start().starts_with(ENV_PREFIX))
}

/// The marker is the closing quote of the mock executable path, so that only
/// the quoted invocation matches and not e.g. a comment mentioning the name.
fn marker() -> String {
    format!("{MOCK_EXECUTABLE_NAME}'")
}

/// Strip content that changes between runs without changing the computation.
///
/// Sentinel export lines are dropped, and for every line everything up to the
/// last occurrence of the marker is discarded, keeping only the command-line
/// arguments of the invocation.
pub fn strip_launch_script(content: &[u8]) -> Vec<u8> {
    let content = String::from_utf8_lossy(content);
    let marker = marker();

    content
        .lines()
        .filter(|line| !is_sentinel(line))
        .map(|line| match line.rfind(&marker) {
            Some(idx) => &line[idx + marker.len()..],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

/// Redirect a launch script to the real executable.
///
/// Sentinel exports are removed so they do not leak into the real run, and
/// the mock invocation is replaced by the quoted executable path followed by
/// the original arguments.
pub fn rewrite_launch_script(content: &str, executable: &Path) -> String {
    let marker = marker();
    let executable = shell_quote(&executable.to_string_lossy());

    let mut lines = Vec::new();
    for line in content.lines() {
        if is_sentinel(line) {
            continue;
        }
        match line.split_once(&marker) {
            Some((_, args)) => lines.push(format!("{executable} {args}")),
            None => lines.push(line.to_string()),
        }
    }

    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    rewritten
}

/// Single-quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
