#![cfg(unix)]

/// Acceptance tests for mocked codes
///
/// These tests drive the real `reprise-mock` binary from generated launch
/// scripts, the way a workflow engine does, using `diff` as the mocked code
/// and the fixture files in fixtures/diff/
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const LABEL: &str = "diff";

/// Lines of `diff file1.txt file2.txt` for the fixture files
const EXPECTED_DIFF: [&str; 5] = [
    "1,2c1",
    "< Lorem ipsum dolor..",
    "<",
    "---",
    "> Please report to the ministry of silly walks.",
];

fn reprise() -> Command {
    Command::new(std::env!("CARGO_BIN_EXE_reprise"))
}

fn mock_executable() -> PathBuf {
    PathBuf::from(std::env!("CARGO_BIN_EXE_reprise-mock"))
}

/// `diff` must be on PATH for the tests that run the real code
fn have_diff() -> bool {
    if which::which("diff").is_ok() {
        return true;
    }
    eprintln!("Skipping: diff not found in PATH");
    false
}

/// Helper to set up a test workspace
struct TestWorkspace {
    temp_dir: TempDir,
    fixtures_dir: PathBuf,
    sandboxes: usize,
}

impl TestWorkspace {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("data")).unwrap();
        let project_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

        Self {
            temp_dir,
            fixtures_dir: project_root.join("fixtures/diff"),
            sandboxes: 0,
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }

    /// Nonexistent config path, so no user configuration is picked up
    fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("reprise.toml")
    }

    /// Fresh sandbox holding the inputs and the engine's bookkeeping files
    fn sandbox(&mut self) -> PathBuf {
        self.sandboxes += 1;
        let dir = self
            .temp_dir
            .path()
            .join(format!("sandbox-{}", self.sandboxes));
        fs::create_dir_all(dir.join(".engine")).unwrap();

        for name in ["file1.txt", "file2.txt"] {
            fs::copy(self.fixtures_dir.join(name), dir.join(name)).unwrap();
        }
        // differs per sandbox, like the engine's own records
        fs::write(
            dir.join(".engine/calcinfo.json"),
            format!("{{\"uuid\": \"calc-{}\"}}", self.sandboxes),
        )
        .unwrap();

        dir
    }

    /// `reprise prepend` for the diff code with the given extra flags
    fn prepend(&self, sandbox: &Path, extra: &[&str]) -> Command {
        let mut cmd = reprise();
        cmd.current_dir(sandbox)
            .arg("prepend")
            .arg("--label")
            .arg(LABEL)
            .arg("--data-dir")
            .arg(self.data_dir())
            .arg("--mock-executable")
            .arg(mock_executable())
            .arg("-c")
            .arg(self.config_path())
            .args(extra)
            .args(["--", "file1.txt", "file2.txt"]);
        cmd
    }

    /// Write `_submit.sh` from `reprise prepend` output
    fn write_launch_script(&self, sandbox: &Path, extra: &[&str]) {
        let output = self.prepend(sandbox, extra).output().unwrap();
        assert!(
            output.status.success(),
            "prepend failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let stdout = String::from_utf8(output.stdout).unwrap();
        let script = format!("#!/bin/bash\n{} > 'diff.out'\n", stdout.trim_end());
        fs::write(sandbox.join("_submit.sh"), script).unwrap();
    }

    /// Run the launch script like the engine's scheduler would
    fn submit(&self, sandbox: &Path) -> assert_cmd::assert::Assert {
        Command::new("bash")
            .arg("_submit.sh")
            .current_dir(sandbox)
            .assert()
    }

    fn entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = fs::read_dir(self.data_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect();
        entries.sort();
        entries
    }
}

fn diff_lines(sandbox: &Path) -> Vec<String> {
    fs::read_to_string(sandbox.join("diff.out"))
        .unwrap()
        .lines()
        .map(|line| line.trim().to_string())
        .collect()
}

#[test]
fn test_prepend_prints_exports_and_launch_line() {
    let mut workspace = TestWorkspace::new();
    let sandbox = workspace.sandbox();

    workspace
        .prepend(&sandbox, &["--ignore-file", "_submit.sh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("export REPRISE_MOCK_LABEL=\"diff\""))
        .stdout(predicate::str::contains("export REPRISE_MOCK_REGENERATE_DATA=\"False\""))
        .stdout(predicate::str::contains(
            "export REPRISE_MOCK_IGNORE_FILES=\"_submit.sh\"",
        ))
        .stdout(predicate::str::contains("reprise-mock' 'file1.txt' 'file2.txt'"));
}

#[test]
fn test_prepend_rejects_missing_data_dir() {
    let mut workspace = TestWorkspace::new();
    let sandbox = workspace.sandbox();

    reprise()
        .current_dir(&sandbox)
        .args(["prepend", "--label", LABEL, "--data-dir"])
        .arg(workspace.temp_dir.path().join("nowhere"))
        .arg("--mock-executable")
        .arg(mock_executable())
        .arg("-c")
        .arg(workspace.config_path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("directory does not exist"));
}

#[test]
fn test_prepend_require_unknown_label() {
    let mut workspace = TestWorkspace::new();
    let sandbox = workspace.sandbox();

    workspace
        .prepend(&sandbox, &["--config-action", "require"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Configuration does not specify an executable for label 'diff'",
        ));
}

#[test]
fn test_prepend_generate_writes_config() {
    if !have_diff() {
        return;
    }
    let mut workspace = TestWorkspace::new();
    let sandbox = workspace.sandbox();

    workspace
        .prepend(&sandbox, &["--config-action", "generate"])
        .assert()
        .success();

    let written = fs::read_to_string(workspace.config_path()).unwrap();
    assert!(written.contains("[mock_code]"));
    assert!(written.contains("diff = "));

    // the generated file now satisfies `require`
    let other = workspace.sandbox();
    workspace
        .prepend(&other, &["--config-action", "require"])
        .assert()
        .success();
}

#[test]
fn test_miss_then_hit() {
    if !have_diff() {
        return;
    }
    let mut workspace = TestWorkspace::new();

    let first = workspace.sandbox();
    workspace.write_launch_script(&first, &[]);
    workspace.submit(&first).success();

    assert_eq!(diff_lines(&first), EXPECTED_DIFF);
    let entries = workspace.entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert!(entry.join("diff.out").is_file());
    assert!(entry.join("file1.txt").is_file());
    // launch script is excluded by default, bookkeeping is never captured
    assert!(!entry.join("_submit.sh").exists());
    assert!(!entry.join(".engine").exists());

    // mark the stored output so a replay is distinguishable from a rerun
    fs::write(entry.join("diff.out"), "replayed\n").unwrap();

    let second = workspace.sandbox();
    workspace.write_launch_script(&second, &[]);
    workspace.submit(&second).success();

    assert_eq!(diff_lines(&second), vec!["replayed"]);
    assert_eq!(workspace.entries().len(), 1);
}

#[test]
fn test_hit_without_executable() {
    if !have_diff() {
        return;
    }
    let mut workspace = TestWorkspace::new();

    let first = workspace.sandbox();
    workspace.write_launch_script(&first, &[]);
    workspace.submit(&first).success();

    // a code that is not installed is served from the store
    let second = workspace.sandbox();
    workspace.write_launch_script(&second, &["--executable-name", "reprise-missing-code"]);
    workspace.submit(&second).success();

    assert_eq!(diff_lines(&second), EXPECTED_DIFF);
}

#[test]
fn test_missing_executable_without_entry_fails() {
    let mut workspace = TestWorkspace::new();
    let sandbox = workspace.sandbox();

    workspace.write_launch_script(&sandbox, &["--executable-name", "reprise-missing-code"]);
    workspace
        .submit(&sandbox)
        .failure()
        .stderr(predicate::str::contains(
            "No existing output for 'diff', and no executable specified",
        ));

    assert!(workspace.entries().is_empty());
}

#[test]
fn test_regenerate_replaces_entry() {
    if !have_diff() {
        return;
    }
    let mut workspace = TestWorkspace::new();

    let first = workspace.sandbox();
    workspace.write_launch_script(&first, &[]);
    workspace.submit(&first).success();

    let entry = workspace.entries().remove(0);
    fs::write(entry.join("diff.out"), "stale\n").unwrap();

    // regeneration does not change the fingerprint, only bypasses the entry
    let second = workspace.sandbox();
    workspace.write_launch_script(&second, &["--regenerate"]);
    workspace.submit(&second).success();

    assert_eq!(diff_lines(&second), EXPECTED_DIFF);
    assert_eq!(workspace.entries(), vec![entry.clone()]);
    assert_eq!(
        fs::read_to_string(entry.join("diff.out")).unwrap(),
        fs::read_to_string(second.join("diff.out")).unwrap()
    );
}

#[test]
fn test_changed_input_is_a_new_entry() {
    if !have_diff() {
        return;
    }
    let mut workspace = TestWorkspace::new();

    let first = workspace.sandbox();
    workspace.write_launch_script(&first, &[]);
    workspace.submit(&first).success();

    let second = workspace.sandbox();
    fs::write(second.join("file2.txt"), "Something else entirely.\n").unwrap();
    workspace.write_launch_script(&second, &[]);
    workspace.submit(&second).success();

    assert_eq!(workspace.entries().len(), 2);
    assert!(diff_lines(&second).contains(&"> Something else entirely.".to_string()));
}

#[test]
fn test_fingerprint_matches_entry_name() {
    if !have_diff() {
        return;
    }
    let mut workspace = TestWorkspace::new();
    let sandbox = workspace.sandbox();
    workspace.write_launch_script(&sandbox, &[]);
    // the engine's redirection creates the output before the mock starts
    fs::write(sandbox.join("diff.out"), "").unwrap();

    let output = reprise().arg("fingerprint").arg(&sandbox).output().unwrap();
    assert!(output.status.success());
    let fingerprint = String::from_utf8(output.stdout).unwrap().trim().to_string();
    assert_eq!(fingerprint.len(), 64);

    workspace.submit(&sandbox).success();
    let entry = workspace.entries().remove(0);
    assert_eq!(
        entry.file_name().unwrap().to_string_lossy(),
        format!("mock-diff-{fingerprint}")
    );
}

#[test]
fn test_cache_commands() {
    if !have_diff() {
        return;
    }
    let mut workspace = TestWorkspace::new();
    let sandbox = workspace.sandbox();
    workspace.write_launch_script(&sandbox, &[]);
    workspace.submit(&sandbox).success();

    reprise()
        .arg("cache")
        .arg("--data-dir")
        .arg(workspace.data_dir())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored entries (1 entries):"))
        .stdout(predicate::str::contains("  diff "));

    reprise()
        .env("REPRISE_DATA_DIR", workspace.data_dir())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total entries: 1"))
        .stdout(predicate::str::contains("Total files: 3"));

    reprise()
        .env("REPRISE_DATA_DIR", workspace.data_dir())
        .args(["cache", "clean"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Specify --all"));

    reprise()
        .env("REPRISE_DATA_DIR", workspace.data_dir())
        .args(["cache", "clean", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 entries."));

    reprise()
        .env("REPRISE_DATA_DIR", workspace.data_dir())
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored entries."));
}
