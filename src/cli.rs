use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigAction;

/// Reprise - content-addressed execution cache for workflow test suites
///
/// Reprise replays stored outputs of external programs and snapshots of
/// provenance graphs so that test suites run without the real codes.
#[derive(Parser, Debug)]
#[command(name = "reprise")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Content-addressed execution cache for workflow test suites", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the fingerprint of a sandbox directory
    Fingerprint(FingerprintArgs),

    /// Manage stored sandbox outputs
    Cache(CacheArgs),

    /// Print launch script exports for a mocked code
    Prepend(PrependArgs),

    /// Inspect provenance snapshot archives
    Archive(ArchiveArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct FingerprintArgs {
    /// Sandbox directory
    pub dir: PathBuf,

    /// Launch script name
    #[arg(long, default_value = "_submit.sh")]
    pub launch_script: String,

    /// Bookkeeping directory name
    #[arg(long, default_value = ".engine")]
    pub bookkeeping_dir: String,
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,

    /// Data directory of the store
    #[arg(long, env = "REPRISE_DATA_DIR")]
    pub data_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List stored entries
    List {
        /// Only entries of this label
        #[arg(long)]
        label: Option<String>,
    },

    /// Show store statistics
    Stats,

    /// Remove one entry
    Remove {
        label: String,
        fingerprint: String,
    },

    /// Remove entries of a label, or all entries
    Clean {
        /// Label to clean (omit with --all)
        #[arg(long)]
        label: Option<String>,

        /// Clean every entry
        #[arg(long)]
        all: bool,
    },
}

#[derive(Parser, Debug)]
pub struct PrependArgs {
    /// Cache label of the mocked code
    #[arg(long)]
    pub label: String,

    /// Data directory of the store (must exist, absolute)
    #[arg(long, env = "REPRISE_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Executable name looked up on PATH (defaults to the label)
    #[arg(long)]
    pub executable_name: Option<String>,

    /// File-name glob excluded from capture (repeatable)
    #[arg(long = "ignore-file")]
    pub ignore_files: Vec<String>,

    /// Relative-path glob excluded from capture (repeatable)
    #[arg(long = "ignore-path")]
    pub ignore_paths: Vec<String>,

    /// Discard matching entries and run again
    #[arg(long, env = "REPRISE_REGENERATE_DATA")]
    pub regenerate: bool,

    /// How to treat the configuration file
    #[arg(long, value_enum, default_value_t = ConfigAction::Read)]
    pub config_action: ConfigAction,

    /// Config file path
    #[arg(short = 'c', long, env = "REPRISE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path of reprise-mock (defaults to PATH lookup)
    #[arg(long)]
    pub mock_executable: Option<PathBuf>,

    /// Arguments of the invocation; prints the launch line too when given
    #[arg(last = true)]
    pub args: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ArchiveArgs {
    #[command(subcommand)]
    pub command: ArchiveCommands,
}

#[derive(Subcommand, Debug)]
pub enum ArchiveCommands {
    /// List archives in the snapshot directory
    List {
        /// Snapshot directory (defaults to graph.archive_dir of the config)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Config file path
        #[arg(short = 'c', long, env = "REPRISE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Show the metadata and contents of an archive
    Inspect {
        /// Archive file
        path: PathBuf,
    },
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show {
        /// Config file path
        #[arg(short = 'c', long, env = "REPRISE_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the path of the discovered config file
    Path,
    /// Write an example reprise.toml to the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prepend() {
        let cli = Cli::try_parse_from([
            "reprise",
            "prepend",
            "--label",
            "diff",
            "--data-dir",
            "/tmp/data",
            "--ignore-file",
            "_submit.sh",
            "--ignore-file",
            "file*",
            "--config-action",
            "require",
            "--",
            "file1.txt",
            "file2.txt",
        ])
        .unwrap();

        let Commands::Prepend(args) = cli.command else {
            panic!("expected prepend");
        };
        assert_eq!(args.ignore_files, vec!["_submit.sh", "file*"]);
        assert_eq!(args.config_action, ConfigAction::Require);
        assert_eq!(args.args, vec!["file1.txt", "file2.txt"]);
    }

    #[test]
    fn test_parse_cache_clean() {
        let cli = Cli::try_parse_from(["reprise", "cache", "--data-dir", "/d", "clean", "--all"])
            .unwrap();
        let Commands::Cache(args) = cli.command else {
            panic!("expected cache");
        };
        assert!(matches!(args.command, CacheCommands::Clean { all: true, .. }));
    }

    #[test]
    fn test_parse_archive_list() {
        let cli = Cli::try_parse_from(["reprise", "archive", "list", "--dir", "/snapshots"]).unwrap();
        let Commands::Archive(args) = cli.command else {
            panic!("expected archive");
        };
        match args.command {
            ArchiveCommands::List { dir, .. } => {
                assert_eq!(dir, Some(PathBuf::from("/snapshots")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
