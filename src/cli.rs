//! Command-line definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use core_runtime::{logging::LogFormat, DEFAULT_OPTIONS_PATH};
use std::path::PathBuf;

/// Copy Home Assistant backups to a USB drive and keep the newest N
#[derive(Parser, Debug)]
#[command(name = "backup-sync", version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON options file
    #[arg(long, global = true, env = "BACKUP_SYNC_CONFIG", default_value = DEFAULT_OPTIONS_PATH)]
    pub config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mount the destination, sync existing backups and watch for new ones (default)
    Run,

    /// Copy every source backup missing from the destination, then exit
    Sync,

    /// Apply the retention cap to the destination
    Cleanup(CleanupArgs),

    /// Print destination statistics and the retention plan as JSON
    Status,

    /// Inspect the options file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Backup files in the source and destination
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Destination volume usage
    #[command(subcommand)]
    Storage(StorageCommand),

    /// Block device discovery and mounting
    #[command(subcommand)]
    Disks(DisksCommand),

    /// Notification delivery
    #[command(subcommand)]
    Notify(NotifyCommand),
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Allow deleting every backup when max_copies is 0
    #[arg(long)]
    pub force: bool,

    /// Print what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective options as JSON
    Show,
    /// Check the options and report the first problem
    Validate,
}

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// List backups on both sides, oldest first
    List {
        /// Print the listing as JSON
        #[arg(long, short)]
        json: bool,
    },
    /// Copy one source backup to the destination, then apply retention
    Copy {
        /// File name inside the source directory
        file: String,
        /// Copy even if the destination already has this backup
        #[arg(long, short)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum StorageCommand {
    /// Show capacity, free space and writability
    Info {
        /// Directory to inspect (defaults to the mount point)
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DisksCommand {
    /// List block devices
    List {
        /// Only show USB devices that could hold backups
        #[arg(long)]
        usb_only: bool,
    },
    /// Mount a device (e.g. sdb1)
    Mount {
        device: String,
        /// Where to mount it (defaults to the configured mount point)
        #[arg(long, short)]
        mount_point: Option<PathBuf>,
    },
    /// Unmount a device
    Unmount { device: String },
}

#[derive(Subcommand, Debug)]
pub enum NotifyCommand {
    /// Check the notification service and send a test message
    Test,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Compact => LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["backup-sync"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cleanup_flags() {
        let cli = Cli::try_parse_from([
            "backup-sync",
            "--config",
            "/tmp/options.json",
            "cleanup",
            "--force",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/tmp/options.json"));
        match cli.command {
            Some(Command::Cleanup(args)) => {
                assert!(args.force);
                assert!(args.dry_run);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_nested_subcommands() {
        let cli = Cli::try_parse_from(["backup-sync", "disks", "list", "--usb-only"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Disks(DisksCommand::List { usb_only: true }))
        ));

        let cli =
            Cli::try_parse_from(["backup-sync", "--log-format", "json", "config", "show"]).unwrap();
        assert_eq!(cli.log_format, Some(LogFormatArg::Json));
        assert!(matches!(cli.command, Some(Command::Config(ConfigCommand::Show))));
    }

    #[test]
    fn test_backup_storage_and_mount_commands() {
        let cli = Cli::try_parse_from(["backup-sync", "backup", "copy", "a.tar", "-f"]).unwrap();
        match cli.command {
            Some(Command::Backup(BackupCommand::Copy { file, force })) => {
                assert_eq!(file, "a.tar");
                assert!(force);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let cli = Cli::try_parse_from(["backup-sync", "backup", "list", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Backup(BackupCommand::List { json: true }))
        ));

        let cli = Cli::try_parse_from(["backup-sync", "storage", "info"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Storage(StorageCommand::Info { path: None }))
        ));

        let args = ["backup-sync", "disks", "mount", "sdb1", "-m", "/mnt/usb"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Some(Command::Disks(DisksCommand::Mount {
                device,
                mount_point,
            })) => {
                assert_eq!(device, "sdb1");
                assert_eq!(mount_point, Some(PathBuf::from("/mnt/usb")));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let cli = Cli::try_parse_from(["backup-sync", "disks", "unmount", "sdb1"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Disks(DisksCommand::Unmount { .. }))
        ));
    }
}
