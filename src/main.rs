//! # backup-sync
//!
//! Copies Home Assistant backup archives from the backup directory to a USB
//! drive and keeps only the newest copies there.
//!
//! Usage:
//!     backup-sync [--config PATH] [--log-format pretty|json|compact] <command>

mod cli;

use anyhow::{bail, Context, Result};
use backup_service::{run_daemon, BackupDependencies, BackupService};
use bridge_traits::{volume::format_bytes, Notification, NotificationSink, VolumeManager};
use clap::Parser;
use cli::{
    BackupCommand, CleanupArgs, Cli, Command, ConfigCommand, DisksCommand, NotifyCommand,
    StorageCommand,
};
use core_runtime::{
    logging::{init_logging, LoggingConfig},
    BackupConfig,
};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = BackupConfig::load(&cli.config)
        .with_context(|| format!("Failed to load options from {}", cli.config.display()))?;

    let mut logging = LoggingConfig::default().with_optional_level(config.logging_level());
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format.into());
    }
    init_logging(logging).context("Failed to initialize logging")?;

    let command = cli.command.unwrap_or(Command::Run);
    if let Command::Config(sub) = &command {
        return config_command(sub, &config);
    }

    config.validate().context("Invalid configuration")?;
    let deps = BackupDependencies::desktop(&config).context("Failed to set up host adapters")?;
    let service = BackupService::new(config, deps);

    match command {
        Command::Run => run(&service).await,
        Command::Sync => sync(&service).await,
        Command::Cleanup(args) => cleanup(&service, &args).await,
        Command::Status => status(&service).await,
        Command::Backup(BackupCommand::List { json }) => backup_list(&service, json).await,
        Command::Backup(BackupCommand::Copy { file, force }) => {
            backup_copy(&service, &file, force).await
        }
        Command::Storage(StorageCommand::Info { path }) => {
            storage_info(&service, path.as_deref()).await
        }
        Command::Disks(DisksCommand::List { usb_only }) => disks(&service, usb_only).await,
        Command::Disks(DisksCommand::Mount {
            device,
            mount_point,
        }) => {
            let result = service
                .mount_device(&device, mount_point.as_deref())
                .await?;
            println!("Mounted {} at {}", device, result.mount_point.display());
            Ok(())
        }
        Command::Disks(DisksCommand::Unmount { device }) => {
            service.unmount_device(&device).await?;
            println!("Unmounted {}", device);
            Ok(())
        }
        Command::Notify(NotifyCommand::Test) => notify_test(&service).await,
        Command::Config(_) => Ok(()),
    }
}

async fn run(service: &BackupService) -> Result<()> {
    let config = service.config();
    info!(
        source = %config.source_dir.display(),
        mount_point = %config.mount_point.display(),
        device = %config.usb_device,
        max_copies = config.max_copies,
        "Starting backup sync"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    run_daemon(service, shutdown)
        .await
        .context("Backup sync stopped with an error")
}

async fn sync(service: &BackupService) -> Result<()> {
    service.prepare_destination().await?;
    service.validate_storage().await?;

    let synced = service.coordinator().sync_existing().await?;
    if synced.is_empty() {
        println!("Nothing to sync");
    }
    for name in synced {
        println!("{}", name);
    }
    Ok(())
}

async fn cleanup(service: &BackupService, args: &CleanupArgs) -> Result<()> {
    service.prepare_destination().await?;
    let coordinator = service.coordinator();

    if args.dry_run {
        let plan = coordinator.destination_info().await?.plan;
        return print_json(&plan);
    }

    let report = if args.force {
        coordinator.force_cleanup().await?
    } else {
        coordinator.retention().apply(false).await?
    };
    print_json(&report)
}

async fn status(service: &BackupService) -> Result<()> {
    let info = service.coordinator().destination_info().await?;
    print_json(&info)
}

async fn backup_list(service: &BackupService, json: bool) -> Result<()> {
    let listing = service.list_backups().await?;
    if json {
        return print_json(&listing);
    }

    let config = service.config();
    println!("Source backups ({}):", config.source_dir.display());
    if listing.source.is_empty() {
        println!("  No backups found");
    }
    for artifact in &listing.source {
        println!("  {:<40} {:>10}", artifact.name, format_bytes(artifact.size));
    }

    println!();
    println!("Destination backups ({}):", config.mount_point.display());
    if listing.destination.artifacts.is_empty() {
        println!("  No backups found");
    }
    for artifact in &listing.destination.artifacts {
        println!("  {:<40} {:>10}", artifact.name, format_bytes(artifact.size));
    }
    Ok(())
}

async fn backup_copy(service: &BackupService, file: &str, force: bool) -> Result<()> {
    service.prepare_destination().await?;
    service.validate_storage().await?;

    let run = service.copy_backup(file, force).await?;
    if !run.succeeded() {
        bail!(
            "Failed to copy {}: {}",
            file,
            run.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("Copied {}", file);
    Ok(())
}

async fn storage_info(service: &BackupService, path: Option<&Path>) -> Result<()> {
    let report = service.inspect_storage(path).await?;
    let yes_no = |flag: bool| if flag { "Yes" } else { "No" };

    println!("Storage information for {}:", report.path.display());
    println!("  Total: {}", format_bytes(report.info.total_bytes));
    println!("  Used: {}", format_bytes(report.info.used_bytes));
    println!(
        "  Free: {} ({:.1}%)",
        format_bytes(report.info.free_bytes),
        report.free_percent
    );
    println!("  Mount point: {}", yes_no(report.is_mount_point));
    println!("  Writable: {}", yes_no(report.writable));
    for warning in &report.warnings {
        println!("  Warning: {}", warning);
    }
    Ok(())
}

async fn disks(service: &BackupService, usb_only: bool) -> Result<()> {
    let devices = if usb_only {
        service.list_usb_candidates().await?
    } else {
        service.dependencies().volumes.list_devices().await?
    };

    if devices.is_empty() {
        println!("No devices found");
        return Ok(());
    }

    for device in devices {
        println!(
            "{:<12} {:>10}  {:<6} {:<8} {:<5} {}",
            device.name,
            device.display_size(),
            device.device_type,
            device.fstype.as_deref().unwrap_or("-"),
            if device.is_usb { "usb" } else { "-" },
            device
                .mount_point
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not mounted".to_string())
        );
    }
    Ok(())
}

async fn notify_test(service: &BackupService) -> Result<()> {
    let notifier = service.dependencies().notifier.clone();

    let connected = notifier.test_connection().await.unwrap_or_else(|e| {
        warn!(error = %e, "Connection test failed");
        false
    });
    println!("Connection: {}", if connected { "ok" } else { "unavailable" });

    notifier
        .send(Notification::info(
            "Backup Sync Test",
            "Test notification from backup-sync.",
        ))
        .await
        .context("Failed to send test notification")?;
    println!("Test notification sent");
    Ok(())
}

fn config_command(command: &ConfigCommand, config: &BackupConfig) -> Result<()> {
    match command {
        ConfigCommand::Show => print_json(config),
        ConfigCommand::Validate => match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
                Ok(())
            }
            Err(e) => bail!("Configuration is invalid: {}", e),
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
