//! curvefs-csi command-line entry point

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use curvefs_csi::cli::{Cli, Command, USAGE};
use curvefs_csi::config::DriverConfig;
use curvefs_csi::exec::{CommandRunner, SystemRunner};
use curvefs_csi::mount::FuseMounter;
use curvefs_csi::tool::FsTool;

/// Default location of the driver configuration
const DEFAULT_CONFIG_PATH: &str = "/etc/curvefs-csi/config.yaml";

#[tokio::main]
async fn main() {
    let cli = match Cli::parse(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!();
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    // An explicit --config must exist; the default location is optional.
    let config = match &cli.config_path {
        Some(path) => DriverConfig::from_file(path),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                DriverConfig::from_file(&default)
            } else {
                Ok(DriverConfig::default())
            }
        }
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

    let result = match cli.command {
        Command::CreateFs {
            volume_id,
            capacity_bytes,
            params,
        } => {
            FsTool::new(config.tool.clone(), runner)
                .create_fs(&volume_id, capacity_bytes, &params)
                .await
        }
        Command::DeleteFs { volume_id, params } => {
            FsTool::new(config.tool.clone(), runner)
                .delete_fs(&volume_id, &params)
                .await
        }
        Command::Mount {
            fsname,
            mount_path,
            mount_uuid,
            params,
            mount_flags,
        } => {
            FuseMounter::new(config.client.clone(), runner)
                .mount_fs(
                    &fsname,
                    &mount_path,
                    &params,
                    mount_flags.as_deref(),
                    &mount_uuid,
                )
                .await
        }
        Command::Umount {
            target_path,
            mount_uuid,
        } => {
            let mounter = FuseMounter::new(config.client.clone(), runner);
            match mounter.umount_fs(&target_path, &mount_uuid).await {
                // The process exits right after, so finish cleanup first.
                Ok(cleanup) => {
                    cleanup.wait().await;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(()) => info!("Done"),
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}
