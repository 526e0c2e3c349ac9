mod error;
mod logging;
mod progress;
mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};
use patchvm_core::{ReqwestTransport, VersionManager};
use patchvm_platform::AppPaths;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::progress::TerminalContext;
use crate::settings::Settings;

/// Exit status after Ctrl-C, as a shell reports it.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "patchvm",
    version,
    about = "Check for and download application patches"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file, instead of settings.json in the config directory.
    #[arg(long, global = true, env = "PATCHVM_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the repository server.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Version currently installed, compared against the latest one.
    #[arg(long, global = true)]
    current_version: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether a newer version is published.
    Check,
    /// Download the patch of the latest published version.
    Download {
        /// Destination file. Defaults to the patches directory, one
        /// subdirectory per version.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    match run(cli, cancel).await {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(error) if error.is_cancelled() => {
            eprintln!("Cancelled");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Cancellation requested");
        cancel.cancel();
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<String, AppError> {
    let paths = AppPaths::new()?;
    let settings_path = cli.config.unwrap_or_else(|| paths.settings_file());
    let mut settings = Settings::load(&settings_path)?;
    logging::init_logging(
        &paths,
        cli.verbose || settings.debug_logging,
        settings.max_log_size_bytes,
    );

    if let Some(endpoint) = cli.endpoint {
        settings.endpoint = endpoint;
    }
    if let Some(version) = cli.current_version {
        settings.current_version = Some(version);
    }

    let transport = ReqwestTransport::new(settings.transport_options())?;
    let manager = VersionManager::new(
        settings.endpoint.clone(),
        Arc::new(settings.connection.clone()),
        Arc::new(transport),
    );
    let context = TerminalContext::new(cancel.clone());

    let result = match cli.command {
        Command::Check => {
            let current = settings
                .current_version
                .clone()
                .ok_or(AppError::MissingCurrentVersion {
                    settings: settings_path,
                })?;
            check(&manager, current, &context, &cancel).await
        }
        Command::Download { output } => {
            download(&manager, &settings, &paths, output, &context, &cancel).await
        }
    };

    match &result {
        Ok(_) => context.finish(),
        Err(_) => context.abandon(),
    }
    result
}

async fn check(
    manager: &VersionManager,
    current: String,
    context: &TerminalContext,
    cancel: &CancellationToken,
) -> Result<String, AppError> {
    let update = cancel
        .run_until_cancelled(manager.check(&current, context))
        .await
        .unwrap_or(Err(patchvm_core::Error::Cancelled))?;

    Ok(match update {
        Some(latest) => format!("Version {latest} is available (current: {current})"),
        None => format!("Version {current} is up to date"),
    })
}

async fn download(
    manager: &VersionManager,
    settings: &Settings,
    paths: &AppPaths,
    output: Option<PathBuf>,
    context: &TerminalContext,
    cancel: &CancellationToken,
) -> Result<String, AppError> {
    let file_name = &settings.connection.patch_file_name;
    let target = output
        .clone()
        .unwrap_or_else(|| paths.patches_dir().join(format!("{file_name}.part")));
    create_parent(&target).await?;

    let mut file = tokio::fs::File::create(&target)
        .await
        .map_err(|source| AppError::Output {
            path: target.clone(),
            source,
        })?;
    let application = settings.current_version.clone().unwrap_or_default();
    let outcome = cancel
        .run_until_cancelled(manager.store(&application, &mut file, context))
        .await
        .unwrap_or(Err(patchvm_core::Error::Cancelled));
    drop(file);

    let summary = match outcome {
        Ok(summary) => summary,
        Err(error) => {
            discard(&target).await;
            return Err(error.into());
        }
    };

    let destination = match output {
        Some(path) => path,
        None => {
            let destination = paths.patch_file(&summary.version, file_name);
            if let Err(error) = move_into_place(&target, &destination).await {
                discard(&target).await;
                return Err(error);
            }
            destination
        }
    };

    Ok(format!(
        "Downloaded version {} ({} bytes) to {}",
        summary.version,
        summary.bytes,
        destination.display()
    ))
}

async fn create_parent(path: &Path) -> Result<(), AppError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| AppError::Output {
                path: parent.to_path_buf(),
                source,
            }),
        _ => Ok(()),
    }
}

async fn move_into_place(from: &Path, to: &Path) -> Result<(), AppError> {
    create_parent(to).await?;
    tokio::fs::rename(from, to)
        .await
        .map_err(|source| AppError::Output {
            path: to.to_path_buf(),
            source,
        })
}

async fn discard(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        log::warn!("Could not remove partial download {}: {error}", path.display());
    }
}
