mod render;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use hotpatch_core::{InstallMode, PackageMetadata};
use hotpatch_runtime::{HostConfig, InstallOutcome, PendingState, UpdateSession};

use crate::render::{
    current_output_style, download_progress_bar, format_bytes, print_status, render_warning_line,
    OutputStyle,
};

#[derive(Parser, Debug)]
#[command(name = "hotpatch")]
#[command(about = "Crash-safe over-the-air update client", long_about = None)]
struct Cli {
    /// Host configuration file.
    #[arg(long, default_value = "hotpatch.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the installation root's update state.
    Status,
    /// Download and assemble the update a publisher metadata document describes.
    Download {
        /// Path to the update metadata JSON document.
        update: PathBuf,
    },
    /// Activate a downloaded update.
    Install {
        /// Path to the update metadata JSON document.
        update: PathBuf,
        #[arg(long, default_value = "on-next-restart")]
        mode: String,
        /// Minimum background time before an on-next-resume install restarts the host.
        #[arg(long, default_value_t = 0)]
        min_background_secs: u64,
    },
    /// Confirm that the pending update booted successfully.
    Confirm,
    /// Remove every stored update and fall back to the binary version.
    Clear,
    /// Generate a shell completion script on stdout.
    Completions { shell: Shell },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let style = current_output_style();

    let command = match cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "hotpatch",
                &mut std::io::stdout(),
            );
            return Ok(());
        }
        command => command,
    };

    let config = HostConfig::load(&cli.config)?;
    let mut session = UpdateSession::boot(config)?;

    match command {
        Commands::Status => {
            run_status(&mut session, style)?;
        }
        Commands::Download { update } => {
            let metadata = read_update_document(&update)?;
            let bar = download_progress_bar(style);
            let mut received_total = 0_u64;
            let installed = session.download_update(metadata, |total, received| {
                if let Some(total) = total {
                    bar.set_length(total);
                }
                bar.set_position(received);
                received_total = received;
            })?;
            bar.finish_and_clear();

            let hash = installed.package_hash().unwrap_or("<unknown>");
            print_status(
                style,
                "downloaded",
                &format!("{hash} ({})", format_bytes(received_total)),
            );
            if let Some(bundle_path) = installed.bundle_path() {
                print_status(style, "bundle", bundle_path);
            }
        }
        Commands::Install {
            update,
            mode,
            min_background_secs,
        } => {
            let metadata = read_update_document(&update)?;
            let mode = InstallMode::parse(&mode)
                .ok_or_else(|| anyhow!("unknown install mode: {mode}"))?;
            let outcome = session.install_update(
                &metadata,
                mode,
                Duration::from_secs(min_background_secs),
            )?;

            let hash = metadata.package_hash().unwrap_or("<unknown>");
            match outcome {
                InstallOutcome::RestartNow => {
                    print_status(style, "installed", &format!("{hash}, restart the host now"));
                }
                InstallOutcome::Deferred => {
                    print_status(
                        style,
                        "installed",
                        &format!("{hash}, applies {}", mode.as_str()),
                    );
                }
            }
        }
        Commands::Confirm => {
            session.confirm_ready()?;
            print_status(style, "confirmed", "pending update marked healthy");
        }
        Commands::Clear => {
            session.clear_all_updates()?;
            print_status(style, "cleared", "all stored updates removed");
        }
        Commands::Completions { .. } => unreachable!("handled before the session boots"),
    }

    Ok(())
}

fn run_status(session: &mut UpdateSession, style: OutputStyle) -> Result<()> {
    let entry = session.resolve_entry_point()?;
    print_status(style, "entry", &entry.display().to_string());

    match session.store().current_package_hash() {
        Some(hash) => print_status(style, "current", &hash),
        None => print_status(style, "current", "(binary version)"),
    }
    if let Some(hash) = session.store().previous_package_hash() {
        print_status(style, "previous", &hash);
    }

    match session.pending_state() {
        PendingState::Clean => print_status(style, "pending", "none"),
        PendingState::Ready(hash) => {
            print_status(style, "pending", &format!("{hash} (awaiting first run)"));
        }
        PendingState::Loading(hash) => {
            print_status(style, "pending", &format!("{hash} (first run in flight)"));
        }
    }

    if let Some(report) = session.take_rollback_report() {
        let hash = report.package_hash().unwrap_or("<unknown>");
        println!(
            "{}",
            render_warning_line(style, &format!("last boot rolled back {hash}"))
        );
    }

    Ok(())
}

fn read_update_document(path: &Path) -> Result<PackageMetadata> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read update document: {}", path.display()))?;
    PackageMetadata::from_json_str(&raw)
        .with_context(|| format!("failed parsing update document: {}", path.display()))
}
