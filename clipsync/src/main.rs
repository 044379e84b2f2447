use std::process;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use clipsync::cli::{Cli, Commands, PublishCommand};
use clipsync::collaborators::{FfmpegTransformer, YtDlpDownloader};
use clipsync::config::Config;
use clipsync::drivers;
use clipsync::inventory::InventoryStore;
use clipsync::utils::fs::ensure_dir_all_sync;
use clipsync::{Error, Result};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    if let Err(e) = run(args).await {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let _log_guard = init_logging(&config, args.verbose, args.quiet)?;

    let store = InventoryStore::from_config(&config);

    match args.command {
        Commands::Discover { source_url } => {
            let downloader = YtDlpDownloader::new(&config);
            drivers::discover::run(&store, &downloader, &config, &source_url).await?;
        }
        Commands::Transform => {
            let engine = FfmpegTransformer::new(&config);
            drivers::transform::run(&store, &engine, &config).await?;
        }
        Commands::Publish(command) => match command {
            PublishCommand::GetNext => {
                if let Some(record) = drivers::publish::get_next(&store).await? {
                    // The only machine-readable line this command emits.
                    if let Some(path) = record.local_path_processed {
                        println!("{path}");
                    }
                }
            }
            PublishCommand::MarkPosted { video_id } => {
                drivers::publish::mark_posted(&store, &video_id).await?;
            }
            PublishCommand::MarkFailed { video_id, reason } => {
                drivers::publish::mark_failed(&store, &video_id, reason.as_deref()).await?;
            }
        },
    }
    Ok(())
}

/// Initialize tracing: human diagnostics on stderr plus a non-blocking
/// file sink under the configured log directory. stdout stays reserved
/// for machine-readable command output.
fn init_logging(
    config: &Config,
    verbose: bool,
    quiet: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    ensure_dir_all_sync(&config.log_dir)?;

    let default_directive = if verbose {
        "clipsync=debug"
    } else if quiet {
        "clipsync=warn"
    } else {
        "clipsync=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let file_appender = tracing_appender::rolling::never(&config.log_dir, "clipsync.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| Error::Other(format!("failed to initialize logging: {e}")))?;

    Ok(guard)
}
