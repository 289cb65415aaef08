//! Kapitel CLI entry point.

use anyhow::Result;
use clap::Parser;
use kapitel::cli::{commands, Cli, Commands};
use kapitel::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("kapitel={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Ensure data directories exist
    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;

    // Execute command
    match &cli.command {
        Commands::Init => {
            commands::run_init(&settings)?;
        }

        Commands::Process { file, title, user } => {
            commands::run_process(file, title.clone(), user, settings).await?;
        }

        Commands::Search {
            query,
            video,
            limit,
            min_score,
            enhanced,
            user,
        } => {
            commands::run_search(
                query,
                video.clone(),
                *limit,
                *min_score,
                *enhanced,
                user,
                settings,
            )
            .await?;
        }

        Commands::Status { video_id } => {
            commands::run_status(video_id, settings).await?;
        }
    }

    Ok(())
}
