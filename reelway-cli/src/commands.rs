//! CLI command implementations

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Subcommand;
use reelway_core::ReelwayConfig;
use reelway_core::session::{FileBinding, SessionState, StreamBinder};
use reelway_core::spawn_session_manager;
use reelway_resolve::{ContentReference, MirrorResolver, ResolveError};
use reelway_sim::{LocalFileEngine, magnet_for_file};
use reelway_web::{PlaybackCoordinator, RangeServer};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a mirror page into a playable URL or magnet link
    Resolve {
        /// Page believed to host the video
        url: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the first magnet link found on a page
    Magnet {
        /// Page to search
        url: String,
    },
    /// Serve a complete local file over the range server
    Serve {
        /// Media file to serve
        file: PathBuf,
        /// Port to bind on 127.0.0.1
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Stream a local file through the simulated download engine
    Simulate {
        /// Media file to "download"
        file: PathBuf,
        /// Simulated download rate in bytes per second
        #[arg(short, long)]
        rate: Option<u64>,
        /// Port to bind on 127.0.0.1
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the failure of the command, with a user-facing message for
/// resolution errors
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    let config = ReelwayConfig::from_env();
    match command {
        Commands::Resolve { url, json } => resolve(&config, url, json).await,
        Commands::Magnet { url } => magnet(&config, url).await,
        Commands::Serve { file, port } => serve(config, file, port).await,
        Commands::Simulate { file, rate, port } => simulate(config, file, rate, port).await,
    }
}

/// Resolve a page and print the stream.
///
/// # Errors
/// - `ResolveError` - The page could not be resolved
pub async fn resolve(config: &ReelwayConfig, url: String, json: bool) -> anyhow::Result<()> {
    let resolver = MirrorResolver::from_config(&config.resolver)?;
    let stream = resolver
        .resolve(&ContentReference::new(url))
        .await
        .map_err(explain)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stream)?);
    } else {
        println!("{:?}: {}", stream.kind, stream.url);
    }
    Ok(())
}

/// Print the magnet link on a page.
///
/// # Errors
/// - `ResolveError` - The page could not be fetched or has no magnet
pub async fn magnet(config: &ReelwayConfig, url: String) -> anyhow::Result<()> {
    let resolver = MirrorResolver::from_config(&config.resolver)?;
    let magnet = resolver
        .extract_magnet(&ContentReference::new(url))
        .await
        .map_err(explain)?;
    println!("{magnet}");
    Ok(())
}

/// Serve a complete file until Ctrl-C.
///
/// # Errors
/// - `std::io::Error` - The file is unreadable or the port is taken
pub async fn serve(
    mut config: ReelwayConfig,
    file: PathBuf,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let total_size = tokio::fs::metadata(&file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?
        .len();
    if let Some(port) = port {
        config.server.port = port;
    }

    let server = RangeServer::new(config.server);
    server.bind(FileBinding::complete(file.clone(), total_size));
    let running = server.spawn().await?;

    println!("Serving {} at {}", file.display(), running.url());
    println!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    running.shutdown().await?;
    Ok(())
}

/// Run the full pipeline against the simulated engine until Ctrl-C.
///
/// # Errors
/// - `std::io::Error` - The file is unreadable or the port is taken
/// - `PlaybackError` - The simulated session failed before becoming playable
pub async fn simulate(
    mut config: ReelwayConfig,
    file: PathBuf,
    rate: Option<u64>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(rate) = rate {
        config.simulation.bytes_per_second = rate;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let magnet =
        magnet_for_file(&file).with_context(|| format!("cannot read {}", file.display()))?;
    let server = RangeServer::new(config.server.clone());
    let running = server.spawn().await?;
    let engine = LocalFileEngine::new(file, config.simulation.clone());
    let sessions = spawn_session_manager(config.session.clone(), engine, server);

    let coordinator = PlaybackCoordinator::new(
        MirrorResolver::from_config(&config.resolver)?,
        sessions.clone(),
        running.url(),
        config.readiness.clone(),
    );

    info!("Simulating {}", magnet);
    let target = tokio::select! {
        target = coordinator.prepare_magnet(&magnet) => target,
        _ = tokio::signal::ctrl_c() => {
            sessions.shutdown().await?;
            running.shutdown().await?;
            return Ok(());
        }
    };
    let target = match target {
        Ok(target) => target,
        Err(e) => {
            sessions.shutdown().await?;
            running.shutdown().await?;
            bail!(e.user_message());
        }
    };

    println!("Ready to play: {}", target.url());
    println!("Press Ctrl+C to stop and remove downloaded files");

    let mut updates = sessions.subscribe();
    let mut last_reported = -1.0f32;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(session) = updates.borrow_and_update().clone() else {
                    continue;
                };
                if session.progress_percent - last_reported >= 5.0
                    || (session.progress_percent >= 100.0 && last_reported < 100.0)
                {
                    last_reported = session.progress_percent;
                    println!(
                        "{:5.1}% {:>10} B/s {} bytes playable",
                        session.progress_percent,
                        session.download_rate_bps,
                        session.contiguous_available_bytes()
                    );
                }
                if session.state == SessionState::Error {
                    println!("Download failed: {}", session.last_error.unwrap_or_default());
                    break;
                }
            }
        }
    }

    sessions.shutdown().await?;
    running.shutdown().await?;
    println!("Stopped");
    Ok(())
}

fn explain(error: ResolveError) -> anyhow::Error {
    anyhow::anyhow!("{} ({})", error.user_message(), error)
}
