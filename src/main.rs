//! campcounselor — a personal Bandcamp collection and wishlist tracker.
//!
//! Albums live in a local SQLite library. A background sync walks a fan's
//! collection and wishlist through Bandcamp's private collection API,
//! merges the results so purchases always win over wishlist entries, and
//! reports progress through a pollable task status.

#![warn(clippy::all)]

mod bandcamp;
mod cli;
mod config;
mod library;
mod retry;
mod server;
mod shutdown;
mod sync;
mod types;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bandcamp::{BandcampClient, PaginatedFetcher};
use cli::Command;
use config::Config;
use library::{AlbumStore, SqliteLibrary, SyncConfigStore};
use sync::{MemoryTaskStatusStore, SyncDeps, SyncService, TaskState};
use types::AlbumFilter;

/// How often a foreground sync checks its task status.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Long-lived services shared by the subcommands.
struct App {
    library: Arc<SqliteLibrary>,
    client: Arc<BandcampClient>,
    sync: Arc<SyncService>,
}

impl App {
    async fn build(config: &Config) -> anyhow::Result<Self> {
        let library = Arc::new(SqliteLibrary::open(&config.db_path).await?);
        let client = Arc::new(BandcampClient::new(config.client.clone())?);
        let fetcher = PaginatedFetcher::new(client.clone(), config.pagination.clone());
        let statuses = Arc::new(MemoryTaskStatusStore::new(config.task.status_ttl));

        let deps = SyncDeps {
            fetcher: Arc::new(fetcher),
            albums: library.clone(),
            sync_config: library.clone(),
            statuses,
        };
        let sync = Arc::new(SyncService::new(deps, config.task.clone()));

        tracing::debug!(db = %library.path().display(), base_url = client.base_url(), "Initialized");
        Ok(Self {
            library,
            client,
            sync,
        })
    }
}

fn format_timestamp(epoch: i64) -> String {
    if epoch <= 0 {
        return "never".to_string();
    }
    DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

async fn run_serve(app: App, bind: SocketAddr) -> anyhow::Result<()> {
    let shutdown_token = shutdown::install_signal_handler()?;
    let state = server::AppState {
        sync: app.sync,
        client: app.client,
        albums: app.library,
    };
    server::start_server(bind, state, shutdown_token).await
}

/// Run one sync in the foreground, printing each progress message.
async fn run_sync(app: App, fan_id: Option<String>, username: Option<String>) -> anyhow::Result<()> {
    let fan_id = match (fan_id, username) {
        (Some(fan_id), _) => fan_id,
        (None, Some(username)) => app
            .client
            .resolve_fan_id(&username)
            .await
            .ok_or_else(|| anyhow::anyhow!("Could not find fan ID for username {username:?}"))?,
        (None, None) => anyhow::bail!("either --fan-id or --username is required"),
    };

    let shutdown_token = shutdown::install_signal_handler()?;
    let handle = app.sync.request_sync(&fan_id)?;
    println!("Started refresh task {} for fan {}", handle.task_id, fan_id);

    let mut last_message = String::new();
    let status = loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                anyhow::bail!("Interrupted; refresh task {} abandoned", handle.task_id);
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let Some(status) = app.sync.task(&handle.task_id) else {
            anyhow::bail!("Task {} disappeared from the status store", handle.task_id);
        };
        if status.message != last_message {
            println!("{}", status.message);
            last_message = status.message.clone();
        }
        if status.status.is_terminal() {
            break status;
        }
    };

    if status.status == TaskState::Failed {
        anyhow::bail!("{}", status.message);
    }

    println!();
    for (key, value) in &status.data {
        println!("  {key}: {value}");
    }
    Ok(())
}

async fn run_fan_id(client: &BandcampClient, username: &str) -> anyhow::Result<()> {
    match client.resolve_fan_id(username).await {
        Some(fan_id) => {
            println!("{fan_id}");
            Ok(())
        }
        None => anyhow::bail!("Could not find fan ID for username {username:?}"),
    }
}

async fn run_tracks(client: &BandcampClient, url: &str) -> anyhow::Result<()> {
    let tracks = client.fetch_track_listing(url).await;
    if tracks.is_empty() {
        println!("No playable tracks found at {url}");
        return Ok(());
    }
    for track in tracks {
        println!("{:>3}. {}  {}", track.track_num, track.name, track.url);
    }
    Ok(())
}

async fn run_albums(
    library: &SqliteLibrary,
    filter: AlbumFilter,
    search: Option<String>,
) -> anyhow::Result<()> {
    let albums = library.list(filter, search.as_deref()).await?;
    for album in &albums {
        let marker = if album.purchased { "owned" } else { "wish " };
        let rating = if album.is_rated() {
            format!("{:>2}/10", album.rating)
        } else {
            "  -  ".to_string()
        };
        println!("[{marker}] {rating}  {} - {}", album.artist, album.title);
    }
    println!("{} album(s)", albums.len());
    Ok(())
}

async fn run_status(library: &SqliteLibrary, db_path: &Path) -> anyhow::Result<()> {
    let stats = library.stats().await?;
    let last_refresh = library.last_refresh().await?;

    println!("Library: {}", db_path.display());
    println!();
    println!("Albums:");
    println!("  Total:     {}", stats.total);
    println!("  Purchased: {}", stats.purchased);
    println!("  Wishlist:  {}", stats.wishlist);
    println!("  Rated:     {}", stats.rated);
    if let Some(avg) = stats.average_rating {
        println!("  Average:   {avg:.1}");
    }
    println!();
    println!("Last refresh: {}", format_timestamp(last_refresh));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let filter = cli.global.log_level.as_filter();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = Config::from_cli(&cli.global)?;
    let app = App::build(&config).await?;

    match cli.command {
        Command::Serve { bind } => run_serve(app, bind).await,
        Command::Sync { fan_id, username } => run_sync(app, fan_id, username).await,
        Command::FanId { username } => run_fan_id(&app.client, &username).await,
        Command::Tracks { url } => run_tracks(&app.client, &url).await,
        Command::Albums { filter, search } => run_albums(&app.library, filter, search).await,
        Command::Status => run_status(&app.library, &config.db_path).await,
    }
}
