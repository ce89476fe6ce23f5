use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::bandcamp::client::DEFAULT_BASE_URL;
use crate::types::{AlbumFilter, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "campcounselor",
    version,
    about = "Track your Bandcamp collection and wishlist"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Path to the album database
    #[arg(
        long,
        global = true,
        env = "CAMPCOUNSELOR_DB",
        default_value = "~/.campcounselor/albums.db"
    )]
    pub database: String,

    /// Bandcamp base URL
    #[arg(long, global = true, env = "BANDCAMP_URL", default_value = DEFAULT_BASE_URL)]
    pub bandcamp_url: String,

    /// Maximum page requests per collection or wishlist walk
    #[arg(long, global = true, env = "BANDCAMP_MAX_REQUESTS", default_value_t = 500)]
    pub max_requests: u32,

    /// Delay between page requests, in milliseconds
    #[arg(long, global = true, default_value_t = 300)]
    pub page_delay_ms: u64,

    /// Per-request timeout, in seconds
    #[arg(long, global = true, default_value_t = 15)]
    pub request_timeout: u64,

    /// Retries for transient upstream failures (429, 5xx, connection errors)
    #[arg(long, global = true, default_value_t = 3)]
    pub max_retries: u32,

    /// Hard deadline for a whole sync, in seconds
    #[arg(long, global = true, default_value_t = 600)]
    pub task_timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "CAMPCOUNSELOR_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },

    /// Sync collection and wishlist in the foreground
    Sync {
        /// Numeric Bandcamp fan id
        #[arg(long, conflicts_with = "username", required_unless_present = "username")]
        fan_id: Option<String>,

        /// Bandcamp username, resolved to a fan id first
        #[arg(long)]
        username: Option<String>,
    },

    /// Look up the fan id for a username
    FanId { username: String },

    /// List the playable tracks of an album page
    Tracks { url: String },

    /// List albums in the library
    Albums {
        #[arg(long, value_enum, default_value = "all")]
        filter: AlbumFilter,

        /// Case-insensitive match on artist or title
        #[arg(long)]
        search: Option<String>,
    },

    /// Show library statistics and the last sync time
    Status,
}
