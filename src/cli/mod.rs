use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cache::CacheStore;
use crate::config;
use crate::context::AppContext;
use crate::domain::track::TrackRef;
use crate::downloads::SubmitOutcome;
use crate::storage::db::i64_seconds_to_local_time;
use crate::storage::operations::Storage;

#[derive(Parser)]
#[command(name = "playdeck")]
#[command(version)]
#[command(about = "Music streaming backend with a local audio cache")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show cached tracks and total cache size
    Status,
    /// Run http server
    Serve,
    /// Create a session for a user and print its token
    Session { user: String },
    /// Delete a session
    Revoke { token: String },
    /// List tracks a user liked
    Likes { user: String },
    /// Download a track into the cache and wait for it
    Fetch {
        #[arg(long)]
        id: String,
        #[arg(long)]
        artist: String,
        #[arg(long)]
        title: String,
    },
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = config::Config::load(&cli.config)?;

    match cli.command {
        Commands::Status => {
            let cache = CacheStore::open(&cfg.cache).context("Failed to open cache")?;
            let entries = cache.entries().context("Failed to list cache")?;
            let total: u64 = entries.iter().map(|e| e.size).sum();

            println!(
                "Cache at {} contains {} tracks, {} bytes",
                cache.root().display(),
                entries.len(),
                total
            );
            for entry in &entries {
                println!("    - {} ({} bytes)", entry.track_id, entry.size);
            }
        }

        Commands::Serve => {
            let ctx = AppContext::from_config(&cfg)?;
            let http_server = crate::http::server::HttpServer::new(ctx, cfg.http);

            log::info!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr,
                http_server.config.port
            );
            http_server.run()?;
        }

        Commands::Session { user } => {
            let mut storage = Storage::new(&cfg.database).context("Failed to initialize storage")?;
            let token = storage.create_session(&user)?;
            println!("{token}");
        }

        Commands::Revoke { token } => {
            let mut storage = Storage::new(&cfg.database).context("Failed to initialize storage")?;
            if storage.revoke_session(&token)? {
                println!("Session revoked");
            } else {
                bail!("no such session");
            }
        }

        Commands::Likes { user } => {
            let storage = Storage::new(&cfg.database).context("Failed to initialize storage")?;
            let likes = storage.list_likes(&user)?;

            println!("{user} liked {} tracks:", likes.len());
            for like in &likes {
                println!(
                    "    - [{}] {} - {} (liked {})",
                    like.track.id,
                    like.track.artist,
                    like.track.title,
                    i64_seconds_to_local_time(like.liked_at)?
                );
            }
        }

        Commands::Fetch { id, artist, title } => {
            let track = TrackRef::new(&id, &artist, &title)?;
            let ctx = AppContext::from_config(&cfg)?;
            if ctx.cache.exists(&track.id) {
                println!("{} is already cached", track.id);
                return Ok(());
            }

            let id = track.id.clone();
            if ctx.downloads.submit(track) == SubmitOutcome::Closed {
                bail!("download queue is closed");
            }
            let cache = std::sync::Arc::clone(&ctx.cache);
            ctx.shutdown();

            if !cache.exists(&id) {
                bail!("download of {id} failed, see log for details");
            }
            println!("Cached {id} at {}", cache.path_for(&id).display());
        }
    }
    Ok(())
}
