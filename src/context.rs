use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Context, anyhow};
use reqwest::blocking::Client;

use crate::{
    cache::CacheStore,
    catalog::CatalogClient,
    config::Config,
    downloads::DownloadScheduler,
    lyrics::LyricsClient,
    playback::PlaybackResolver,
    resolver::{AudioResolver, ytdlp::YtDlp},
    storage::{error::StorageError, operations::Storage},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a request handler needs, built once from the config
pub struct AppContext {
    storage: Mutex<Storage>,
    pub cache: Arc<CacheStore>,
    pub downloads: DownloadScheduler,
    pub playback: PlaybackResolver,
    pub catalog: CatalogClient,
    pub lyrics: LyricsClient,
    /// shared by the upstream proxy
    pub http_client: Client,
}

/// Client for upstream calls, see [`http_client_with_read_timeout`].
pub fn http_client() -> anyhow::Result<Client> {
    http_client_with_read_timeout(READ_TIMEOUT)
}

/// The blocking client's timeout bounds the wait for response headers and
/// each single body read, not the whole body. A proxied song may stream for
/// minutes, while an upstream that stalls mid-body fails after `read_timeout`
/// and releases the request thread or download worker.
///
/// Calls to catalog and lyrics APIs set a per-request total timeout on top.
pub fn http_client_with_read_timeout(read_timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(read_timeout)
        .build()
        .context("Failed to build HTTP client")
}

impl AppContext {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let storage = Storage::new(&cfg.database).context("Failed to initialize storage")?;
        let cache = CacheStore::open(&cfg.cache).with_context(|| {
            format!("Failed to open cache directory {}", cfg.cache.root.display())
        })?;
        let client = http_client()?;
        let resolver: Arc<dyn AudioResolver> = Arc::new(YtDlp::new(
            &cfg.resolver,
            &cfg.cache.extension,
            client.clone(),
        ));

        Self::assemble(
            storage,
            cache,
            resolver,
            CatalogClient::new(&cfg.catalog, client.clone()),
            LyricsClient::new(&cfg.lyrics, client.clone()),
            client,
            cfg.cache.workers,
        )
    }

    pub fn assemble(
        storage: Storage,
        cache: CacheStore,
        resolver: Arc<dyn AudioResolver>,
        catalog: CatalogClient,
        lyrics: LyricsClient,
        http_client: Client,
        workers: usize,
    ) -> anyhow::Result<Self> {
        let cache = Arc::new(cache);
        let downloads = DownloadScheduler::new(workers, Arc::clone(&cache), Arc::clone(&resolver))
            .context("Failed to start download workers")?;
        let playback = PlaybackResolver::new(Arc::clone(&cache), resolver);

        Ok(Self {
            storage: Mutex::new(storage),
            cache,
            downloads,
            playback,
            catalog,
            lyrics,
            http_client,
        })
    }

    pub fn storage(&self) -> Result<MutexGuard<'_, Storage>, StorageError> {
        self.storage.lock().map_err(|e| {
            StorageError::Internal(anyhow!("Could not access playdeck storage under lock: {e}"))
        })
    }

    /// Waits for queued downloads to finish.
    pub fn shutdown(self) {
        self.downloads.shutdown();
    }
}
