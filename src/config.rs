use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    pub cache: CacheConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
    /// size of the request handling pool, rouille picks one when absent
    pub threads: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub in_memory: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// number of background download workers
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_extension() -> String {
    "m4a".to_string()
}

fn default_workers() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deezer.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LyricsConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://lrclib.net/api".to_string(),
            user_agent: concat!("playdeck/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    pub program: PathBuf,
    pub format: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            format: "bestaudio[ext=m4a]/bestaudio".to_string(),
        }
    }
}
