use std::{
    io::Read,
    path::PathBuf,
    process::{Child, Command, Output, Stdio},
    time::{Duration, Instant},
};

use reqwest::blocking::Client;

use crate::{
    config::ResolverConfig,
    resolver::{AudioResolver, ResolveError},
};

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(45);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolves audio by searching with `yt-dlp` and taking the first hit
pub struct YtDlp {
    program: PathBuf,
    /// for URLs streamed through the proxy, any container
    stream_format: String,
    /// for downloads, only the cache's container
    cache_format: String,
    client: Client,
}

/// yt-dlp selector matching only audio in the `extension` container
fn cache_format(extension: &str) -> String {
    format!("bestaudio[ext={}]", extension.trim_start_matches('.'))
}

impl YtDlp {
    pub fn new(config: &ResolverConfig, cache_extension: &str, client: Client) -> Self {
        Self {
            program: config.program.clone(),
            stream_format: config.format.clone(),
            cache_format: cache_format(cache_extension),
            client,
        }
    }

    fn url_args(format: &str, query: &str) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--geo-bypass".to_string(),
            "-f".to_string(),
            format.to_string(),
            "-g".to_string(),
            // keeps a query starting with '-' from being read as an option
            "--".to_string(),
            format!("ytsearch1:{query}"),
        ]
    }

    fn run(&self, args: &[String]) -> Result<String, ResolveError> {
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ResolveError::ProgramMissing(e),
                _ => ResolveError::Io(e),
            })?;

        let output = wait_with_output_timeout(child, RESOLVE_TIMEOUT)?;
        if !output.status.success() {
            return Err(ResolveError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Waits for the child, killing it once `timeout` is over
fn wait_with_output_timeout(mut child: Child, timeout: Duration) -> Result<Output, ResolveError> {
    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return Ok(child.wait_with_output()?);
        }
        if Instant::now() >= deadline {
            log::error!("yt-dlp timed out after {}s, killing it", timeout.as_secs());
            let _ = child.kill();
            let _ = child.wait();
            return Err(ResolveError::TimedOut(timeout.as_secs()));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// first URL printed by `yt-dlp -g`
fn first_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("http://") || line.starts_with("https://"))
        .map(str::to_string)
}

impl YtDlp {
    fn find_url(&self, format: &str, query: &str) -> Result<Option<String>, ResolveError> {
        let stdout = self.run(&Self::url_args(format, query))?;
        let url = first_url(&stdout);
        if url.is_none() {
            log::info!("yt-dlp found nothing for {query:?} with format {format}");
        }
        Ok(url)
    }
}

impl AudioResolver for YtDlp {
    fn resolve_audio_url(&self, query: &str) -> Result<Option<String>, ResolveError> {
        self.find_url(&self.stream_format, query)
    }

    /// Fails when no audio exists in the cache's container, so a download
    /// never commits bytes under the wrong extension.
    fn open_audio(&self, query: &str) -> Result<Box<dyn Read + Send>, ResolveError> {
        let url = self
            .find_url(&self.cache_format, query)?
            .ok_or(ResolveError::NoResult)?;
        let response = self.client.get(&url).send()?.error_for_status()?;
        Ok(Box::new(response))
    }
}
