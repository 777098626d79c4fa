//! Lookup of playable audio on an external video platform

use std::io::Read;

use thiserror::Error;

pub mod ytdlp;

pub use ytdlp::YtDlp;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("resolver program is not available: {0}")]
    ProgramMissing(std::io::Error),

    #[error("resolver failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("resolver timed out after {0}s")]
    TimedOut(u64),

    #[error("no playable audio found")]
    NoResult,

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Best-effort source of audio for a free-text query.
///
/// Implementations are shared between request threads and download workers.
pub trait AudioResolver: Send + Sync {
    /// Returns a direct, streamable URL, or `None` if the search had no hit.
    fn resolve_audio_url(&self, query: &str) -> Result<Option<String>, ResolveError>;

    /// Opens the audio bytes for `query`, used to fill the cache.
    fn open_audio(&self, query: &str) -> Result<Box<dyn Read + Send>, ResolveError>;
}

#[cfg(test)]
pub mod stub {
    use std::{
        collections::HashMap,
        io::{Cursor, Read},
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;

    /// Resolver answering from a fixed table, counting calls
    #[derive(Default)]
    pub struct ResolverStub {
        pub urls: HashMap<String, String>,
        pub audio: HashMap<String, Vec<u8>>,
        pub fail: bool,
        pub url_calls: AtomicUsize,
        pub open_calls: AtomicUsize,
        /// when set, `open_audio` blocks until a message arrives
        pub gate: Mutex<Option<crossbeam::channel::Receiver<()>>>,
    }

    impl ResolverStub {
        pub fn with_url(query: &str, url: &str) -> Self {
            let mut stub = Self::default();
            stub.urls.insert(query.to_string(), url.to_string());
            stub
        }

        pub fn with_audio(query: &str, audio: &[u8]) -> Self {
            let mut stub = Self::default();
            stub.audio.insert(query.to_string(), audio.to_vec());
            stub
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn url_calls(&self) -> usize {
            self.url_calls.load(Ordering::SeqCst)
        }

        pub fn open_calls(&self) -> usize {
            self.open_calls.load(Ordering::SeqCst)
        }
    }

    impl AudioResolver for ResolverStub {
        fn resolve_audio_url(&self, query: &str) -> Result<Option<String>, ResolveError> {
            self.url_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResolveError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "network down".to_string(),
                });
            }
            Ok(self.urls.get(query).cloned())
        }

        fn open_audio(&self, query: &str) -> Result<Box<dyn Read + Send>, ResolveError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            if self.fail {
                return Err(ResolveError::NoResult);
            }
            let audio = self.audio.get(query).cloned().ok_or(ResolveError::NoResult)?;
            Ok(Box::new(Cursor::new(audio)))
        }
    }
}
