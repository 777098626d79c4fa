//! Background downloads filling the audio cache.
//!
//! A fixed number of worker threads pull jobs from a queue. A track id is
//! marked pending from submission until its job ends, and submissions for a
//! pending id are ignored, so one id is never fetched twice at the same time.

use std::{
    collections::HashSet,
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::JoinHandle,
};

use chrono::{DateTime, Utc};
use crossbeam::channel::{Receiver, Sender, unbounded};
use thiserror::Error;

use crate::{
    cache::{CacheError, CacheStore},
    domain::track::{TrackId, TrackRef},
    resolver::{AudioResolver, ResolveError},
};

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub track: TrackRef,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// a job for the same id is queued or running, nothing was added
    AlreadyPending,
    /// the scheduler is shutting down
    Closed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Committed(PathBuf),
    AlreadyCached,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("resolve failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("cache write failed: {0}")]
    Cache(#[from] CacheError),
}

type PendingSet = Arc<Mutex<HashSet<TrackId>>>;

fn lock(pending: &PendingSet) -> MutexGuard<'_, HashSet<TrackId>> {
    // the set stays consistent even if a holder panicked
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the pending mark when a job ends, however it ends
struct PendingGuard<'a> {
    pending: &'a PendingSet,
    id: TrackId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

pub struct DownloadScheduler {
    sender: Option<Sender<DownloadJob>>,
    pending: PendingSet,
    workers: Vec<JoinHandle<()>>,
}

impl DownloadScheduler {
    pub fn new(
        workers: usize,
        cache: Arc<CacheStore>,
        resolver: Arc<dyn AudioResolver>,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<DownloadJob>();
        let pending = PendingSet::default();

        let workers = (0..workers.max(1))
            .map(|n| {
                let receiver = receiver.clone();
                let pending = Arc::clone(&pending);
                let cache = Arc::clone(&cache);
                let resolver = Arc::clone(&resolver);
                std::thread::Builder::new()
                    .name(format!("download-{n}"))
                    .spawn(move || worker_loop(receiver, pending, cache, resolver))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sender: Some(sender),
            pending,
            workers,
        })
    }

    /// Queues a download and returns immediately.
    pub fn submit(&self, track: TrackRef) -> SubmitOutcome {
        let Some(sender) = &self.sender else {
            return SubmitOutcome::Closed;
        };

        let id = track.id.clone();
        if !lock(&self.pending).insert(id.clone()) {
            log::debug!("download of {id} already pending");
            return SubmitOutcome::AlreadyPending;
        }

        let job = DownloadJob {
            track,
            submitted_at: Utc::now(),
        };
        if sender.send(job).is_err() {
            log::error!("download queue closed, dropping {id}");
            lock(&self.pending).remove(&id);
            return SubmitOutcome::Closed;
        }
        log::info!("queued download of {id}");
        SubmitOutcome::Queued
    }

    pub fn is_pending(&self, id: &TrackId) -> bool {
        lock(&self.pending).contains(id)
    }

    /// Stops accepting jobs, lets the workers drain the queue and joins them.
    pub fn shutdown(mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("download worker panicked");
            }
        }
    }
}

fn worker_loop(
    receiver: Receiver<DownloadJob>,
    pending: PendingSet,
    cache: Arc<CacheStore>,
    resolver: Arc<dyn AudioResolver>,
) {
    for job in receiver.iter() {
        let _guard = PendingGuard {
            pending: &pending,
            id: job.track.id.clone(),
        };
        let id = job.track.id.clone();
        let waited = Utc::now() - job.submitted_at;
        log::info!(
            "downloading {} ({} - {}) after {}ms in queue",
            id,
            job.track.artist,
            job.track.title,
            waited.num_milliseconds()
        );

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            run_job(&cache, resolver.as_ref(), &job)
        }));

        match result {
            Ok(Ok(JobOutcome::Committed(path))) => {
                log::info!("cached {} at {}", id, path.display())
            }
            Ok(Ok(JobOutcome::AlreadyCached)) => log::info!("{id} already cached, skipping"),
            Ok(Err(e)) => log::warn!("download of {id} failed, dropping job: {e}"),
            Err(_) => log::error!("download of {id} panicked, dropping job"),
        }
    }
}

/// Fetches one track into the cache unless it is already there
pub fn run_job(
    cache: &CacheStore,
    resolver: &dyn AudioResolver,
    job: &DownloadJob,
) -> Result<JobOutcome, DownloadError> {
    let id = &job.track.id;
    if cache.exists(id) {
        return Ok(JobOutcome::AlreadyCached);
    }
    let mut source = resolver.open_audio(&job.track.search_query())?;
    let path = cache.write_stream(id, &mut source)?;
    Ok(JobOutcome::Committed(path))
}
