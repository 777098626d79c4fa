//! Directory backed audio cache.
//!
//! Presence of `<id>.<ext>` under the root is the only source of truth.
//! Files only appear under that name through an atomic rename, so a reader
//! either sees a complete file or nothing.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::{
    cache::error::CacheError,
    config::CacheConfig,
    domain::track::TrackId,
    range::{ByteSpan, RangeSpec},
};

pub struct CacheStore {
    root: PathBuf,
    extension: String,
}

/// Cached file opened for reading, positioned at the start of the requested span
#[derive(Debug)]
pub struct CachedAudio {
    pub path: PathBuf,
    pub body: io::Take<File>,
    /// full size of the file
    pub total: u64,
    /// `None` when the whole file was requested
    pub span: Option<ByteSpan>,
}

impl CachedAudio {
    /// number of bytes the body will yield
    pub fn len(&self) -> u64 {
        self.span.map_or(self.total, |span| span.len())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub track_id: TrackId,
    pub size: u64,
}

impl CacheStore {
    /// does not touch the file system, see [`CacheStore::open`]
    pub fn new<P: AsRef<Path>>(root: P, extension: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// creates the cache root if needed
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&config.root)?;
        Ok(Self::new(&config.root, &config.extension))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_name(&self, id: &TrackId) -> String {
        format!("{}.{}", id, self.extension)
    }

    pub fn path_for(&self, id: &TrackId) -> PathBuf {
        self.root.join(self.file_name(id))
    }

    pub fn exists(&self, id: &TrackId) -> bool {
        self.path_for(id).is_file()
    }

    /// maps `<id>.<ext>` back to the track id, rejecting anything else
    pub fn id_from_file_name(&self, file_name: &str) -> Result<TrackId, CacheError> {
        let invalid = || CacheError::InvalidFileName(file_name.to_string());
        let stem = file_name
            .strip_suffix(self.extension.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or_else(invalid)?;
        TrackId::parse(stem).map_err(|_| invalid())
    }

    pub fn open_for_read(
        &self,
        id: &TrackId,
        range: Option<RangeSpec>,
    ) -> Result<CachedAudio, CacheError> {
        let path = self.path_for(id);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let total = file.metadata()?.len();

        let span = match range {
            Some(range) => Some(
                range
                    .resolve(total)
                    .map_err(|e| CacheError::RangeNotSatisfiable { total: e.total })?,
            ),
            None => None,
        };

        let (start, len) = span.map_or((0, total), |span| (span.start, span.len()));
        if start > 0 {
            file.seek(SeekFrom::Start(start))?;
        }

        Ok(CachedAudio {
            path,
            body: file.take(len),
            total,
            span,
        })
    }

    /// Copies `source` into the cache under `id`.
    ///
    /// Bytes go to a uniquely named hidden file next to the final one which is
    /// renamed into place once everything is synced. On error the temporary
    /// file is removed and nothing is visible under `path_for(id)`.
    pub fn write_stream<R: Read + ?Sized>(
        &self,
        id: &TrackId,
        source: &mut R,
    ) -> Result<PathBuf, CacheError> {
        let target = self.path_for(id);
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{id}."))
            .suffix(".part")
            .tempfile_in(&self.root)?;

        let written = io::copy(source, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target)?;

        log::debug!("cached {} bytes for {} at {}", written, id, target.display());
        Ok(target)
    }

    /// Lists committed entries. Temporary files and foreign files are skipped.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| CacheError::Fs(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if let Ok(track_id) = self.id_from_file_name(&name) {
                let size = entry.metadata().map_err(|e| CacheError::Fs(e.into()))?.len();
                entries.push(CacheEntry { track_id, size });
            }
        }
        entries.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        Ok(entries)
    }
}
