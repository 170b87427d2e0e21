//! Message Cache
//!
//! Bounded LRU of decoded message bodies, keyed by body offset. Reads go
//! through a private file handle so the tail engine's cursor is never moved.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;

use crate::model::LogRecord;

pub struct MessageCache {
    path: PathBuf,
    /// Opened on first miss
    reader: Option<File>,
    entries: LruCache<u64, Arc<str>>,
    /// File reads performed (misses that reached the disk)
    reads: u64,
}

impl MessageCache {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            path: path.into(),
            reader: None,
            entries: LruCache::new(capacity),
            reads: 0,
        }
    }

    /// Message body of `record`
    ///
    /// A body that can no longer be read (file truncated or rotated) yields
    /// an empty string, which is not cached.
    pub fn get(&mut self, record: &LogRecord) -> Arc<str> {
        if let Some(message) = self.entries.get(&record.body_start) {
            return Arc::clone(message);
        }

        match self.read_body(record) {
            Ok(body) => {
                let message: Arc<str> = Arc::from(body);
                self.entries.put(record.body_start, Arc::clone(&message));
                message
            }
            Err(e) => {
                tracing::debug!(
                    "Message at {}..{} unavailable: {}",
                    record.body_start,
                    record.body_end,
                    e
                );
                // The handle may point at a file that no longer exists
                self.reader = None;
                Arc::from("")
            }
        }
    }

    fn read_body(&mut self, record: &LogRecord) -> std::io::Result<String> {
        self.reads += 1;

        let file = match self.reader.take() {
            Some(file) => file,
            None => File::open(&self.path)?,
        };
        let file = self.reader.insert(file);

        let mut body = vec![0u8; record.body_len() as usize];
        file.seek(SeekFrom::Start(record.body_start))?;
        file.read_exact(&mut body)?;

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Whether `record` is cached, without touching recency
    pub fn contains(&self, record: &LogRecord) -> bool {
        self.entries.contains(&record.body_start)
    }

    /// Drop every entry and the read handle
    pub fn clear(&mut self) {
        self.entries.clear();
        self.reader = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn read_count(&self) -> u64 {
        self.reads
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
