//! Persistent response cache
//!
//! Append-only JSON-lines file mapping request signature (the full request
//! URL) to the raw response body. Entries are written before a response is
//! returned to the caller, so a crash after a successful remote call never
//! loses the result; a restarted run resumes from the cache with no
//! re-fetching. Entries are never mutated or evicted; deleting the file
//! forces a full re-fetch.
//!
//! Only the byte offset of each entry is held in memory. Response bodies are
//! re-read from disk on every hit, which keeps a multi-hundred-thousand-entry
//! cache from pinning gigabytes of JSON.

use crate::{MetaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    signature: String,
    fetched_on: String,
    body: String,
}

/// Append-only response cache with an in-memory offset index.
pub struct ResponseCache {
    path: PathBuf,
    reader: BufReader<File>,
    writer: File,
    index: HashMap<String, u64>,
    hits: u64,
}

impl ResponseCache {
    /// Open (creating if absent) the cache file and build the offset index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let writer = OpenOptions::new().create(true).append(true).open(&path)?;
        let reader = BufReader::new(File::open(&path)?);

        let mut cache = ResponseCache {
            path,
            reader,
            writer,
            index: HashMap::new(),
            hits: 0,
        };
        cache.load_index()?;
        Ok(cache)
    }

    fn load_index(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        let mut offset = 0u64;
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            let record: CacheRecord = serde_json::from_str(line.trim_end()).map_err(|e| {
                MetaError::Cache(format!(
                    "malformed cache entry at byte {} of {}: {}",
                    offset,
                    self.path.display(),
                    e
                ))
            })?;
            self.index.insert(record.signature, offset);
            offset += read as u64;
        }
        info!(
            entries = self.index.len(),
            path = %self.path.display(),
            "Loaded response cache"
        );
        Ok(())
    }

    /// Look up the raw response body for a signature. No network access.
    pub fn get(&mut self, signature: &str) -> Result<Option<String>> {
        let offset = match self.index.get(signature) {
            Some(offset) => *offset,
            None => return Ok(None),
        };
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        let record: CacheRecord = serde_json::from_str(line.trim_end()).map_err(|e| {
            MetaError::Cache(format!("unreadable cache entry for [{}]: {}", signature, e))
        })?;
        if record.signature != signature {
            return Err(MetaError::Cache(format!(
                "cache index out of sync: expected [{}], found [{}]",
                signature, record.signature
            )));
        }
        self.hits += 1;
        debug!(signature, "Cache hit");
        Ok(Some(record.body))
    }

    /// Append a response body, keyed by signature. Idempotent: a signature
    /// already present is left untouched.
    pub fn append(&mut self, signature: &str, body: &str) -> Result<()> {
        if self.index.contains_key(signature) {
            return Ok(());
        }
        let record = CacheRecord {
            signature: signature.to_string(),
            fetched_on: chrono::Local::now().format("%Y%m%d").to_string(),
            body: body.to_string(),
        };
        let offset = self.writer.seek(SeekFrom::End(0))?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        self.index.insert(signature.to_string(), offset);
        Ok(())
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.index.contains_key(signature)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.index.len(),
            hits: self.hits,
        }
    }

    /// Truncate the cache file and drop the index. Operator action only;
    /// the pipeline itself never evicts.
    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.index.len();
        self.writer.set_len(0)?;
        self.writer.seek(SeekFrom::Start(0))?;
        self.index.clear();
        info!(removed, path = %self.path.display(), "Cleared response cache");
        Ok(removed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_get() {
        let dir = tempdir().unwrap();
        let mut cache = ResponseCache::open(dir.path().join("test.cache")).unwrap();

        assert!(cache.get("http://x/a").unwrap().is_none());
        cache.append("http://x/a", r#"{"value":1}"#).unwrap();
        assert_eq!(cache.get("http://x/a").unwrap().unwrap(), r#"{"value":1}"#);
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_append_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut cache = ResponseCache::open(dir.path().join("test.cache")).unwrap();

        cache.append("sig", "first").unwrap();
        cache.append("sig", "second").unwrap();
        assert_eq!(cache.get("sig").unwrap().unwrap(), "first");
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cache");

        {
            let mut cache = ResponseCache::open(&path).unwrap();
            cache.append("a", "1").unwrap();
            cache.append("b", "2").unwrap();
        }

        let mut cache = ResponseCache::open(&path).unwrap();
        assert_eq!(cache.stats().entries, 2);
        assert_eq!(cache.get("a").unwrap().unwrap(), "1");
        assert_eq!(cache.get("b").unwrap().unwrap(), "2");
    }

    #[test]
    fn test_bodies_with_newlines_stay_single_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cache");

        {
            let mut cache = ResponseCache::open(&path).unwrap();
            cache.append("a", "line1\nline2").unwrap();
            cache.append("b", "2").unwrap();
        }

        let mut cache = ResponseCache::open(&path).unwrap();
        assert_eq!(cache.get("a").unwrap().unwrap(), "line1\nline2");
        assert_eq!(cache.get("b").unwrap().unwrap(), "2");
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let mut cache = ResponseCache::open(dir.path().join("test.cache")).unwrap();

        cache.append("a", "1").unwrap();
        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.get("a").unwrap().is_none());
        assert_eq!(cache.stats().entries, 0);
    }
}
