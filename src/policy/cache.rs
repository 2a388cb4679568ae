//! On-disk copy of the last fetched policy document.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AdError, Result};

pub const DEFAULT_TTL_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDocument {
    pub document: String,
    pub fetched_at_ms: i64,
}

impl CachedDocument {
    #[must_use]
    pub const fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.fetched_at_ms
    }
}

#[derive(Debug, Clone)]
pub struct PolicyCache {
    path: PathBuf,
    ttl_ms: i64,
}

impl PolicyCache {
    pub fn new(path: impl Into<PathBuf>, ttl_seconds: u64) -> Self {
        let ttl_ms = i64::try_from(ttl_seconds.saturating_mul(1_000)).unwrap_or(i64::MAX);
        Self {
            path: path.into(),
            ttl_ms,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached document if one exists and is within the TTL.
    pub fn load(&self, now_ms: i64) -> Result<Option<CachedDocument>> {
        let Some(cached) = self.read()? else {
            return Ok(None);
        };
        if cached.fetched_at_ms <= 0 || cached.age_ms(now_ms) > self.ttl_ms {
            debug!(
                path = %self.path.display(),
                age_ms = cached.age_ms(now_ms),
                "cached policy expired; ignoring"
            );
            return Ok(None);
        }
        Ok(Some(cached))
    }

    /// The cached document regardless of age.
    pub fn read(&self) -> Result<Option<CachedDocument>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let cached = serde_json::from_str(&raw)
            .map_err(|err| AdError::Serialization(format!("policy cache parse: {err}")))?;
        Ok(Some(cached))
    }

    pub fn store(&self, document: &str, now_ms: i64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(&CachedDocument {
            document: document.to_string(),
            fetched_at_ms: now_ms,
        })?;
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(payload.as_bytes())?;
        temp.persist(&self.path).map_err(|err| AdError::Io(err.error))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(AdError::Io(err)),
        }
    }
}
