//! Persistence for the last paired host
//!
//! The client only reads the store at startup; writing it is left to
//! whoever handles the pairing action (the CLI here).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Endpoint store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access endpoint file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Endpoint file is corrupted: {0}")]
    Format(#[from] serde_json::Error),
}

/// Key-value style store for the paired host
pub trait EndpointStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, StoreError>;

    fn save(&self, host: &str) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEndpoint {
    host: String,
    saved_at: DateTime<Utc>,
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct FileEndpointStore {
    path: PathBuf,
}

impl FileEndpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the stored host was written, if any
    pub fn saved_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.read()?.map(|stored| stored.saved_at))
    }

    fn read(&self) -> Result<Option<StoredEndpoint>, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

impl EndpointStore for FileEndpointStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .read()?
            .map(|stored| stored.host)
            .filter(|host| !host.trim().is_empty()))
    }

    fn save(&self, host: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let stored = StoredEndpoint {
            host: host.to_string(),
            saved_at: Utc::now(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        debug!("Saved paired host to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryEndpointStore {
    host: Arc<Mutex<Option<String>>>,
}

impl MemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: Arc::new(Mutex::new(Some(host.into()))),
        }
    }
}

impl EndpointStore for MemoryEndpointStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.host.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, host: &str) -> Result<(), StoreError> {
        *self.host.lock().unwrap_or_else(PoisonError::into_inner) = Some(host.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.host.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
