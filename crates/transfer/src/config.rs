//! Executor configuration.
//!
//! Read from a JSON file; every field has a default so partial files work.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Tunables for the transfer worker and HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Upload read size and progress granularity, in bytes.
    pub chunk_size: usize,
    /// Threads backing the worker context. 1 means a single shared worker.
    pub worker_threads: usize,
    /// Connection timeout for the file server, in seconds.
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// Filename prefix of staged downloads.
    pub temp_prefix: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            worker_threads: 1,
            connect_timeout_secs: 30,
            user_agent: format!("linkxfer/{}", env!("CARGO_PKG_VERSION")),
            temp_prefix: ".linkxfer-".into(),
        }
    }
}

impl TransferConfig {
    /// Loads the config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        let data = std::fs::read_to_string(path).map_err(|e| TransferError::local(path, e))?;
        let config: Self = serde_json::from_str(&data)?;
        Ok(config.normalized())
    }

    /// Replaces zero values that would stall the worker with defaults.
    pub fn normalized(mut self) -> Self {
        if self.chunk_size == 0 {
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        if self.worker_threads == 0 {
            self.worker_threads = 1;
        }
        self
    }
}
