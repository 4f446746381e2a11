// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::dag::DagConfig;
use crate::memory::MemoryStorage;
use crate::storage::{Error as StorageError, Storage};

/// In-memory storage that can be told to fail on specific blocks or uploads.
#[derive(Clone)]
pub struct FakeStorage {
    inner: MemoryStorage,
    fail_chunks: Arc<Mutex<HashSet<String>>>,
    fail_raw_after: Arc<Mutex<Option<usize>>>,
    raw_uploads: Arc<AtomicUsize>,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::with_config(DagConfig::default())
    }

    pub fn with_config(config: DagConfig) -> Self {
        FakeStorage {
            inner: MemoryStorage::with_config(config),
            fail_chunks: Arc::new(Mutex::new(HashSet::new())),
            fail_raw_after: Arc::new(Mutex::new(None)),
            raw_uploads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes `chunk_data` fail for the given cids.
    pub fn fake_failed_chunks(&self, cids: Vec<String>) {
        self.fail_chunks.lock().unwrap().extend(cids);
    }

    /// Lets the first `succeeding` raw uploads through and fails every later one.
    pub fn fake_failed_raw_uploads(&self, succeeding: usize) {
        *self.fail_raw_after.lock().unwrap() = Some(succeeding);
    }

    /// Number of attempted raw uploads, failed ones included.
    pub fn raw_upload_count(&self) -> usize {
        self.raw_uploads.load(Ordering::SeqCst)
    }

    pub fn contains(&self, cid: &str) -> bool {
        self.inner.contains(cid)
    }

    pub fn num_blocks(&self) -> usize {
        self.inner.num_blocks()
    }
}

#[async_trait]
impl Storage for FakeStorage {
    async fn add_file(&self, bytes: impl Into<Bytes> + Send) -> Result<String, StorageError> {
        self.inner.add_file(bytes).await
    }

    async fn add_raw(&self, bytes: impl Into<Bytes> + Send) -> Result<String, StorageError> {
        let attempt = self.raw_uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(succeeding) = *self.fail_raw_after.lock().unwrap() {
            if attempt >= succeeding {
                return Err(StorageError::StorageError(anyhow::anyhow!(
                    "Simulated upload failure"
                )));
            }
        }
        self.inner.add_raw(bytes).await
    }

    async fn chunk_data(&self, cid: &str) -> Result<Bytes, StorageError> {
        if self.fail_chunks.lock().unwrap().contains(cid) {
            return Err(StorageError::BlockNotFound(cid.to_string()));
        }
        self.inner.chunk_data(cid).await
    }
}
