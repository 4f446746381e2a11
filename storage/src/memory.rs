// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::dag::{self, Block, DagConfig};
use crate::storage::{Error as StorageError, Storage};

/// In-process block store. Clones share the same blocks.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    blocks: Arc<Mutex<HashMap<String, Bytes>>>,
    config: DagConfig,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DagConfig) -> Self {
        Self {
            blocks: Arc::default(),
            config,
        }
    }

    pub fn dag_config(&self) -> DagConfig {
        self.config
    }

    pub fn contains(&self, cid: &str) -> bool {
        self.blocks.lock().unwrap().contains_key(cid)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    fn put(&self, block: Block) {
        self.blocks.lock().unwrap().insert(block.cid, block.data);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn add_file(&self, bytes: impl Into<Bytes> + Send) -> Result<String, StorageError> {
        let dag = dag::build_dag(bytes.into(), self.config)?;
        for block in dag.blocks {
            self.put(block);
        }
        Ok(dag.root)
    }

    async fn add_raw(&self, bytes: impl Into<Bytes> + Send) -> Result<String, StorageError> {
        let block = Block::raw(bytes.into())?;
        let cid = block.cid.clone();
        self.put(block);
        Ok(cid)
    }

    async fn chunk_data(&self, cid: &str) -> Result<Bytes, StorageError> {
        self.blocks
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or_else(|| StorageError::BlockNotFound(cid.to_string()))
    }
}
