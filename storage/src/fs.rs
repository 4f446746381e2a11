// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dag::{self, Block, DagConfig};
use crate::storage::{Error as StorageError, Storage};

/// Block store keeping one file per block under a root directory.
#[derive(Clone)]
pub struct FsStorage {
    root: Arc<PathBuf>,
    config: DagConfig,
}

impl FsStorage {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::with_config(root, DagConfig::default()).await
    }

    pub async fn with_config(
        root: impl AsRef<Path>,
        config: DagConfig,
    ) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::Io(root.display().to_string(), e))?;
        Ok(Self {
            root: Arc::new(root),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, cid: &str) -> Result<PathBuf, StorageError> {
        // only well-formed cids may become file names
        let cid = dag::parse_cid(cid)?;
        Ok(self.root.join(cid.to_string()))
    }

    async fn put(&self, block: Block) -> Result<(), StorageError> {
        let path = self.block_path(&block.cid)?;
        tokio::fs::write(&path, &block.data)
            .await
            .map_err(|e| StorageError::Io(path.display().to_string(), e))
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn add_file(&self, bytes: impl Into<Bytes> + Send) -> Result<String, StorageError> {
        let dag = dag::build_dag(bytes.into(), self.config)?;
        log::debug!("writing {} blocks of {}", dag.blocks.len(), dag.root);
        for block in dag.blocks {
            self.put(block).await?;
        }
        Ok(dag.root)
    }

    async fn add_raw(&self, bytes: impl Into<Bytes> + Send) -> Result<String, StorageError> {
        let block = Block::raw(bytes.into())?;
        let cid = block.cid.clone();
        self.put(block).await?;
        Ok(cid)
    }

    async fn chunk_data(&self, cid: &str) -> Result<Bytes, StorageError> {
        let path = self.block_path(cid)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::BlockNotFound(cid.to_string()))
            }
            Err(e) => Err(StorageError::Io(path.display().to_string(), e)),
        }
    }
}
