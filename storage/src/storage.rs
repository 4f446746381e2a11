// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use thiserror;

use crate::dag;

/// Error type for storage operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error indicating that a block with the specified cid was not found.
    #[error("Block with cid {0} not found")]
    BlockNotFound(String),

    /// Error indicating that the provided cid is invalid.
    #[error("Invalid cid {0}. Error: {1}")]
    InvalidCid(String, String),

    /// Error indicating that a DAG node could not be decoded.
    #[error("Malformed DAG node {0}: {1}")]
    MalformedNode(String, String),

    /// Error indicating that the DAG layout parameters are unusable.
    #[error("Invalid DAG parameter {0}: {1}")]
    InvalidDagParameter(String, usize),

    /// I/O failure of a persistent backend.
    #[error("I/O error on {0}: {1}")]
    Io(String, #[source] std::io::Error),

    /// General storage error.
    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),
}

/// Trait representing a content-addressed block store holding Merkle DAGs.
///
/// Files are stored as DAGs of blocks: leaves are raw chunks of the file and internal nodes
/// list their children's cids. Parity blocks are stored as single raw blocks.
#[async_trait]
pub trait Storage: Send + Sync + Clone + 'static {
    /// Chunks the given bytes into a Merkle DAG, stores every block and returns the root cid.
    ///
    /// # Arguments
    ///
    /// * `bytes` - The file contents.
    ///
    /// # Returns
    ///
    /// A `Result` containing the cid of the DAG root, or an error if storing any block fails.
    async fn add_file(&self, bytes: impl Into<Bytes> + Send) -> Result<String, Error>;

    /// Stores the given bytes as a single raw block and returns its cid.
    async fn add_raw(&self, bytes: impl Into<Bytes> + Send) -> Result<String, Error>;

    /// Returns the bytes of the block identified by the given cid.
    ///
    /// # Arguments
    ///
    /// * `cid` - The cid of the block.
    ///
    /// # Returns
    ///
    /// A `Result` containing the block bytes, or an `Error` if the block is unavailable.
    async fn chunk_data(&self, cid: &str) -> Result<Bytes, Error>;

    /// Returns the cids of the children of the DAG node identified by `cid`, in order.
    /// Raw blocks have no children.
    async fn links(&self, cid: &str) -> Result<Vec<String>, Error> {
        let parsed = dag::parse_cid(cid)?;
        if parsed.codec() == dag::RAW_CODEC {
            return Ok(Vec::new());
        }
        let data = self.chunk_data(cid).await?;
        dag::decode_links(cid, &data)
    }

    /// Reassembles the file whose DAG root is `cid` by concatenating its raw leaves in order.
    /// Internal nodes contribute no bytes, even when they have no links.
    async fn get_file(&self, cid: &str) -> Result<Bytes, Error> {
        let mut file = BytesMut::new();
        let mut pending = vec![cid.to_string()];
        while let Some(cid) = pending.pop() {
            if dag::parse_cid(&cid)?.codec() == dag::RAW_CODEC {
                file.extend_from_slice(&self.chunk_data(&cid).await?);
            } else {
                let links = self.links(&cid).await?;
                pending.extend(links.into_iter().rev());
            }
        }
        Ok(file.freeze())
    }
}
