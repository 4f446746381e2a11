// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Block format of the Merkle DAGs kept by the stores.
//!
//! A file is split into fixed-size leaves, each stored as a raw block. Leaves are grouped under
//! internal nodes of at most `max_links` children, level by level, until a single root remains.
//! Internal nodes are JSON documents `{"links": [...]}` addressed with the dag-json codec, so a
//! node's children can be recovered from its cid and bytes alone.

use bytes::Bytes;
use cid::Cid;
use multihash::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use crate::storage::Error;

/// Multicodec of raw leaves and parity blocks.
pub const RAW_CODEC: u64 = 0x55;
/// Multicodec of internal DAG nodes.
pub const DAG_JSON_CODEC: u64 = 0x0129;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_MAX_LINKS: usize = 174;

/// Layout parameters for building a DAG out of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagConfig {
    /// Size of every leaf except possibly the last one.
    pub chunk_size: usize,
    /// Maximum number of children of an internal node.
    pub max_links: usize,
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

impl DagConfig {
    pub fn new(chunk_size: usize, max_links: usize) -> Self {
        Self {
            chunk_size,
            max_links,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidDagParameter(
                "chunk_size".to_string(),
                self.chunk_size,
            ));
        }
        // a node with a single link would never reduce the level
        if self.max_links < 2 {
            return Err(Error::InvalidDagParameter(
                "max_links".to_string(),
                self.max_links,
            ));
        }
        Ok(())
    }
}

/// Internal node of a DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub links: Vec<String>,
}

/// A block ready to be put into a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: String,
    pub data: Bytes,
}

impl Block {
    pub fn raw(data: Bytes) -> Result<Self, Error> {
        let cid = cid_for(RAW_CODEC, &data)?;
        Ok(Self {
            cid: cid.to_string(),
            data,
        })
    }

    pub fn node(links: Vec<String>) -> Result<Self, Error> {
        let data = serde_json::to_vec(&DagNode { links })
            .map_err(|e| Error::StorageError(anyhow::anyhow!(e)))?;
        let cid = cid_for(DAG_JSON_CODEC, &data)?;
        Ok(Self {
            cid: cid.to_string(),
            data: Bytes::from(data),
        })
    }
}

/// All blocks of a DAG together with its root cid. Leaves come first, the root is last.
#[derive(Debug, Clone)]
pub struct Dag {
    pub root: String,
    pub blocks: Vec<Block>,
}

/// Splits a byte buffer into fixed-size chunks. The last chunk may be shorter.
pub struct Chunker {
    data: Bytes,
    chunk_size: usize,
}

impl Chunker {
    pub fn new(data: Bytes, chunk_size: usize) -> Self {
        Self { data, chunk_size }
    }

    pub fn num_chunks(&self) -> usize {
        self.data.len().div_ceil(self.chunk_size)
    }

    pub fn get_chunk(&self, index: usize) -> Option<Bytes> {
        let start = index * self.chunk_size;
        if start >= self.data.len() {
            return None;
        }
        let end = std::cmp::min(start + self.chunk_size, self.data.len());
        Some(self.data.slice(start..end))
    }

    pub fn chunks(&self) -> impl Iterator<Item = Bytes> + '_ {
        (0..self.num_chunks()).filter_map(|i| self.get_chunk(i))
    }
}

/// Builds a balanced DAG out of the given file contents.
/// An empty file is a single empty leaf.
pub fn build_dag(data: Bytes, config: DagConfig) -> Result<Dag, Error> {
    config.validate()?;

    let chunker = Chunker::new(data, config.chunk_size);
    let mut blocks = Vec::with_capacity(chunker.num_chunks() + 1);
    for chunk in chunker.chunks() {
        blocks.push(Block::raw(chunk)?);
    }
    if blocks.is_empty() {
        blocks.push(Block::raw(Bytes::new())?);
    }

    let mut level: Vec<String> = blocks.iter().map(|b| b.cid.clone()).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(config.max_links));
        for group in level.chunks(config.max_links) {
            let block = Block::node(group.to_vec())?;
            next.push(block.cid.clone());
            blocks.push(block);
        }
        level = next;
    }

    let root = level.pop().unwrap_or_default();
    Ok(Dag { root, blocks })
}

pub fn parse_cid(cid: &str) -> Result<Cid, Error> {
    Cid::from_str(cid).map_err(|e| Error::InvalidCid(cid.to_string(), e.to_string()))
}

/// Computes the CIDv1 (sha2-256) of `data` under the given codec.
pub fn cid_for(codec: u64, data: &[u8]) -> Result<Cid, Error> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let hash = hasher.finalize();

    let multihash = Code::Sha2_256
        .wrap(&hash)
        .map_err(|e| Error::StorageError(anyhow::anyhow!(e)))?;
    Ok(Cid::new_v1(codec, multihash))
}

/// Decodes the children of the node stored under `cid`.
pub fn decode_links(cid: &str, data: &[u8]) -> Result<Vec<String>, Error> {
    let parsed = parse_cid(cid)?;
    match parsed.codec() {
        RAW_CODEC => Ok(Vec::new()),
        DAG_JSON_CODEC => serde_json::from_slice::<DagNode>(data)
            .map(|node| node.links)
            .map_err(|e| Error::MalformedNode(cid.to_string(), e.to_string())),
        codec => Err(Error::MalformedNode(
            cid.to_string(),
            format!("unsupported codec {:#x}", codec),
        )),
    }
}
