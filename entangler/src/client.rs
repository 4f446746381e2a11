// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use storage::Storage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::entangler::{ChunkReceiver, Entangler, Error};
use crate::flatten::{flatten, FlattenedSequence};
use crate::metadata::Metadata;
use crate::parity::{ParityChain, StrandType};
use crate::tree::{fetch_tree, MerkleTree};

const MAX_CONCURRENT_LOADS: usize = 16;
const MAX_CONCURRENT_UPLOADS: usize = 16;

/// Progress of an upload, reported to the [`Progress`] callback in the order the stages run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    FileAdded { root_cid: String },
    /// `pre_order` holds the pre-order index of the node at every flattened position.
    TreeFlattened { num_nodes: usize, pre_order: Vec<usize> },
    EntanglementGenerated { strand: StrandType, blocks: usize },
    StrandPersisted { strand: StrandType, blocks: usize },
    MetadataStored { cid: String },
}

pub type Progress = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub root_cid: String,
    /// `None` when the client is configured with `alpha == 0`.
    pub metadata_cid: Option<String>,
}

/// Client stores files and entangles them.
///
/// An upload adds the file to the store, reads its Merkle tree back, flattens it and streams the
/// chunks in flattened order into an [`Entangler`]. The parity blocks of every strand are stored
/// as raw blocks, and finally a [`Metadata`] record referencing all of them is stored as a file.
/// Metadata is only written once every parity block is stored.
#[derive(Clone)]
pub struct Client<T: Storage> {
    storage: T,
    config: Config,
    progress: Option<Progress>,
}

impl<T: Storage> Client<T> {
    pub fn new(storage: T, config: Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            storage,
            config,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn storage(&self) -> &T {
        &self.storage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn emit(&self, event: Event) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }

    /// Stores `bytes` as a file and, unless `alpha` is 0, entangles it.
    pub async fn upload(&self, bytes: impl Into<Bytes> + Send) -> Result<UploadResult, Error> {
        let root_cid = self.storage.add_file(bytes).await?;
        log::info!("stored file {}", root_cid);
        self.emit(Event::FileAdded {
            root_cid: root_cid.clone(),
        });

        if !self.config.entangles() {
            log::info!("entanglement disabled, skipping parity for {}", root_cid);
            return Ok(UploadResult {
                root_cid,
                metadata_cid: None,
            });
        }

        let metadata_cid = self.entangle_file(&root_cid).await?;
        Ok(UploadResult {
            root_cid,
            metadata_cid: Some(metadata_cid),
        })
    }

    /// Reads the tree of an already stored file and flattens it with the client's lattice
    /// parameters.
    pub async fn flatten_file(
        &self,
        root_cid: &str,
    ) -> Result<(MerkleTree, FlattenedSequence), Error> {
        let mut tree = fetch_tree(&self.storage, root_cid).await?;
        let sequence = flatten(&mut tree, self.config.s as u64, self.config.p as u64)?;
        let pre_order = sequence
            .iter()
            .map(|id| tree.node(id).map(|node| node.pre_order_idx()))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "flattened {} with {} swaps",
            root_cid,
            sequence.swaps().len()
        );
        self.emit(Event::TreeFlattened {
            num_nodes: sequence.len(),
            pre_order,
        });
        Ok((tree, sequence))
    }

    /// Entangles an already stored file, stores its parity blocks and metadata, and returns the
    /// metadata cid.
    pub async fn entangle_file(&self, root_cid: &str) -> Result<String, Error> {
        let (tree, sequence) = self.flatten_file(root_cid).await?;
        let cids = sequence
            .iter()
            .map(|id| tree.node(id).map(|node| node.cid.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let chains = self.entangle_chunks(cids.clone()).await?;
        for chain in &chains {
            self.emit(Event::EntanglementGenerated {
                strand: chain.strand,
                blocks: chain.len(),
            });
        }

        let mut parity_cids = Vec::with_capacity(chains.len());
        for chain in &chains {
            let stored = self.persist_chain(chain).await?;
            log::debug!("stored {} parity blocks of {:?}", stored.len(), chain.strand);
            self.emit(Event::StrandPersisted {
                strand: chain.strand,
                blocks: stored.len(),
            });
            parity_cids.push(stored);
        }

        let position_by_cid: HashMap<String, usize> = cids
            .into_iter()
            .enumerate()
            .map(|(pos, cid)| (cid, pos))
            .collect();
        let metadata = Metadata {
            alpha: self.config.alpha,
            s: self.config.s,
            p: self.config.p,
            root_cid: root_cid.to_string(),
            position_by_cid,
            parity_cids,
        };
        let metadata_cid = self
            .storage
            .add_file(serde_json::to_vec(&metadata)?)
            .await?;
        log::info!("stored metadata {} for {}", metadata_cid, root_cid);
        self.emit(Event::MetadataStored {
            cid: metadata_cid.clone(),
        });
        Ok(metadata_cid)
    }

    pub async fn download_metadata(&self, cid: &str) -> Result<Metadata, Error> {
        let bytes = self.storage.get_file(cid).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn entangle_chunks(&self, cids: Vec<String>) -> Result<Vec<ParityChain>, Error> {
        let mut entangler = Entangler::from_config(&self.config)?;
        let (loader, chunks) = self.spawn_loader(cids);
        if let Err(e) = entangler.entangle(chunks).await {
            loader.abort();
            return Err(e);
        }
        Ok(entangler.into_parity_chains().unwrap_or_default())
    }

    /// Loads the chunks of `cids` in order and feeds them to the returned queue. Stops after the
    /// first failed load or once the receiver is gone.
    fn spawn_loader(&self, cids: Vec<String>) -> (JoinHandle<()>, ChunkReceiver) {
        let (tx, rx) = mpsc::channel(cids.len().max(1));
        let storage = self.storage.clone();
        let handle = tokio::spawn(async move {
            let mut chunks = stream::iter(cids)
                .map(move |cid| {
                    let storage = storage.clone();
                    async move { storage.chunk_data(&cid).await }
                })
                .buffered(MAX_CONCURRENT_LOADS);
            while let Some(chunk) = chunks.next().await {
                let failed = chunk.is_err();
                if tx.send(chunk).await.is_err() || failed {
                    break;
                }
            }
        });
        (handle, rx)
    }

    async fn persist_chain(&self, chain: &ParityChain) -> Result<Vec<String>, Error> {
        let strand = chain.strand;
        stream::iter(chain.blocks.iter())
            .map(|block| async move {
                self.storage
                    .add_raw(block.data.clone())
                    .await
                    .map_err(|source| Error::ParityUpload {
                        strand,
                        pos: block.source,
                        source,
                    })
            })
            .buffered(MAX_CONCURRENT_UPLOADS)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use storage::dag::DagConfig;
    use storage::memory::MemoryStorage;

    fn small_store() -> MemoryStorage {
        MemoryStorage::with_config(DagConfig::new(4, 3))
    }

    #[test]
    fn test_new_validates_config() {
        assert!(matches!(
            Client::new(MemoryStorage::new(), Config::new(4, 5, 5)),
            Err(Error::TooManyStrands(4, _))
        ));
        assert!(Client::new(MemoryStorage::new(), Config::new(0, 5, 5)).is_ok());
    }

    #[tokio::test]
    async fn test_upload_reports_progress_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = events.clone();
        let client = Client::new(small_store(), Config::new(2, 2, 2))
            .unwrap()
            .with_progress(move |e| recorded.lock().unwrap().push(e.clone()));

        let result = client.upload(Bytes::from(vec![7u8; 40])).await.unwrap();
        let events = events.lock().unwrap();

        assert_eq!(
            events[0],
            Event::FileAdded {
                root_cid: result.root_cid.clone()
            }
        );
        assert!(matches!(events[1], Event::TreeFlattened { .. }));
        assert!(matches!(
            events[2],
            Event::EntanglementGenerated {
                strand: StrandType::Horizontal,
                ..
            }
        ));
        assert!(matches!(
            events[5],
            Event::StrandPersisted {
                strand: StrandType::Right,
                ..
            }
        ));
        assert_eq!(
            events.last(),
            Some(&Event::MetadataStored {
                cid: result.metadata_cid.unwrap()
            })
        );
        assert_eq!(events.len(), 7);
    }

    #[tokio::test]
    async fn test_flattened_sequence_covers_all_blocks() {
        let store = small_store();
        let client = Client::new(store.clone(), Config::new(1, 1, 1)).unwrap();
        // 10 leaves of 4 bytes, then 4, 2 and 1 nodes with at most 3 links each
        let data: Vec<u8> = (0..40).collect();
        let root_cid = store.add_file(data).await.unwrap();
        let (tree, sequence) = client.flatten_file(&root_cid).await.unwrap();
        assert_eq!(tree.size(), 17);
        assert_eq!(sequence.len(), 17);
        assert_eq!(store.num_blocks(), 17);
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let client = Client::new(small_store(), Config::new(3, 2, 2)).unwrap();
        let result = client.upload(&b"entangled bytes"[..]).await.unwrap();
        let metadata = client
            .download_metadata(&result.metadata_cid.unwrap())
            .await
            .unwrap();
        assert_eq!(metadata.root_cid, result.root_cid);
        assert_eq!((metadata.alpha, metadata.s, metadata.p), (3, 2, 2));
        assert_eq!(metadata.parity_cids.len(), 3);

        // positions are 0-based indices into the flattened sequence
        let mut positions: Vec<usize> = metadata.position_by_cid.values().copied().collect();
        positions.sort();
        assert_eq!(positions, (0..metadata.num_positions()).collect::<Vec<_>>());
    }
}
