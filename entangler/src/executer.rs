// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entangler::{ChunkReceiver, Error};
use crate::lattice::Lattice;
use crate::parity::{pad_chunk, xor_chunks, Direction, ParityBlock, ParityChain, StrandType};

/// Capacity of the queue feeding each strand worker.
const STRAND_QUEUE_CAPACITY: usize = 256;

/// Lifecycle of a strand's chain. There is no way back from `Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrandState {
    Empty,
    Accumulating,
    Finalized,
}

/// Accumulates the parity chain of a single strand.
///
/// Every block is the XOR of its chunk and the block of the previous position along the strand.
/// Positions of the first column have no predecessor and start a chain with the chunk itself.
#[derive(Debug)]
pub struct StrandEncoder {
    strand: StrandType,
    lattice: Lattice,
    state: StrandState,
    blocks: Vec<ParityBlock>,
    max_len: usize,
}

impl StrandEncoder {
    pub fn new(strand: StrandType, lattice: Lattice) -> Self {
        Self {
            strand,
            lattice,
            state: StrandState::Empty,
            blocks: Vec::new(),
            max_len: 0,
        }
    }

    pub fn state(&self) -> StrandState {
        self.state
    }

    /// Adds the chunk at the next lattice position.
    pub fn push(&mut self, chunk: Bytes) -> Result<(), Error> {
        if self.state == StrandState::Finalized {
            return Err(self.finalized_error());
        }
        let pos = self.blocks.len();
        let lattice = self.lattice.covering(pos as u64 + 1);

        self.max_len = self.max_len.max(chunk.len());
        // stepping back from the first column wraps around, so it starts the chain
        let (data, prev) = if lattice.coordinates(pos as u64).col == 0 {
            (chunk, None)
        } else {
            let prev = lattice.neighbor(pos as u64, self.strand, Direction::Backward) as usize;
            (xor_chunks(&chunk, &self.blocks[prev].data), Some(prev))
        };
        self.blocks.push(ParityBlock {
            data,
            strand: self.strand,
            index: pos,
            source: pos,
            prev,
        });
        self.state = StrandState::Accumulating;
        Ok(())
    }

    /// Pads every block to the longest chunk seen and hands out the chain. The encoder accepts
    /// no further chunks afterwards.
    pub fn finalize(&mut self) -> Result<ParityChain, Error> {
        if self.state == StrandState::Finalized {
            return Err(self.finalized_error());
        }
        self.state = StrandState::Finalized;
        let mut blocks = std::mem::take(&mut self.blocks);
        for block in &mut blocks {
            block.data = pad_chunk(&block.data, self.max_len);
        }
        Ok(ParityChain {
            strand: self.strand,
            blocks,
        })
    }

    fn finalized_error(&self) -> Error {
        Error::StrandWorker {
            strand: self.strand,
            reason: "chain is already finalized".to_string(),
        }
    }
}

async fn run_strand(
    mut encoder: StrandEncoder,
    mut rx: mpsc::Receiver<Bytes>,
) -> Result<ParityChain, Error> {
    while let Some(chunk) = rx.recv().await {
        encoder.push(chunk)?;
    }
    encoder.finalize()
}

/// The executer runs the entanglement: it numbers incoming chunks and fans them out to one
/// worker task per strand. Strands share no state, so they run in parallel.
pub struct Executer {
    strands: Vec<StrandType>,
    lattice: Lattice,
}

impl Executer {
    pub fn new(strands: Vec<StrandType>, lattice: Lattice) -> Self {
        Self { strands, lattice }
    }

    /// Reads chunks until the queue is closed and returns the chains in strand order.
    /// The first chunk error aborts all workers.
    pub async fn execute(&self, mut chunks: ChunkReceiver) -> Result<Vec<ParityChain>, Error> {
        let mut senders = Vec::with_capacity(self.strands.len());
        let mut workers: Vec<JoinHandle<Result<ParityChain, Error>>> =
            Vec::with_capacity(self.strands.len());
        for &strand in &self.strands {
            let (tx, rx) = mpsc::channel(STRAND_QUEUE_CAPACITY);
            senders.push(tx);
            workers.push(tokio::spawn(run_strand(
                StrandEncoder::new(strand, self.lattice),
                rx,
            )));
        }

        let mut pos = 0;
        'recv: while let Some(item) = chunks.recv().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(source) => {
                    log::warn!("aborting entanglement at position {}: {}", pos, source);
                    for worker in &workers {
                        worker.abort();
                    }
                    return Err(Error::ChunkLoad { pos, source });
                }
            };
            for tx in &senders {
                if tx.send(chunk.clone()).await.is_err() {
                    // the worker is gone, its join below reports why
                    break 'recv;
                }
            }
            pos += 1;
        }
        drop(senders);
        drop(chunks);

        let mut chains = Vec::with_capacity(workers.len());
        for (strand, worker) in self.strands.iter().zip(workers) {
            let chain = worker.await.map_err(|e| Error::StrandWorker {
                strand: *strand,
                reason: e.to_string(),
            })??;
            if chain.len() != pos {
                return Err(Error::StrandWorker {
                    strand: *strand,
                    reason: format!("chain has {} blocks, expected {}", chain.len(), pos),
                });
            }
            log::debug!("finalized {:?} strand with {} blocks", strand, chain.len());
            chains.push(chain);
        }
        Ok(chains)
    }
}
