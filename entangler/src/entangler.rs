// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::executer::Executer;
use crate::lattice::Lattice;
use crate::parity::{ParityChain, StrandType, MAX_STRANDS};

/// Receiving half of the queue between the chunk loader and the entangler. Chunks arrive in
/// flattened order; an `Err` item means loading failed and aborts the entanglement.
pub type ChunkReceiver = mpsc::Receiver<Result<Bytes, storage::Error>>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid parameter {0}: {1}")]
    InvalidEntanglementParameter(String, u64),
    #[error("Alpha {0} exceeds the {1} strands supported by the lattice")]
    TooManyStrands(u8, usize),
    #[error("Malformed tree: {0}")]
    MalformedTree(String),
    #[error("Unknown tree node {0}")]
    UnknownNode(usize),
    #[error("Entangler was already used")]
    AlreadyEntangled,
    #[error("Failed to read merkle tree node {cid}: {source}")]
    TreeFetch {
        cid: String,
        #[source]
        source: storage::Error,
    },
    #[error("Failed to load chunk at position {pos}: {source}")]
    ChunkLoad {
        pos: usize,
        #[source]
        source: storage::Error,
    },
    #[error("Failed to upload parity block {pos} of strand {strand:?}: {source}")]
    ParityUpload {
        strand: StrandType,
        pos: usize,
        #[source]
        source: storage::Error,
    },
    #[error("Strand {strand:?} failed: {reason}")]
    StrandWorker { strand: StrandType, reason: String },
    #[error("Failed to encode or decode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] storage::Error),
}

/// Entangler turns an ordered stream of chunks into `alpha` parity chains, one per strand of
/// the lattice. It is single-shot: once [`Entangler::entangle`] was called it can't be reused.
#[derive(Debug)]
pub struct Entangler {
    alpha: u8,
    lattice: Lattice,
    used: bool,
    chains: Option<Vec<ParityChain>>,
}

impl Entangler {
    pub fn new(alpha: u8, s: u8, p: u8) -> Result<Self, Error> {
        if alpha == 0 {
            return Err(Error::InvalidEntanglementParameter(
                "alpha".to_string(),
                alpha as u64,
            ));
        }
        if alpha as usize > MAX_STRANDS {
            return Err(Error::TooManyStrands(alpha, MAX_STRANDS));
        }
        let lattice = Lattice::new(s as u64, p as u64)?;
        Ok(Self {
            alpha,
            lattice,
            used: false,
            chains: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::new(config.alpha, config.s, config.p)
    }

    pub fn alpha(&self) -> u8 {
        self.alpha
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// The strands this entangler produces chains for, in chain order.
    pub fn strands(&self) -> Vec<StrandType> {
        StrandType::all()
            .into_iter()
            .take(self.alpha as usize)
            .collect()
    }

    /// Consumes the chunk queue until the producer closes it and computes the parity chains.
    ///
    /// On failure no chain is exposed.
    pub async fn entangle(&mut self, chunks: ChunkReceiver) -> Result<(), Error> {
        if self.used {
            return Err(Error::AlreadyEntangled);
        }
        self.used = true;

        let exec = Executer::new(self.strands(), self.lattice);
        let chains = exec.execute(chunks).await?;
        log::debug!(
            "entangled {} chunks along {} strands",
            chains.first().map(|c| c.len()).unwrap_or(0),
            chains.len()
        );
        self.chains = Some(chains);
        Ok(())
    }

    /// The parity chains, once [`Entangler::entangle`] succeeded.
    pub fn parity_chains(&self) -> Option<&[ParityChain]> {
        self.chains.as_deref()
    }

    pub fn into_parity_chains(self) -> Option<Vec<ParityChain>> {
        self.chains
    }
}

/// Entangles the chunks arriving on `chunks` with a fresh [`Entangler`] and returns its chains.
pub async fn entangle(
    chunks: ChunkReceiver,
    alpha: u8,
    s: u8,
    p: u8,
) -> Result<Vec<ParityChain>, Error> {
    let mut entangler = Entangler::new(alpha, s, p)?;
    entangler.entangle(chunks).await?;
    Ok(entangler.into_parity_chains().unwrap_or_default())
}
