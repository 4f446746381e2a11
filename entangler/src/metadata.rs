// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::parity::StrandType;

/// Record stored next to an entangled file. It maps every chunk of the file to its lattice
/// position and lists the parity blocks of each strand in lattice order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub alpha: u8,
    pub s: u8,
    pub p: u8,
    pub root_cid: String,
    /// 0-based lattice position of every chunk, i.e. its index in the flattened sequence. Readers
    /// expecting 1-based positions must add one.
    /// If a CID occurs at several positions (duplicate chunks), the last one is kept.
    pub position_by_cid: HashMap<String, usize>,
    /// One list per strand, indexed by [`StrandType::to_index`].
    pub parity_cids: Vec<Vec<String>>,
}

impl Metadata {
    pub fn position_of(&self, cid: &str) -> Option<usize> {
        self.position_by_cid.get(cid).copied()
    }

    pub fn parity_cids_for(&self, strand: StrandType) -> Option<&[String]> {
        self.parity_cids.get(strand.to_index()).map(Vec::as_slice)
    }

    pub fn num_positions(&self) -> usize {
        self.parity_cids.first().map(Vec::len).unwrap_or(0)
    }
}
