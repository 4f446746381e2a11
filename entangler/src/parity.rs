// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Maximum number of strands a 2-D lattice supports.
pub const MAX_STRANDS: usize = 3;

/// Enum representing the direction of a strand through the lattice.
/// Strand is bi-directional. `Direction` should be used if the direction matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrandType {
    Horizontal,
    Right,
    Left,
}

/// Direction of travel along a strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

impl StrandType {
    /// Strands in the order they are taken for increasing alpha.
    pub fn all() -> [StrandType; MAX_STRANDS] {
        [StrandType::Horizontal, StrandType::Right, StrandType::Left]
    }

    /// Row offset of one forward step along the strand.
    /// The column offset of a forward step is always +1.
    pub fn to_i64(self) -> i64 {
        match self {
            StrandType::Horizontal => 0,
            StrandType::Right => 1,
            StrandType::Left => -1,
        }
    }

    /// Turns the strand type into an integer that can be used for indexing into a vector.
    /// The order is: Horizontal, Right, Left.
    pub fn to_index(self) -> usize {
        match self {
            StrandType::Horizontal => 0,
            StrandType::Right => 1,
            StrandType::Left => 2,
        }
    }

    /// Converts an index into a strand type.
    /// The order is: Horizontal, Right, Left.
    pub fn try_from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(StrandType::Horizontal),
            1 => Some(StrandType::Right),
            2 => Some(StrandType::Left),
            _ => None,
        }
    }
}

/// One parity block of a strand's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParityBlock {
    pub data: Bytes,
    pub strand: StrandType,
    /// Position of the block within its chain.
    pub index: usize,
    /// Lattice position of the data chunk this block incorporates.
    pub source: usize,
    /// Lattice position of the preceding parity block on the same strand.
    /// `None` for chain heads.
    pub prev: Option<usize>,
}

impl ParityBlock {
    pub fn is_head(&self) -> bool {
        self.prev.is_none()
    }
}

/// The finalized parity blocks of one strand, ordered by lattice position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParityChain {
    pub strand: StrandType,
    pub blocks: Vec<ParityBlock>,
}

impl ParityChain {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&ParityBlock> {
        self.blocks.get(pos)
    }
}

/// XORs two chunks byte-wise, zero-padding the shorter one to the longer length.
pub fn xor_chunks(chunk1: &[u8], chunk2: &[u8]) -> Bytes {
    let (long, short) = if chunk1.len() >= chunk2.len() {
        (chunk1, chunk2)
    } else {
        (chunk2, chunk1)
    };
    let mut chunk = long.to_vec();
    for (b, s) in chunk.iter_mut().zip(short) {
        *b ^= s;
    }
    Bytes::from(chunk)
}

/// Zero-pads the chunk up to `len`. Longer chunks are returned unchanged.
pub fn pad_chunk(chunk: &Bytes, len: usize) -> Bytes {
    if chunk.len() >= len {
        return chunk.clone();
    }
    let mut padded = chunk.to_vec();
    padded.resize(len, 0);
    Bytes::from(padded)
}
