// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod entangler;
pub use entangler::*;
pub mod client;
pub use client::{Client, Event, Progress, UploadResult};
pub mod config;
pub use config::*;
pub mod flatten;
pub use flatten::{flatten, FlattenedSequence, Swap};
pub mod lattice;
pub mod metadata;
pub use metadata::Metadata;
pub mod parity;
pub mod tree;
pub use tree::{fetch_tree, MerkleTree, NodeId, TreeNode};

mod executer;
