// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! # Entanglement Storage Library
//!
//! The storage library is the content-addressed block store the entangler works against. Files
//! are kept as Merkle DAGs of blocks, parity blocks as single raw blocks, and every block is
//! addressed by its CID.
//!
//! ## Modules
//!
//! - [`storage`](storage): Defines the [`Storage`](storage::Storage) trait and the error type.
//! - [`dag`](dag): Block format and the balanced DAG layout used for files.
//! - [`memory`](memory): In-process store.
//! - [`fs`](fs): Store keeping one file per block in a directory.
//! - [`mock`](mock): A store with failure injection for tests (feature `mock`).
//!
//! ## Usage
//!
//! ```rust
//! use merkle_entangler_storage::{memory::MemoryStorage, Storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = MemoryStorage::new();
//!     let cid = storage.add_file(b"Hello, world!".to_vec()).await?;
//!
//!     for child in storage.links(&cid).await? {
//!         let chunk = storage.chunk_data(&child).await?;
//!         println!("Got chunk {}: {} bytes", child, chunk.len());
//!     }
//!     assert_eq!(storage.get_file(&cid).await?, b"Hello, world!".to_vec());
//!     Ok(())
//! }
//! ```

pub mod dag;
pub mod fs;
pub mod memory;
pub mod storage;
pub use storage::*;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
