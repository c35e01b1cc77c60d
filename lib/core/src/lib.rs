//! # unionX Core
//!
//! Core library for the unionX table union search engine.
//!
//! This crate provides the fundamental data structures and algorithms:
//!
//! - [`MinHasher`] / [`MinHashSignature`] - Jaccard sketches of column domains
//! - [`Hyperplanes`] / [`SimHashSignature`] - cosine sketches of embeddings
//! - [`LshForest`] - banded LSH Forest with prefix-shrinking probes
//! - [`TopKQueue`] - bounded priority queue keeping the best `k` items
//! - [`optimal_params`] - `(K, L)` tuning for a similarity threshold
//!
//! ## Example
//!
//! ```rust
//! use unionx_core::{ColumnKey, ForestConfig, MinHashForest, MinHasher};
//!
//! let hasher = MinHasher::new(1, 64);
//! let config = ForestConfig { num_hash: 64, ..ForestConfig::default() };
//! let mut forest = MinHashForest::new(config).unwrap();
//!
//! let cities = ["berlin", "paris", "rome", "madrid"];
//! forest.add(ColumnKey::new("cities", 0).unwrap(), &hasher.signature(cities)).unwrap();
//! forest.index();
//!
//! let hits: Vec<_> = forest.query(&[hasher.signature(cities)]).unwrap().collect();
//! assert_eq!(hits[0].candidate.table_id, "cities");
//! ```

pub mod cancel;
pub mod error;
pub mod forest;
pub mod key;
pub mod minhash;
pub mod params;
pub mod simhash;
pub mod topk;
pub mod vector;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use forest::{CosineForest, ForestConfig, HashValues, LshForest, MinHashForest, Probe, UnionPair};
pub use key::{ColumnKey, KEY_DELIMITER};
pub use minhash::{MinHashSignature, MinHasher, EMPTY_HASH_VALUE};
pub use params::{optimal_params, LshParams};
pub use simhash::{Hyperplanes, SimHashSignature};
pub use topk::TopKQueue;
pub use vector::Vector;
