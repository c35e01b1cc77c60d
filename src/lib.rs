//! # unionX
//!
//! Table union search: given a query table, find the corpus tables whose
//! columns can be matched one-to-one with the query's columns.
//!
//! Column domains are sketched with MinHash (value overlap) or random
//! hyperplanes (embedding cosine) and indexed in banded LSH forests. A query
//! session probes the forests with shrinking prefixes, calibrates every hit
//! into a same-domain probability, and greedily aligns columns per
//! candidate table until `n` tables have `k` aligned columns.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! unionx --domain-dir ./domains --query-table open/cities.csv -k 3 -n 10
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use unionx::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let store: Arc<dyn SketchSource> = Arc::new(SketchStore::new("./domains"));
//! let keys = SketchStore::new("./domains").scan(ext::MINHASH)?.into_iter().map(|(k, _)| k);
//! let (index, _stats) = JaccardUnionIndex::build(ForestConfig::default(), store, ext::MINHASH, keys)?;
//!
//! let hasher = MinHasher::new(1, 256);
//! let query = vec![hasher.signature(["berlin", "paris", "rome"])];
//! let channel: Arc<dyn SimilarityChannel> = Arc::new(SetChannel::new(Arc::new(index), query, vec![3])?);
//!
//! let search = UnionSearch::new(SearchConfig::new(1, 10))?;
//! for result in search.search(vec![channel]).await? {
//!     println!("{} {:.3}", result.candidate_table_id, result.k_unionability);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`unionx-core`](https://docs.rs/unionx-core) - Signatures, LSH forests, top-k queue, parameter tuning
//! - [`unionx-storage`](https://docs.rs/unionx-storage) - Sketch files and in-memory sketch sources
//! - [`unionx-search`](https://docs.rs/unionx-search) - Channels, significance scoring, alignment sessions

// Re-export core types
pub use unionx_core::{
    optimal_params, CancelToken, ColumnKey, CosineForest, Error, ForestConfig, Hyperplanes, LshForest,
    LshParams, MinHashForest, MinHashSignature, MinHasher, Result, SimHashSignature, TopKQueue, UnionPair,
    Vector,
};

// Re-export storage
pub use unionx_storage::{ext, MemorySketches, SketchSource, SketchStore};

// Re-export search
pub use unionx_search::{
    same_domain_prob, BuildStats, EmbeddingChannel, EmbeddingQuery, EmbeddingUnionIndex, JaccardUnionIndex,
    Measure, Pair, SearchConfig, SearchResult, SearchSession, SearchStats, SetChannel, SimilarityChannel,
    UnionSearch,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ext, CancelToken, ColumnKey, Error, ForestConfig, JaccardUnionIndex, EmbeddingUnionIndex,
        MemorySketches, MinHashForest, MinHasher, Result, SearchConfig, SearchResult, SetChannel,
        EmbeddingChannel, EmbeddingQuery, SimilarityChannel, SketchSource, SketchStore, UnionSearch,
    };
}
