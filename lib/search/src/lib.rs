//! # unionX Search
//!
//! Query-time side of table union search. A [`UnionSearch`] session drives
//! one or more [`SimilarityChannel`]s, scores their raw forest hits by
//! re-reading the stored sketches, and aligns candidate columns one-to-one
//! with the query columns until `n` tables have `k` aligned columns each.

pub mod alignment;
pub mod channel;
pub mod index;
pub mod pair;
pub mod session;
pub mod significance;

pub use alignment::AlignmentState;
pub use channel::{EmbeddingChannel, EmbeddingQuery, SetChannel, SimilarityChannel};
pub use index::{BuildStats, EmbeddingUnionIndex, JaccardUnionIndex};
pub use pair::{Measure, Pair, SearchResult};
pub use session::{SearchConfig, SearchSession, SearchStats, UnionSearch};
pub use significance::{hotelling_t2, same_domain_prob, SignificanceScorer, T2Statistic};
