//! # unionX Storage
//!
//! Read access to the per-column sketches a corpus is indexed from.
//!
//! Sketches live at `{domain_dir}/{table_id}/{column_index}.{ext}`. MinHash
//! signatures are big-endian `u64` words, embedding statistics big-endian
//! `f64` words, and cardinality files hold one integer on their first line.

pub mod codec;
pub mod memory;
pub mod store;

pub use memory::MemorySketches;
pub use store::{SketchSource, SketchStore};

/// Sketch file extensions
pub mod ext {
    pub const MINHASH: &str = "minhash";
    pub const ONT_MINHASH: &str = "ont-minhash-l1";
    pub const CARDINALITY: &str = "card";
    pub const FT_SUM: &str = "ft-sum";
    pub const FT_MEAN: &str = "ft-mean";
    pub const FT_COVAR: &str = "ft-covar";
}
