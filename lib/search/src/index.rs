use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use unionx_core::{ColumnKey, CosineForest, ForestConfig, MinHashForest, Result};
use unionx_storage::SketchSource;

const PROGRESS_INTERVAL: usize = 1000;

/// Outcome of building a union index
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BuildStats {
    pub indexed: usize,
    /// Columns whose sketch was missing or unusable
    pub skipped: usize,
    pub elapsed_ms: f64,
}

/// MinHash forest over one kind of set sketch, plus the source it was
/// built from for exact re-reads at query time
pub struct JaccardUnionIndex {
    forest: MinHashForest,
    source: Arc<dyn SketchSource>,
    ext: String,
}

impl JaccardUnionIndex {
    /// Build from the sketches of kind `ext` of every column in `keys`.
    /// Missing or malformed sketches are skipped; other errors abort.
    pub fn build<I>(config: ForestConfig, source: Arc<dyn SketchSource>, ext: &str, keys: I) -> Result<(Self, BuildStats)>
    where
        I: IntoIterator<Item = ColumnKey>,
    {
        let start = Instant::now();
        let mut forest = MinHashForest::new(config)?;
        let mut stats = BuildStats::default();
        for key in keys {
            let added = source
                .minhash(&key, ext)
                .and_then(|sig| forest.add(key.clone(), &sig));
            match added {
                Ok(()) => {
                    stats.indexed += 1;
                    if stats.indexed % PROGRESS_INTERVAL == 0 {
                        info!("indexed {} {} domains", stats.indexed, ext);
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!("skipping {}: {}", key, e);
                    stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        forest.index();
        stats.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            "built {} index: {} columns, {} skipped in {:.1} ms",
            ext, stats.indexed, stats.skipped, stats.elapsed_ms
        );
        Ok((
            Self {
                forest,
                source,
                ext: ext.to_string(),
            },
            stats,
        ))
    }

    #[inline]
    pub fn forest(&self) -> &MinHashForest {
        &self.forest
    }

    #[inline]
    pub fn source(&self) -> &Arc<dyn SketchSource> {
        &self.source
    }

    /// Sketch kind the index was built from
    #[inline]
    pub fn ext(&self) -> &str {
        &self.ext
    }
}

/// Cosine forest over embedding vectors of one kind
pub struct EmbeddingUnionIndex {
    forest: CosineForest,
    source: Arc<dyn SketchSource>,
    ext: String,
}

impl EmbeddingUnionIndex {
    /// Build from the vectors of kind `ext`. Hyperplanes are drawn from
    /// `seed`; vectors whose length differs from `dim` are skipped.
    pub fn build<I>(
        config: ForestConfig,
        dim: usize,
        seed: u64,
        source: Arc<dyn SketchSource>,
        ext: &str,
        keys: I,
    ) -> Result<(Self, BuildStats)>
    where
        I: IntoIterator<Item = ColumnKey>,
    {
        let start = Instant::now();
        let mut forest = CosineForest::new(config, dim, seed)?;
        let mut stats = BuildStats::default();
        for key in keys {
            let added = source
                .vector(&key, ext)
                .and_then(|vector| forest.add(key.clone(), &vector));
            match added {
                Ok(()) => {
                    stats.indexed += 1;
                    if stats.indexed % PROGRESS_INTERVAL == 0 {
                        info!("indexed {} {} domains", stats.indexed, ext);
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!("skipping {}: {}", key, e);
                    stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        forest.index();
        stats.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            "built {} index: {} columns, {} skipped in {:.1} ms",
            ext, stats.indexed, stats.skipped, stats.elapsed_ms
        );
        Ok((
            Self {
                forest,
                source,
                ext: ext.to_string(),
            },
            stats,
        ))
    }

    #[inline]
    pub fn forest(&self) -> &CosineForest {
        &self.forest
    }

    #[inline]
    pub fn source(&self) -> &Arc<dyn SketchSource> {
        &self.source
    }

    #[inline]
    pub fn ext(&self) -> &str {
        &self.ext
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unionx_core::{MinHashSignature, MinHasher};
    use unionx_storage::{ext, MemorySketches};

    fn config() -> ForestConfig {
        ForestConfig {
            num_hash: 64,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_build_skips_missing_and_short_sketches() {
        let sketches = MemorySketches::new();
        let mh = MinHasher::new(1, 64);
        let good = ColumnKey::new("t", 0).unwrap();
        let short = ColumnKey::new("t", 1).unwrap();
        let missing = ColumnKey::new("t", 2).unwrap();
        sketches.insert_minhash(good.clone(), ext::MINHASH, mh.signature(["a", "b"]));
        sketches.insert_minhash(short.clone(), ext::MINHASH, MinHashSignature::new(vec![1, 2]));

        let (index, stats) =
            JaccardUnionIndex::build(config(), Arc::new(sketches), ext::MINHASH, vec![good, short, missing]).unwrap();
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.skipped, 2);
        assert!(index.forest().is_indexed());
        assert_eq!(index.ext(), ext::MINHASH);
    }

    #[test]
    fn test_build_embedding_index() {
        let sketches = MemorySketches::new();
        let a = ColumnKey::new("t", 0).unwrap();
        let wrong_dim = ColumnKey::new("t", 1).unwrap();
        sketches.insert_vector(a.clone(), ext::FT_MEAN, vec![1.0, 0.0, 0.5]);
        sketches.insert_vector(wrong_dim.clone(), ext::FT_MEAN, vec![1.0]);

        let (index, stats) =
            EmbeddingUnionIndex::build(config(), 3, 7, Arc::new(sketches), ext::FT_MEAN, vec![a, wrong_dim]).unwrap();
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(index.forest().dim(), 3);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let cfg = ForestConfig {
            threshold: 2.0,
            ..config()
        };
        let result = JaccardUnionIndex::build(cfg, Arc::new(MemorySketches::new()), ext::MINHASH, Vec::new());
        assert!(result.is_err());
    }
}
