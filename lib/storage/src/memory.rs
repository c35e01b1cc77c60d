use ahash::AHashMap;
use parking_lot::RwLock;
use std::path::PathBuf;
use unionx_core::{ColumnKey, Error, MinHashSignature, Result};
use crate::store::SketchSource;

/// In-memory sketches, used when signatures are produced in-process
/// rather than read from a domain directory
#[derive(Debug, Default)]
pub struct MemorySketches {
    minhashes: RwLock<AHashMap<(String, ColumnKey), MinHashSignature>>,
    vectors: RwLock<AHashMap<(String, ColumnKey), Vec<f64>>>,
    cardinalities: RwLock<AHashMap<ColumnKey, usize>>,
}

fn missing(key: &ColumnKey, ext: &str) -> Error {
    Error::MissingSketch(PathBuf::from(format!("{}.{}", key, ext)))
}

impl MemorySketches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_minhash(&self, key: ColumnKey, ext: &str, sig: MinHashSignature) {
        self.minhashes.write().insert((ext.to_string(), key), sig);
    }

    pub fn insert_vector(&self, key: ColumnKey, ext: &str, vector: Vec<f64>) {
        self.vectors.write().insert((ext.to_string(), key), vector);
    }

    pub fn insert_cardinality(&self, key: ColumnKey, cardinality: usize) {
        self.cardinalities.write().insert(key, cardinality);
    }

    /// All columns holding a MinHash sketch of kind `ext`, sorted by key
    pub fn minhash_keys(&self, ext: &str) -> Vec<ColumnKey> {
        let mut keys: Vec<_> = self
            .minhashes
            .read()
            .keys()
            .filter(|(e, _)| e == ext)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// All columns holding a vector of kind `ext`, sorted by key
    pub fn vector_keys(&self, ext: &str) -> Vec<ColumnKey> {
        let mut keys: Vec<_> = self
            .vectors
            .read()
            .keys()
            .filter(|(e, _)| e == ext)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl SketchSource for MemorySketches {
    fn minhash(&self, key: &ColumnKey, ext: &str) -> Result<MinHashSignature> {
        self.minhashes
            .read()
            .get(&(ext.to_string(), key.clone()))
            .cloned()
            .ok_or_else(|| missing(key, ext))
    }

    fn vector(&self, key: &ColumnKey, ext: &str) -> Result<Vec<f64>> {
        self.vectors
            .read()
            .get(&(ext.to_string(), key.clone()))
            .cloned()
            .ok_or_else(|| missing(key, ext))
    }

    fn cardinality(&self, key: &ColumnKey) -> Result<usize> {
        self.cardinalities
            .read()
            .get(key)
            .copied()
            .ok_or_else(|| missing(key, crate::ext::CARDINALITY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext;

    #[test]
    fn test_lookup_by_kind() {
        let sketches = MemorySketches::new();
        let k = ColumnKey::new("t", 2).unwrap();
        sketches.insert_minhash(k.clone(), ext::MINHASH, MinHashSignature::new(vec![7, 8]));
        sketches.insert_cardinality(k.clone(), 10);

        assert_eq!(sketches.minhash(&k, ext::MINHASH).unwrap().values(), &[7, 8]);
        assert_eq!(sketches.cardinality(&k).unwrap(), 10);
        assert!(matches!(
            sketches.minhash(&k, ext::ONT_MINHASH),
            Err(Error::MissingSketch(_))
        ));
        assert_eq!(sketches.minhash_keys(ext::MINHASH), vec![k]);
        assert!(sketches.vector_keys(ext::FT_MEAN).is_empty());
    }
}
