// Banded LSH forest; queries shrink the probe prefix from K down to a floor

use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::marker::PhantomData;
use tracing::{debug, info};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::key::ColumnKey;
use crate::minhash::MinHashSignature;
use crate::params::{optimal_params, LshParams};
use crate::simhash::{Hyperplanes, SimHashSignature};

/// Position-addressable hash values of a signature
pub trait HashValues {
    fn num_values(&self) -> usize;
    fn hash_value(&self, i: usize) -> u64;
}

/// Construction parameters for a forest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Total hash budget (signature length)
    pub num_hash: usize,
    /// Similarity threshold the band layout is tuned for
    pub threshold: f64,
    /// Bytes kept per hash value in bucket keys (1..=8)
    pub hash_value_size: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_hash: 256,
            threshold: 0.5,
            hash_value_size: 4,
        }
    }
}

type KeyIds = SmallVec<[u32; 4]>;

#[derive(Debug, Clone)]
struct Bucket {
    prefix: Box<[u8]>,
    keys: KeyIds,
}

/// One `(query column, candidate column)` hit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnionPair {
    pub query_index: usize,
    pub candidate: ColumnKey,
}

/// Generic banded forest over signatures of type `S`
#[derive(Debug, Clone)]
pub struct LshForest<S> {
    params: LshParams,
    num_hash: usize,
    hash_value_size: usize,
    keys: Vec<ColumnKey>,
    building: Vec<AHashMap<Box<[u8]>, KeyIds>>,
    tables: Vec<Vec<Bucket>>,
    indexed: bool,
    _signature: PhantomData<fn(&S)>,
}

impl<S: HashValues> LshForest<S> {
    /// Create a forest whose `(K, L)` is chosen by the parameter optimizer
    pub fn new(config: ForestConfig) -> Result<Self> {
        let params = optimal_params(config.num_hash, config.threshold)?;
        Self::with_params(config.num_hash, params, config.hash_value_size)
    }

    pub fn with_params(num_hash: usize, params: LshParams, hash_value_size: usize) -> Result<Self> {
        if !(1..=8).contains(&hash_value_size) {
            return Err(Error::InvalidParameter(format!(
                "hash_value_size must be within 1..=8, got {}",
                hash_value_size
            )));
        }
        if params.k == 0 || params.l == 0 || params.k * params.l > num_hash {
            return Err(Error::InvalidParameter(format!(
                "k={} l={} does not fit num_hash={}",
                params.k, params.l, num_hash
            )));
        }
        Ok(Self {
            params,
            num_hash,
            hash_value_size,
            keys: Vec::new(),
            building: (0..params.l).map(|_| AHashMap::new()).collect(),
            tables: vec![Vec::new(); params.l],
            indexed: false,
            _signature: PhantomData,
        })
    }

    #[inline]
    pub fn params(&self) -> LshParams {
        self.params
    }

    #[inline]
    pub fn num_hash(&self) -> usize {
        self.num_hash
    }

    #[inline]
    pub fn hash_value_size(&self) -> usize {
        self.hash_value_size
    }

    /// Number of inserted keys
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Total buckets across all bands (zero before indexing)
    pub fn bucket_count(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }

    fn check_signature(&self, sig: &S) -> Result<()> {
        let needed = self.params.k * self.params.l;
        if sig.num_values() < needed {
            return Err(Error::SignatureLength {
                expected: needed,
                actual: sig.num_values(),
            });
        }
        Ok(())
    }

    /// Bucket key of `band` using the first `prefix_len` hash values
    fn band_key(&self, sig: &S, band: usize, prefix_len: usize) -> Box<[u8]> {
        let start = band * self.params.k;
        let mut key = Vec::with_capacity(prefix_len * self.hash_value_size);
        for i in start..start + prefix_len {
            let bytes = sig.hash_value(i).to_le_bytes();
            key.extend_from_slice(&bytes[..self.hash_value_size]);
        }
        key.into_boxed_slice()
    }

    /// Insert a key. It becomes visible to queries after [`index`](Self::index).
    pub fn add(&mut self, key: ColumnKey, sig: &S) -> Result<()> {
        if self.indexed {
            return Err(Error::AlreadyIndexed);
        }
        self.check_signature(sig)?;
        let id = u32::try_from(self.keys.len())
            .map_err(|_| Error::InvalidParameter("forest key capacity exceeded".to_string()))?;
        for band in 0..self.params.l {
            let hk = self.band_key(sig, band, self.params.k);
            self.building[band].entry(hk).or_default().push(id);
        }
        self.keys.push(key);
        Ok(())
    }

    /// Freeze the forest: flatten each band into a prefix-sorted bucket list.
    /// Calling it again is a no-op.
    pub fn index(&mut self) {
        if self.indexed {
            return;
        }
        let building = std::mem::take(&mut self.building);
        self.tables = building
            .into_par_iter()
            .map(|table| {
                let mut buckets: Vec<Bucket> = table
                    .into_iter()
                    .map(|(prefix, keys)| Bucket { prefix, keys })
                    .collect();
                buckets.sort_unstable_by(|a, b| a.prefix.cmp(&b.prefix));
                buckets
            })
            .collect();
        self.indexed = true;
        info!(
            "indexed {} keys into {} bands ({} buckets, k={})",
            self.keys.len(),
            self.params.l,
            self.bucket_count(),
            self.params.k
        );
    }

    /// Drop every key and return to the building state
    pub fn clear(&mut self) {
        self.keys.clear();
        self.building = (0..self.params.l).map(|_| AHashMap::new()).collect();
        self.tables = vec![Vec::new(); self.params.l];
        self.indexed = false;
    }

    /// Start a multi-query probe. Fails with [`Error::NotIndexed`] if the
    /// forest has not been frozen yet.
    pub fn query(&self, sigs: &[S]) -> Result<Probe<'_, S>> {
        if !self.indexed {
            return Err(Error::NotIndexed);
        }
        let mut query_keys = Vec::with_capacity(sigs.len());
        for sig in sigs {
            self.check_signature(sig)?;
            let bands: Vec<Box<[u8]>> = (0..self.params.l)
                .map(|band| self.band_key(sig, band, self.params.k))
                .collect();
            query_keys.push(bands);
        }
        Ok(Probe::new(self, query_keys))
    }
}

/// Lazy, deduplicating stream of [`UnionPair`]s.
///
/// Walks prefix lengths from `K` down to the floor; at each length visits
/// every `(band, query)` pair, binary-searches the band's buckets and scans
/// the run of buckets sharing the probe prefix. A pair is yielded at most
/// once per probe.
pub struct Probe<'a, S> {
    forest: &'a LshForest<S>,
    query_keys: Vec<Vec<Box<[u8]>>>,
    prefix_len: usize,
    min_prefix: usize,
    band: usize,
    query: usize,
    bucket: usize,
    key_pos: usize,
    scanning: bool,
    done: bool,
    seen: AHashSet<(u32, u32)>,
    cancel: Option<CancelToken>,
}

impl<'a, S: HashValues> Probe<'a, S> {
    fn new(forest: &'a LshForest<S>, query_keys: Vec<Vec<Box<[u8]>>>) -> Self {
        let done = query_keys.is_empty() || forest.is_empty();
        Self {
            forest,
            query_keys,
            prefix_len: forest.params.k,
            min_prefix: 0,
            band: 0,
            query: 0,
            bucket: 0,
            key_pos: 0,
            scanning: false,
            done,
            seen: AHashSet::new(),
            cancel: None,
        }
    }

    /// Stop shrinking the prefix at `min_prefix` hash values
    #[must_use]
    pub fn down_to(mut self, min_prefix: usize) -> Self {
        self.min_prefix = min_prefix.min(self.forest.params.k);
        self
    }

    /// Terminate as soon as `token` is cancelled
    #[must_use]
    pub fn with_cancel(mut self, token: &CancelToken) -> Self {
        self.cancel = Some(token.clone());
        self
    }

    /// Current probe prefix length in hash values
    #[inline]
    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    fn advance(&mut self) {
        self.scanning = false;
        self.query += 1;
        if self.query < self.query_keys.len() {
            return;
        }
        self.query = 0;
        self.band += 1;
        if self.band < self.forest.params.l {
            return;
        }
        self.band = 0;
        if self.prefix_len <= self.min_prefix {
            self.done = true;
        } else {
            self.prefix_len -= 1;
            debug!("probe prefix is now {}", self.prefix_len);
        }
    }
}

impl<S: HashValues> Iterator for Probe<'_, S> {
    type Item = UnionPair;

    fn next(&mut self) -> Option<UnionPair> {
        let forest = self.forest;
        loop {
            if self.done {
                return None;
            }
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                self.done = true;
                return None;
            }

            let plen = self.prefix_len * forest.hash_value_size;
            let table = &forest.tables[self.band];

            if !self.scanning {
                let probe = &self.query_keys[self.query][self.band][..plen];
                self.bucket = table.partition_point(|b| &b.prefix[..plen] < probe);
                self.key_pos = 0;
                self.scanning = true;
            }

            while self.bucket < table.len()
                && table[self.bucket].prefix[..plen] == self.query_keys[self.query][self.band][..plen]
            {
                let ids = &table[self.bucket].keys;
                while self.key_pos < ids.len() {
                    let id = ids[self.key_pos];
                    self.key_pos += 1;
                    if self.seen.insert((self.query as u32, id)) {
                        return Some(UnionPair {
                            query_index: self.query,
                            candidate: forest.keys[id as usize].clone(),
                        });
                    }
                }
                self.bucket += 1;
                self.key_pos = 0;
            }

            self.advance();
        }
    }
}

/// Forest over MinHash signatures (Jaccard similarity)
pub type MinHashForest = LshForest<MinHashSignature>;

/// Forest over random-hyperplane signatures of dense vectors (cosine
/// similarity). Owns the hyperplanes used for both inserts and queries.
#[derive(Debug, Clone)]
pub struct CosineForest {
    forest: LshForest<SimHashSignature>,
    hyperplanes: Hyperplanes,
}

impl CosineForest {
    /// `config.hash_value_size` is ignored: every hash value is one bit,
    /// stored as one byte of the bucket key.
    pub fn new(config: ForestConfig, dim: usize, seed: u64) -> Result<Self> {
        let params = optimal_params(config.num_hash, config.threshold)?;
        let forest = LshForest::with_params(config.num_hash, params, 1)?;
        let hyperplanes = Hyperplanes::generate(config.num_hash, dim, seed);
        Ok(Self { forest, hyperplanes })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.hyperplanes.dim()
    }

    #[inline]
    pub fn hyperplanes(&self) -> &Hyperplanes {
        &self.hyperplanes
    }

    #[inline]
    pub fn inner(&self) -> &LshForest<SimHashSignature> {
        &self.forest
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.forest.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.forest.is_empty()
    }

    pub fn add(&mut self, key: ColumnKey, vector: &[f64]) -> Result<()> {
        if self.forest.is_indexed() {
            return Err(Error::AlreadyIndexed);
        }
        let sig = self.hyperplanes.signature(vector)?;
        self.forest.add(key, &sig)
    }

    pub fn index(&mut self) {
        self.forest.index();
    }

    pub fn query(&self, vectors: &[Vec<f64>]) -> Result<Probe<'_, SimHashSignature>> {
        if !self.forest.is_indexed() {
            return Err(Error::NotIndexed);
        }
        let sigs = vectors
            .iter()
            .map(|v| self.hyperplanes.signature(v))
            .collect::<Result<Vec<_>>>()?;
        self.forest.query(&sigs)
    }
}
