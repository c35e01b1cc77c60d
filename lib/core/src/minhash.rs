// MinHash signatures: h_i(x) = h1(x) + i * h2(x) over seeded FNV-1a 64

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use crate::forest::HashValues;

/// Value stored at a position that never observed a token
pub const EMPTY_HASH_VALUE: u64 = u64::MAX;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[inline]
fn fnv1a(prefix: &[u8; 8], data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in prefix.iter().chain(data) {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic MinHash signature generator
#[derive(Debug, Clone)]
pub struct MinHasher {
    num_hash: usize,
    seed: u64,
    prefix1: [u8; 8],
    prefix2: [u8; 8],
}

impl MinHasher {
    pub fn new(seed: u64, num_hash: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        // 63-bit draws, written big-endian
        let a: u64 = rng.random::<u64>() >> 1;
        let b: u64 = rng.random::<u64>() >> 1;
        Self {
            num_hash,
            seed,
            prefix1: a.to_be_bytes(),
            prefix2: b.to_be_bytes(),
        }
    }

    #[inline]
    pub fn num_hash(&self) -> usize {
        self.num_hash
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Signature of a bag of tokens. Duplicate tokens do not change the
    /// result; an empty bag yields all [`EMPTY_HASH_VALUE`].
    pub fn signature<I, T>(&self, tokens: I) -> MinHashSignature
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut mins = vec![EMPTY_HASH_VALUE; self.num_hash];
        for token in tokens {
            let bytes = token.as_ref();
            let v1 = fnv1a(&self.prefix1, bytes);
            let v2 = fnv1a(&self.prefix2, bytes);
            for (i, slot) in mins.iter_mut().enumerate() {
                let hv = v1.wrapping_add((i as u64).wrapping_mul(v2));
                if hv < *slot {
                    *slot = hv;
                }
            }
        }
        MinHashSignature { values: mins }
    }
}

/// Fixed-length MinHash signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MinHashSignature {
    values: Vec<u64>,
}

impl MinHashSignature {
    #[inline]
    pub fn new(values: Vec<u64>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when the signature was produced from an empty token bag
    pub fn is_unobserved(&self) -> bool {
        self.values.iter().all(|&v| v == EMPTY_HASH_VALUE)
    }

    /// Estimated Jaccard similarity: fraction of equal positions.
    /// Signatures of different lengths estimate to 0.0.
    pub fn jaccard(&self, other: &MinHashSignature) -> f64 {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return 0.0;
        }
        let matches = self
            .values
            .iter()
            .zip(other.values.iter())
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.values.len() as f64
    }
}

impl From<Vec<u64>> for MinHashSignature {
    fn from(values: Vec<u64>) -> Self {
        Self::new(values)
    }
}

impl HashValues for MinHashSignature {
    #[inline]
    fn num_values(&self) -> usize {
        self.values.len()
    }

    #[inline]
    fn hash_value(&self, i: usize) -> u64 {
        self.values[i]
    }
}
