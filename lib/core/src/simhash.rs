// Random-hyperplane signatures for cosine similarity

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use crate::error::{Error, Result};
use crate::forest::HashValues;
use crate::vector::dot;

/// `num_hash` standard-normal hyperplanes of dimension `dim`
#[derive(Debug, Clone)]
pub struct Hyperplanes {
    dim: usize,
    planes: Vec<Vec<f64>>,
}

impl Hyperplanes {
    pub fn generate(num_hash: usize, dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut planes = Vec::with_capacity(num_hash);
        for _ in 0..num_hash {
            let plane: Vec<f64> = (0..dim)
                .map(|_| -> f64 { StandardNormal.sample(&mut rng) })
                .collect();
            planes.push(plane);
        }
        Self { dim, planes }
    }

    #[inline]
    pub fn num_hash(&self) -> usize {
        self.planes.len()
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn signature(&self, vector: &[f64]) -> Result<SimHashSignature> {
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        let mut sig = SimHashSignature::zeros(self.planes.len());
        for (i, plane) in self.planes.iter().enumerate() {
            if dot(plane, vector) >= 0.0 {
                sig.set(i);
            }
        }
        Ok(sig)
    }
}

/// Bit-packed SimHash signature, one bit per hyperplane
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimHashSignature {
    words: Vec<u64>,
    len: usize,
}

impl SimHashSignature {
    fn zeros(len: usize) -> Self {
        Self {
            words: vec![0; (len + 63) / 64],
            len,
        }
    }

    #[inline]
    fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1u64 << (i % 64);
    }

    #[inline]
    pub fn bit(&self, i: usize) -> bool {
        (self.words[i / 64] >> (i % 64)) & 1 == 1
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn hamming_distance(&self, other: &SimHashSignature) -> usize {
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones() as usize)
            .sum()
    }

    /// Fraction of positions on which both signatures agree
    pub fn agreement(&self, other: &SimHashSignature) -> f64 {
        if self.len != other.len || self.len == 0 {
            return 0.0;
        }
        1.0 - self.hamming_distance(other) as f64 / self.len as f64
    }

    /// Cosine estimate recovered from the bit agreement
    pub fn estimated_cosine(&self, other: &SimHashSignature) -> f64 {
        (std::f64::consts::PI * (1.0 - self.agreement(other))).cos()
    }
}

impl HashValues for SimHashSignature {
    #[inline]
    fn num_values(&self) -> usize {
        self.len
    }

    #[inline]
    fn hash_value(&self, i: usize) -> u64 {
        u64::from(self.bit(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let hp = Hyperplanes::generate(100, 8, 42);
        let v = [0.3, -1.0, 2.0, 0.0, 0.5, 0.5, -0.2, 1.1];
        assert_eq!(hp.signature(&v).unwrap(), hp.signature(&v).unwrap());
        let again = Hyperplanes::generate(100, 8, 42);
        assert_eq!(hp.signature(&v).unwrap(), again.signature(&v).unwrap());
    }

    #[test]
    fn test_dimension_mismatch() {
        let hp = Hyperplanes::generate(16, 4, 1);
        assert!(matches!(
            hp.signature(&[1.0, 2.0]),
            Err(Error::DimensionMismatch { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_similar_vectors_agree_more() {
        let hp = Hyperplanes::generate(256, 16, 9);
        let a: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let near: Vec<f64> = a.iter().map(|x| x + 0.1).collect();
        let far: Vec<f64> = a.iter().map(|x| -x).collect();
        let sa = hp.signature(&a).unwrap();
        assert!(sa.agreement(&hp.signature(&near).unwrap()) > 0.9);
        assert!(sa.agreement(&hp.signature(&far).unwrap()) < 0.1);
        assert_eq!(sa.agreement(&sa), 1.0);
    }

    #[test]
    fn test_zero_vector_sets_all_bits() {
        let hp = Hyperplanes::generate(70, 3, 5);
        let sig = hp.signature(&[0.0, 0.0, 0.0]).unwrap();
        assert!((0..70).all(|i| sig.bit(i)));
        assert_eq!(sig.hash_value(69), 1);
    }
}
