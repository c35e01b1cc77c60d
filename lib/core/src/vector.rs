use serde::{Deserialize, Serialize};

/// A dense column embedding (sum or mean of value embeddings)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vector {
    data: Vec<f64>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f64>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn from_slice(data: &[f64]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn into_inner(self) -> Vec<f64> {
        self.data
    }

    #[inline]
    pub fn dot(&self, other: &[f64]) -> f64 {
        dot(&self.data, other)
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        dot(&self.data, &self.data).sqrt()
    }

    /// Exact cosine similarity. Zero vectors and mismatched dimensions
    /// compare as 0.0.
    #[inline]
    pub fn cosine_similarity(&self, other: &Vector) -> f64 {
        if self.dim() != other.dim() {
            return 0.0;
        }

        let norm_a = self.norm();
        let norm_b = other.norm();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        self.dot(&other.data) / (norm_a * norm_b)
    }
}

impl From<Vec<f64>> for Vector {
    fn from(data: Vec<f64>) -> Self {
        Vector::new(data)
    }
}

#[inline]
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
