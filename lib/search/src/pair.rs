use serde::{Deserialize, Serialize};
use std::fmt;
use unionx_core::ColumnKey;

/// Similarity channel a pair was produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    /// MinHash Jaccard over raw values, calibrated by same-domain probability
    Set,
    /// MinHash Jaccard over ontology annotations
    Ontology,
    /// Cosine of mean embeddings
    Embedding,
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Set => write!(f, "set"),
            Measure::Ontology => write!(f, "ontology"),
            Measure::Embedding => write!(f, "embedding"),
        }
    }
}

/// One scored match between a query column and a candidate column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub query_column: usize,
    pub candidate: ColumnKey,
    /// Raw similarity estimate (Jaccard or cosine)
    pub similarity: f64,
    /// Ranking score used for alignment
    pub score: f64,
    pub measure: Measure,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_cardinality: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_cardinality: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t2: Option<f64>,
}

impl Pair {
    pub fn new(query_column: usize, candidate: ColumnKey, similarity: f64, score: f64, measure: Measure) -> Self {
        Self {
            query_column,
            candidate,
            similarity,
            score,
            measure,
            query_cardinality: None,
            candidate_cardinality: None,
            t2: None,
        }
    }

    #[must_use]
    pub fn with_cardinalities(mut self, query: usize, candidate: usize) -> Self {
        self.query_cardinality = Some(query);
        self.candidate_cardinality = Some(candidate);
        self
    }

    #[must_use]
    pub fn with_t2(mut self, t2: f64) -> Self {
        self.t2 = Some(t2);
        self
    }

    #[inline]
    pub fn candidate_table(&self) -> &str {
        &self.candidate.table_id
    }

    #[inline]
    pub fn candidate_column(&self) -> usize {
        self.candidate.column_index
    }
}

/// Alignment of one candidate table against the query table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub candidate_table_id: String,
    /// Aligned pairs, highest score first
    pub alignment: Vec<Pair>,
    /// Score of the weakest aligned pair
    pub k_unionability: f64,
    /// False when the table was emitted with fewer than `k` aligned columns
    pub complete: bool,
    /// 1-based position in emission order
    pub rank: usize,
    pub elapsed_ms: f64,
}

impl SearchResult {
    #[inline]
    pub fn len(&self) -> usize {
        self.alignment.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.alignment.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_json_skips_missing_fields() {
        let pair = Pair::new(1, ColumnKey::new("t", 3).unwrap(), 0.8, 0.95, Measure::Set);
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["measure"], "set");
        assert_eq!(json["candidate"]["table_id"], "t");
        assert!(json.get("t2").is_none());

        let full = pair.with_cardinalities(10, 12).with_t2(1.5);
        let json = serde_json::to_value(&full).unwrap();
        assert_eq!(json["candidate_cardinality"], 12);
        assert_eq!(json["t2"], 1.5);
    }
}
