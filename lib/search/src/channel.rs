// Similarity channels: a forest probe plus exact re-read scoring of its hits

use std::sync::Arc;
use tracing::{debug, warn};
use unionx_core::{CancelToken, ColumnKey, Error, MinHashSignature, Result, UnionPair, Vector};
use unionx_storage::{ext, SketchSource};
use crate::index::{EmbeddingUnionIndex, JaccardUnionIndex};
use crate::pair::{Measure, Pair};
use crate::significance::{hotelling_t2, SignificanceScorer};

/// A source of candidate pairs for one query session.
///
/// `probe` drives the forest query and hands each raw hit to `sink` until
/// the probe is exhausted, `cancel` is raised, or `sink` returns false.
/// `score` turns one hit into a [`Pair`] by re-reading the candidate's
/// stored sketches; `Ok(None)` drops the hit.
pub trait SimilarityChannel: Send + Sync {
    fn measure(&self) -> Measure;

    fn num_queries(&self) -> usize;

    fn probe(&self, min_prefix: usize, cancel: &CancelToken, sink: &mut dyn FnMut(UnionPair) -> bool) -> Result<()>;

    fn score(&self, hit: &UnionPair, scorer: &mut SignificanceScorer) -> Result<Option<Pair>>;
}

fn check_columns(columns: &[usize], queries: usize) -> Result<()> {
    if columns.len() != queries {
        return Err(Error::InvalidParameter(format!(
            "{} query column ids for {} query columns",
            columns.len(),
            queries
        )));
    }
    Ok(())
}

fn query_index_error(hit: &UnionPair, len: usize) -> Error {
    Error::InvalidParameter(format!(
        "hit references query column {} but only {} were given",
        hit.query_index, len
    ))
}

/// Set-overlap channel over a [`JaccardUnionIndex`]. With ontology sketches
/// it becomes the ontology channel.
pub struct SetChannel {
    index: Arc<JaccardUnionIndex>,
    queries: Vec<MinHashSignature>,
    cardinalities: Vec<usize>,
    columns: Vec<usize>,
    measure: Measure,
}

impl SetChannel {
    /// `queries[i]` is the sketch of query column `i` and `cardinalities[i]`
    /// its distinct-value count
    pub fn new(index: Arc<JaccardUnionIndex>, queries: Vec<MinHashSignature>, cardinalities: Vec<usize>) -> Result<Self> {
        Self::with_measure(index, queries, cardinalities, Measure::Set)
    }

    pub fn ontology(index: Arc<JaccardUnionIndex>, queries: Vec<MinHashSignature>, cardinalities: Vec<usize>) -> Result<Self> {
        Self::with_measure(index, queries, cardinalities, Measure::Ontology)
    }

    fn with_measure(
        index: Arc<JaccardUnionIndex>,
        queries: Vec<MinHashSignature>,
        cardinalities: Vec<usize>,
        measure: Measure,
    ) -> Result<Self> {
        if queries.len() != cardinalities.len() {
            return Err(Error::InvalidParameter(format!(
                "{} query sketches but {} cardinalities",
                queries.len(),
                cardinalities.len()
            )));
        }
        let columns = (0..queries.len()).collect();
        Ok(Self {
            index,
            queries,
            cardinalities,
            columns,
            measure,
        })
    }

    /// Report `columns[i]` as the query column of hits on query sketch `i`.
    /// Channels merged into one session must agree on query column ids.
    pub fn with_query_columns(mut self, columns: Vec<usize>) -> Result<Self> {
        check_columns(&columns, self.queries.len())?;
        self.columns = columns;
        Ok(self)
    }
}

impl SimilarityChannel for SetChannel {
    fn measure(&self) -> Measure {
        self.measure
    }

    fn num_queries(&self) -> usize {
        self.queries.len()
    }

    fn probe(&self, min_prefix: usize, cancel: &CancelToken, sink: &mut dyn FnMut(UnionPair) -> bool) -> Result<()> {
        let probe = self
            .index
            .forest()
            .query(&self.queries)?
            .down_to(min_prefix)
            .with_cancel(cancel);
        for hit in probe {
            if !sink(hit) {
                break;
            }
        }
        debug!("{} probe finished", self.measure);
        Ok(())
    }

    fn score(&self, hit: &UnionPair, scorer: &mut SignificanceScorer) -> Result<Option<Pair>> {
        let query = self
            .queries
            .get(hit.query_index)
            .ok_or_else(|| query_index_error(hit, self.queries.len()))?;
        let source = self.index.source();
        let candidate = source.minhash(&hit.candidate, self.index.ext())?;
        let jaccard = candidate.jaccard(query);
        let na = self.cardinalities[hit.query_index];
        let nb = source.cardinality(&hit.candidate)?;
        let score = scorer.same_domain_prob(jaccard, na, nb);
        if score == 0.0 {
            return Ok(None);
        }
        Ok(Some(
            Pair::new(self.columns[hit.query_index], hit.candidate.clone(), jaccard, score, self.measure)
                .with_cardinalities(na, nb),
        ))
    }
}

/// Embedding statistics of one query column
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingQuery {
    pub mean: Vec<f64>,
    /// Per-dimension variance, enables the T² statistic when present
    pub covar: Option<Vec<f64>>,
    pub cardinality: usize,
}

impl EmbeddingQuery {
    pub fn new(mean: Vec<f64>, cardinality: usize) -> Self {
        Self {
            mean,
            covar: None,
            cardinality,
        }
    }

    #[must_use]
    pub fn with_covar(mut self, covar: Vec<f64>) -> Self {
        self.covar = Some(covar);
        self
    }

    /// Load a query column's `ft-mean` vector, plus its `ft-covar` variance
    /// and cardinality when both are stored. A missing mean is returned as a
    /// recoverable error. Missing or malformed variance or cardinality only
    /// leaves T² disabled for the column. Any other error is returned.
    pub fn load(source: &dyn SketchSource, key: &ColumnKey) -> Result<Self> {
        let mean = source.vector(key, ext::FT_MEAN)?;
        let covar = match source.vector(key, ext::FT_COVAR) {
            Ok(covar) => covar,
            Err(e) if e.is_recoverable() => {
                debug!("no variance for query column {}: {}", key, e);
                return Ok(Self::new(mean, 0));
            }
            Err(e) => return Err(e),
        };
        match source.cardinality(key) {
            Ok(cardinality) => Ok(Self::new(mean, cardinality).with_covar(covar)),
            Err(e) if e.is_recoverable() => {
                warn!("query column {} has variance but no cardinality, T2 disabled: {}", key, e);
                Ok(Self::new(mean, 0))
            }
            Err(e) => Err(e),
        }
    }
}

/// Cosine channel over an [`EmbeddingUnionIndex`]. Hits are scored by the
/// exact cosine of the stored mean vectors. Only positively correlated
/// columns become pairs, so the score shares the `[0, 1]` scale of the set
/// channels.
pub struct EmbeddingChannel {
    index: Arc<EmbeddingUnionIndex>,
    queries: Vec<EmbeddingQuery>,
    probe_vectors: Vec<Vec<f64>>,
    columns: Vec<usize>,
}

impl EmbeddingChannel {
    /// Query columns are probed with their mean vector
    pub fn new(index: Arc<EmbeddingUnionIndex>, queries: Vec<EmbeddingQuery>) -> Self {
        let probe_vectors = queries.iter().map(|q| q.mean.clone()).collect();
        let columns = (0..queries.len()).collect();
        Self {
            index,
            queries,
            probe_vectors,
            columns,
        }
    }

    /// Probe with different vectors than the scored means, for indexes
    /// built over another kind of embedding (e.g. `ft-sum`)
    pub fn with_probe_vectors(index: Arc<EmbeddingUnionIndex>, queries: Vec<EmbeddingQuery>, probe_vectors: Vec<Vec<f64>>) -> Result<Self> {
        if queries.len() != probe_vectors.len() {
            return Err(Error::InvalidParameter(format!(
                "{} query columns but {} probe vectors",
                queries.len(),
                probe_vectors.len()
            )));
        }
        let columns = (0..queries.len()).collect();
        Ok(Self {
            index,
            queries,
            probe_vectors,
            columns,
        })
    }

    /// See [`SetChannel::with_query_columns`]
    pub fn with_query_columns(mut self, columns: Vec<usize>) -> Result<Self> {
        check_columns(&columns, self.queries.len())?;
        self.columns = columns;
        Ok(self)
    }
}

impl SimilarityChannel for EmbeddingChannel {
    fn measure(&self) -> Measure {
        Measure::Embedding
    }

    fn num_queries(&self) -> usize {
        self.queries.len()
    }

    fn probe(&self, min_prefix: usize, cancel: &CancelToken, sink: &mut dyn FnMut(UnionPair) -> bool) -> Result<()> {
        let forest = self.index.forest();
        let probe = forest
            .query(&self.probe_vectors)?
            .down_to(min_prefix)
            .with_cancel(cancel);
        for hit in probe {
            if !sink(hit) {
                break;
            }
        }
        debug!("embedding probe finished");
        Ok(())
    }

    fn score(&self, hit: &UnionPair, _scorer: &mut SignificanceScorer) -> Result<Option<Pair>> {
        let query = self
            .queries
            .get(hit.query_index)
            .ok_or_else(|| query_index_error(hit, self.queries.len()))?;
        let source = self.index.source();
        let mean = Vector::new(source.vector(&hit.candidate, ext::FT_MEAN)?);
        let cosine = mean.cosine_similarity(&Vector::from_slice(&query.mean));
        if !cosine.is_finite() || cosine <= 0.0 {
            return Ok(None);
        }
        let mut pair = Pair::new(
            self.columns[hit.query_index],
            hit.candidate.clone(),
            cosine,
            cosine.min(1.0),
            Measure::Embedding,
        );

        if let Some(query_covar) = &query.covar {
            let covar = match source.vector(&hit.candidate, ext::FT_COVAR) {
                Ok(covar) => Some(covar),
                Err(e) if e.is_recoverable() => None,
                Err(e) => return Err(e),
            };
            if let Some(covar) = covar {
                let card = source.cardinality(&hit.candidate)?;
                pair = pair.with_cardinalities(query.cardinality, card);
                if let Some(stat) = hotelling_t2(&query.mean, mean.as_slice(), query_covar, &covar, query.cardinality, card) {
                    if !stat.is_finite() {
                        debug!("dropping {} with non-finite T2", hit.candidate);
                        return Ok(None);
                    }
                    pair = pair.with_t2(stat.t2);
                }
            }
        }
        Ok(Some(pair))
    }
}
