// Query session coordinator

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use unionx_core::{CancelToken, Error, Result, TopKQueue, UnionPair};
use uuid::Uuid;
use crate::alignment::AlignmentState;
use crate::channel::SimilarityChannel;
use crate::pair::{Pair, SearchResult};
use crate::significance::SignificanceScorer;

/// Per-session search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Columns to align per candidate table
    pub k: usize,
    /// Tables to return
    pub n: usize,
    /// Pairs accumulated before an alignment pass
    pub batch_size: usize,
    /// Capacity of the hit and pair queues
    pub channel_capacity: usize,
    /// Upper bound on scoring workers per channel (also capped by `n`)
    pub scoring_workers: usize,
    /// Shortest probe prefix, in hash values
    pub min_prefix: usize,
    /// Table whose columns never match (usually the query table itself)
    pub exclude_table: Option<String>,
    /// Emit incomplete alignments when every channel runs dry
    pub emit_partial: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k: 3,
            n: 10,
            batch_size: 2000,
            channel_capacity: 1024,
            scoring_workers: 4,
            min_prefix: 0,
            exclude_table: None,
            emit_partial: true,
        }
    }
}

impl SearchConfig {
    pub fn new(k: usize, n: usize) -> Self {
        Self {
            k,
            n,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("k", self.k),
            ("n", self.n),
            ("batch_size", self.batch_size),
            ("channel_capacity", self.channel_capacity),
            ("scoring_workers", self.scoring_workers),
        ] {
            if value == 0 {
                return Err(Error::InvalidParameter(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    fn workers_per_channel(&self) -> usize {
        self.scoring_workers.min(self.n).max(1)
    }
}

/// Counters for one finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub pairs_received: usize,
    /// Pairs for tables that had already been emitted
    pub pairs_skipped: usize,
    pub batches: usize,
    pub completed: usize,
    pub partial: usize,
    /// True if the session stopped because `n` tables were emitted
    pub satisfied: bool,
}

/// A running query session
pub struct SearchSession {
    id: Uuid,
    results: mpsc::Receiver<SearchResult>,
    cancel: CancelToken,
    handle: JoinHandle<Result<SearchStats>>,
}

impl SearchSession {
    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next emitted table, or `None` once the session has finished
    pub async fn next(&mut self) -> Option<SearchResult> {
        self.results.recv().await
    }

    /// Stop every probe and worker; no further results are emitted
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[inline]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Stop consuming and wait for the session to shut down
    pub async fn finish(self) -> Result<SearchStats> {
        drop(self.results);
        self.handle
            .await
            .map_err(|e| Error::Worker(e.to_string()))?
    }
}

/// Top-(N, K) union search over one or more similarity channels
#[derive(Debug, Clone)]
pub struct UnionSearch {
    config: SearchConfig,
}

impl UnionSearch {
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Start a session. Must be called within a tokio runtime.
    ///
    /// Results stream out in completion order.
    pub fn start(&self, channels: Vec<Arc<dyn SimilarityChannel>>) -> SearchSession {
        let id = Uuid::new_v4();
        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel(self.config.n.min(self.config.channel_capacity));
        let span = info_span!("union_search", session = %id, k = self.config.k, n = self.config.n);
        let handle = tokio::spawn(coordinate(self.config.clone(), channels, cancel.clone(), tx).instrument(span));
        SearchSession {
            id,
            results: rx,
            cancel,
            handle,
        }
    }

    /// Run a session to completion and collect its results.
    ///
    /// With more than one channel the results are re-ranked by
    /// k-unionability, best first; otherwise they keep completion order.
    pub async fn search(&self, channels: Vec<Arc<dyn SimilarityChannel>>) -> Result<Vec<SearchResult>> {
        let merged = channels.len() > 1;
        let mut session = self.start(channels);
        let mut results = Vec::new();
        while let Some(result) = session.next().await {
            results.push(result);
        }
        let stats = session.finish().await?;
        debug!("session finished: {:?}", stats);

        if !merged {
            return Ok(results);
        }
        let mut ranking = TopKQueue::new(self.config.n);
        for result in results {
            let score = result.k_unionability;
            ranking.push(result, score);
        }
        Ok(ranking
            .into_descending()
            .into_iter()
            .enumerate()
            .map(|(i, (mut result, _))| {
                result.rank = i + 1;
                result
            })
            .collect())
    }
}

async fn coordinate(
    config: SearchConfig,
    channels: Vec<Arc<dyn SimilarityChannel>>,
    cancel: CancelToken,
    out: mpsc::Sender<SearchResult>,
) -> Result<SearchStats> {
    info!("starting search over {} channels", channels.len());
    let (pair_tx, mut pair_rx) = mpsc::channel::<Pair>(config.channel_capacity);
    let mut workers: Vec<JoinHandle<Result<()>>> = Vec::new();

    for channel in channels {
        let (hit_tx, hit_rx) = std_mpsc::sync_channel::<UnionPair>(config.channel_capacity);

        let probe_channel = channel.clone();
        let probe_cancel = cancel.clone();
        let min_prefix = config.min_prefix;
        let exclude = config.exclude_table.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            probe_channel.probe(min_prefix, &probe_cancel, &mut |hit: UnionPair| {
                if exclude.as_deref() == Some(hit.candidate.table_id.as_str()) {
                    return true;
                }
                hit_tx.send(hit).is_ok()
            })
        }));

        let hit_rx = Arc::new(Mutex::new(hit_rx));
        for _ in 0..config.workers_per_channel() {
            let hits = hit_rx.clone();
            let channel = channel.clone();
            let pairs = pair_tx.clone();
            let cancel = cancel.clone();
            workers.push(tokio::task::spawn_blocking(move || {
                score_hits(&*channel, &hits, &pairs, &cancel)
            }));
        }
    }
    drop(pair_tx);

    let mut state = AlignmentState::new(config.k, config.n);
    let mut batch: TopKQueue<Pair> = TopKQueue::new(config.batch_size);
    let mut stats = SearchStats::default();
    let mut open = true;

    while let Some(pair) = pair_rx.recv().await {
        if cancel.is_cancelled() {
            open = false;
            break;
        }
        stats.pairs_received += 1;
        if state.is_completed(pair.candidate_table()) {
            stats.pairs_skipped += 1;
            continue;
        }
        let score = pair.score;
        batch.push(pair, score);
        if !batch.is_full() {
            continue;
        }
        stats.batches += 1;
        open = emit(&mut state, batch.drain_descending(), &out, &mut stats).await;
        if !open || state.is_done() {
            break;
        }
    }

    if open && !cancel.is_cancelled() && !state.is_done() {
        // exhausted: process what is left
        if !batch.is_empty() {
            stats.batches += 1;
            open = emit(&mut state, batch.drain_descending(), &out, &mut stats).await;
        }
        if open && config.emit_partial && !state.is_done() {
            for result in state.drain_partial() {
                stats.partial += 1;
                if out.send(result).await.is_err() {
                    break;
                }
            }
        }
    }

    stats.satisfied = state.is_done();
    cancel.cancel();
    drop(pair_rx);

    let mut failure = None;
    for worker in workers {
        match worker.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("search worker failed: {}", e);
                failure.get_or_insert(e);
            }
            Err(e) => {
                failure.get_or_insert(Error::Worker(e.to_string()));
            }
        }
    }
    info!(
        "search finished: {} complete, {} partial, {} pairs in {} batches",
        stats.completed, stats.partial, stats.pairs_received, stats.batches
    );
    match failure {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

/// Align one batch and forward completed tables. Returns false once the
/// result receiver is gone.
async fn emit(
    state: &mut AlignmentState,
    batch: Vec<(Pair, f64)>,
    out: &mpsc::Sender<SearchResult>,
    stats: &mut SearchStats,
) -> bool {
    let results = state.process_batch(batch.into_iter().map(|(pair, _)| pair));
    for result in results {
        stats.completed += 1;
        if out.send(result).await.is_err() {
            debug!("result receiver dropped");
            return false;
        }
    }
    true
}

fn score_hits(
    channel: &dyn SimilarityChannel,
    hits: &Mutex<std_mpsc::Receiver<UnionPair>>,
    pairs: &mpsc::Sender<Pair>,
    cancel: &CancelToken,
) -> Result<()> {
    let mut scorer = SignificanceScorer::new();
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let hit = match hits.lock().recv() {
            Ok(hit) => hit,
            Err(_) => return Ok(()),
        };
        match channel.score(&hit, &mut scorer) {
            Ok(Some(pair)) => {
                if pairs.blocking_send(pair).is_err() {
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) if e.is_recoverable() => {
                warn!("skipping {} for query column {}: {}", hit.candidate, hit.query_index, e);
            }
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SetChannel;
    use crate::index::JaccardUnionIndex;
    use crate::pair::Measure;
    use std::collections::HashSet;
    use unionx_core::{ColumnKey, ForestConfig, MinHashSignature, MinHasher};
    use unionx_storage::{ext, MemorySketches, SketchSource};

    fn key(table: &str, col: usize) -> ColumnKey {
        ColumnKey::new(table, col).unwrap()
    }

    fn values(range: std::ops::Range<u32>) -> Vec<String> {
        range.map(|v| format!("v{v}")).collect()
    }

    /// Three candidate tables, each with two columns copying the two query
    /// columns with varying overlap
    fn corpus(mh: &MinHasher) -> (Arc<JaccardUnionIndex>, Vec<MinHashSignature>) {
        let sketches = MemorySketches::new();
        let mut keys = Vec::new();
        for (t, shift) in [("close", 0u32), ("medium", 10), ("far", 30)] {
            for col in 0..2usize {
                let base = col as u32 * 1000;
                let k = key(t, col);
                sketches.insert_minhash(k.clone(), ext::MINHASH, mh.signature(values(base + shift..base + 100)));
                sketches.insert_cardinality(k.clone(), (100 - shift) as usize);
                keys.push(k);
            }
        }
        let source: Arc<dyn SketchSource> = Arc::new(sketches);
        let config = ForestConfig {
            num_hash: 64,
            ..ForestConfig::default()
        };
        let (index, _) = JaccardUnionIndex::build(config, source, ext::MINHASH, keys).unwrap();
        let queries = vec![mh.signature(values(0..100)), mh.signature(values(1000..1100))];
        (Arc::new(index), queries)
    }

    fn set_channel(index: &Arc<JaccardUnionIndex>, queries: &[MinHashSignature]) -> Arc<dyn SimilarityChannel> {
        Arc::new(SetChannel::new(index.clone(), queries.to_vec(), vec![100, 100]).unwrap())
    }

    #[test]
    fn test_config_validation() {
        assert!(SearchConfig::default().validate().is_ok());
        assert!(UnionSearch::new(SearchConfig::new(0, 3)).is_err());
        assert!(UnionSearch::new(SearchConfig { batch_size: 0, ..SearchConfig::default() }).is_err());
    }

    #[tokio::test]
    async fn test_search_returns_complete_one_to_one_alignments() {
        let mh = MinHasher::new(1, 64);
        let (index, queries) = corpus(&mh);
        let search = UnionSearch::new(SearchConfig::new(2, 3)).unwrap();
        let results = search.search(vec![set_channel(&index, &queries)]).await.unwrap();

        assert_eq!(results.len(), 3);
        let tables: HashSet<_> = results.iter().map(|r| r.candidate_table_id.clone()).collect();
        assert_eq!(tables.len(), 3);
        for (i, result) in results.iter().enumerate() {
            assert!(result.complete);
            assert_eq!(result.rank, i + 1);
            assert_eq!(result.alignment.len(), 2);
            let cand: HashSet<_> = result.alignment.iter().map(|p| p.candidate_column()).collect();
            let query: HashSet<_> = result.alignment.iter().map(|p| p.query_column).collect();
            assert_eq!(cand.len(), 2);
            assert_eq!(query.len(), 2);
            assert!(result.alignment[0].score >= result.alignment[1].score);
            assert_eq!(result.k_unionability, result.alignment[1].score);
        }
    }

    #[tokio::test]
    async fn test_stops_after_n_tables() {
        let mh = MinHasher::new(1, 64);
        let (index, queries) = corpus(&mh);
        let search = UnionSearch::new(SearchConfig {
            batch_size: 1,
            ..SearchConfig::new(1, 1)
        })
        .unwrap();
        let mut session = search.start(vec![set_channel(&index, &queries)]);
        let first = session.next().await.unwrap();
        assert_eq!(first.alignment.len(), 1);
        assert!(session.next().await.is_none());
        let stats = session.finish().await.unwrap();
        assert!(stats.satisfied);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn test_partial_results_when_exhausted() {
        let mh = MinHasher::new(1, 64);
        let (index, queries) = corpus(&mh);
        // k larger than the number of query columns: nothing can complete
        let search = UnionSearch::new(SearchConfig::new(3, 2)).unwrap();
        let results = search.search(vec![set_channel(&index, &queries)]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.complete && r.alignment.len() == 2));
        assert!(results[0].k_unionability >= results[1].k_unionability);

        let strict = UnionSearch::new(SearchConfig {
            emit_partial: false,
            ..SearchConfig::new(3, 2)
        })
        .unwrap();
        assert!(strict.search(vec![set_channel(&index, &queries)]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_excluded_table_never_matches() {
        let mh = MinHasher::new(1, 64);
        let (index, queries) = corpus(&mh);
        let search = UnionSearch::new(SearchConfig {
            exclude_table: Some("close".to_string()),
            ..SearchConfig::new(2, 5)
        })
        .unwrap();
        let results = search.search(vec![set_channel(&index, &queries)]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.candidate_table_id != "close"));
    }

    #[tokio::test]
    async fn test_merged_channels_rerank() {
        let mh = MinHasher::new(1, 64);
        let (index, queries) = corpus(&mh);
        let ontology: Arc<dyn SimilarityChannel> =
            Arc::new(SetChannel::ontology(index.clone(), queries.clone(), vec![100, 100]).unwrap());
        let search = UnionSearch::new(SearchConfig::new(2, 3)).unwrap();
        let results = search
            .search(vec![set_channel(&index, &queries), ontology])
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].k_unionability >= pair[1].k_unionability);
        }
        assert_eq!(results[0].rank, 1);
        assert!(results
            .iter()
            .flat_map(|r| r.alignment.iter())
            .all(|p| matches!(p.measure, Measure::Set | Measure::Ontology)));
    }

    #[tokio::test]
    async fn test_cancelled_session_ends() {
        let mh = MinHasher::new(1, 64);
        let (index, queries) = corpus(&mh);
        let search = UnionSearch::new(SearchConfig::new(2, 3)).unwrap();
        let mut session = search.start(vec![set_channel(&index, &queries)]);
        session.cancel();
        while session.next().await.is_some() {}
        assert!(session.finish().await.is_ok());
    }

    #[tokio::test]
    async fn test_unindexed_forest_surfaces_error() {
        struct Unindexed;
        impl SimilarityChannel for Unindexed {
            fn measure(&self) -> Measure {
                Measure::Set
            }
            fn num_queries(&self) -> usize {
                0
            }
            fn probe(&self, _: usize, _: &CancelToken, _: &mut dyn FnMut(UnionPair) -> bool) -> Result<()> {
                Err(Error::NotIndexed)
            }
            fn score(&self, _: &UnionPair, _: &mut SignificanceScorer) -> Result<Option<Pair>> {
                Ok(None)
            }
        }
        let channel: Arc<dyn SimilarityChannel> = Arc::new(Unindexed);
        let search = UnionSearch::new(SearchConfig::default()).unwrap();
        let err = search.search(vec![channel]).await.unwrap_err();
        assert!(matches!(err, Error::NotIndexed));
    }
}
