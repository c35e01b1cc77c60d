// Greedy one-to-one column alignment per candidate table

use ahash::{AHashMap, AHashSet};
use std::time::Instant;
use tracing::debug;
use unionx_core::TopKQueue;
use crate::pair::{Pair, SearchResult};

#[derive(Debug)]
struct TableAlignment {
    pairs: TopKQueue<Pair>,
    candidate_columns: AHashSet<usize>,
    query_columns: AHashSet<usize>,
}

impl TableAlignment {
    fn new(k: usize) -> Self {
        Self {
            pairs: TopKQueue::new(k),
            candidate_columns: AHashSet::new(),
            query_columns: AHashSet::new(),
        }
    }

    fn has_used(&self, pair: &Pair) -> bool {
        self.candidate_columns.contains(&pair.candidate_column())
            || self.query_columns.contains(&pair.query_column)
    }
}

/// Alignment bookkeeping for one query session
#[derive(Debug)]
pub struct AlignmentState {
    k: usize,
    n: usize,
    completed: AHashSet<String>,
    partial: AHashMap<String, TableAlignment>,
    emitted: usize,
    started: Instant,
}

impl AlignmentState {
    pub fn new(k: usize, n: usize) -> Self {
        Self {
            k,
            n,
            completed: AHashSet::new(),
            partial: AHashMap::new(),
            emitted: 0,
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn is_completed(&self, table_id: &str) -> bool {
        self.completed.contains(table_id)
    }

    /// True once `n` tables have been emitted
    #[inline]
    pub fn is_done(&self) -> bool {
        self.emitted >= self.n
    }

    #[inline]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Tables with at least one accepted pair that are not yet completed
    #[inline]
    pub fn partial_tables(&self) -> usize {
        self.partial.len()
    }

    /// Offer one pair. Returns the table's result if this pair completed it.
    pub fn offer(&mut self, pair: Pair) -> Option<SearchResult> {
        if self.is_done() || self.is_completed(pair.candidate_table()) {
            return None;
        }
        let table_id = pair.candidate_table().to_string();
        let k = self.k;
        let table = self
            .partial
            .entry(table_id.clone())
            .or_insert_with(|| TableAlignment::new(k));
        if table.has_used(&pair) {
            return None;
        }
        table.candidate_columns.insert(pair.candidate_column());
        table.query_columns.insert(pair.query_column);
        let score = pair.score;
        table.pairs.push(pair, score);
        if table.pairs.len() < k {
            return None;
        }

        let table = self.partial.remove(&table_id)?;
        self.completed.insert(table_id.clone());
        self.emitted += 1;
        debug!("table {} completed ({} of {})", table_id, self.emitted, self.n);
        Some(self.result(table_id, table, true))
    }

    /// Process a batch ordered best first, stopping as soon as `n` tables
    /// have been emitted
    pub fn process_batch<I>(&mut self, pairs: I) -> Vec<SearchResult>
    where
        I: IntoIterator<Item = Pair>,
    {
        let mut results = Vec::new();
        for pair in pairs {
            if self.is_done() {
                break;
            }
            if let Some(result) = self.offer(pair) {
                results.push(result);
            }
        }
        results
    }

    /// Emit the incomplete tables, best k-unionability first, up to the
    /// remaining result budget
    pub fn drain_partial(&mut self) -> Vec<SearchResult> {
        let remaining = self.n.saturating_sub(self.emitted);
        let mut tables: Vec<(String, TableAlignment)> = self
            .partial
            .drain()
            .filter(|(_, t)| !t.pairs.is_empty())
            .collect();
        let mut results: Vec<SearchResult> = Vec::with_capacity(tables.len());
        for (table_id, table) in tables.drain(..) {
            results.push(self.result(table_id, table, false));
        }
        results.sort_by(|a, b| {
            b.k_unionability
                .total_cmp(&a.k_unionability)
                .then_with(|| b.len().cmp(&a.len()))
                .then_with(|| a.candidate_table_id.cmp(&b.candidate_table_id))
        });
        results.truncate(remaining);
        for result in results.iter_mut() {
            self.emitted += 1;
            result.rank = self.emitted;
            self.completed.insert(result.candidate_table_id.clone());
        }
        results
    }

    fn result(&self, candidate_table_id: String, table: TableAlignment, complete: bool) -> SearchResult {
        let alignment: Vec<Pair> = table
            .pairs
            .into_descending()
            .into_iter()
            .map(|(pair, _)| pair)
            .collect();
        let k_unionability = alignment.last().map_or(0.0, |p| p.score);
        SearchResult {
            candidate_table_id,
            alignment,
            k_unionability,
            complete,
            rank: self.emitted,
            elapsed_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}
