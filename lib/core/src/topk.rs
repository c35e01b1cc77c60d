use ordered_float::OrderedFloat;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Heap entry. Ties on priority fall back to insertion order so a queue
/// always breaks them the same way.
#[derive(Debug, Clone)]
struct Entry<T> {
    priority: OrderedFloat<f64>,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            // earlier insert ranks higher on equal priority
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fixed-capacity queue keeping the `k` highest-priority items.
///
/// Backed by a min-heap so the current minimum is evicted in O(log k).
#[derive(Debug, Clone)]
pub struct TopKQueue<T> {
    k: usize,
    heap: BinaryHeap<Reverse<Entry<T>>>,
    next_seq: u64,
}

impl<T> TopKQueue<T> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(4096) + 1),
            next_seq: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Lowest retained priority
    pub fn min_priority(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(e)| e.priority.into_inner())
    }

    /// Whether a push with `priority` would be retained
    pub fn would_accept(&self, priority: f64) -> bool {
        if priority.is_nan() || self.k == 0 {
            return false;
        }
        match self.heap.peek() {
            _ if self.heap.len() < self.k => true,
            Some(Reverse(min)) => priority > min.priority.into_inner(),
            None => true,
        }
    }

    /// Insert `item` if it ranks in the top `k`, evicting the current
    /// minimum when full. NaN priorities are rejected. Returns whether the
    /// item was retained.
    pub fn push(&mut self, item: T, priority: f64) -> bool {
        if !self.would_accept(priority) {
            return false;
        }
        if self.heap.len() >= self.k {
            self.heap.pop();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry {
            priority: OrderedFloat(priority),
            seq,
            item,
        }));
        true
    }

    /// Remove and return the lowest-priority item
    pub fn pop_min(&mut self) -> Option<(T, f64)> {
        self.heap
            .pop()
            .map(|Reverse(e)| (e.item, e.priority.into_inner()))
    }

    /// Empty the queue, returning items highest priority first
    pub fn drain_descending(&mut self) -> Vec<(T, f64)> {
        let heap = std::mem::take(&mut self.heap);
        let mut entries: Vec<Entry<T>> = heap.into_iter().map(|Reverse(e)| e).collect();
        entries.sort_unstable_by(|a, b| b.cmp(a));
        entries
            .into_iter()
            .map(|e| (e.item, e.priority.into_inner()))
            .collect()
    }

    pub fn into_descending(mut self) -> Vec<(T, f64)> {
        self.drain_descending()
    }
}

impl<T: Clone> TopKQueue<T> {
    /// Snapshot of the queue, highest priority first
    pub fn descending(&self) -> Vec<(T, f64)> {
        self.clone().into_descending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_keeps_top_k() {
        let mut q = TopKQueue::new(3);
        for (i, p) in [0.5, 0.1, 0.9, 0.3, 0.7].into_iter().enumerate() {
            q.push(i, p);
        }
        let items: Vec<_> = q.into_descending();
        assert_eq!(items, vec![(2, 0.9), (4, 0.7), (0, 0.5)]);
    }

    #[test]
    fn test_push_below_min_when_full_is_noop() {
        let mut q = TopKQueue::new(2);
        assert!(q.push("a", 1.0));
        assert!(q.push("b", 2.0));
        assert!(!q.would_accept(1.0));
        assert!(!q.push("c", 0.5));
        assert!(!q.push("d", 1.0));
        assert_eq!(q.len(), 2);
        assert_eq!(q.min_priority(), Some(1.0));
    }

    #[test]
    fn test_nan_rejected() {
        let mut q = TopKQueue::new(4);
        assert!(!q.push(1, f64::NAN));
        assert!(q.is_empty());
    }

    #[test]
    fn test_zero_capacity() {
        let mut q = TopKQueue::new(0);
        assert!(!q.push(1, 1.0));
        assert!(q.is_empty());
    }

    #[test]
    fn test_ties_are_stable_within_queue() {
        let mut q = TopKQueue::new(4);
        for i in 0..4 {
            q.push(i, 1.0);
        }
        let first: Vec<_> = q.descending().into_iter().map(|(i, _)| i).collect();
        let second: Vec<_> = q.descending().into_iter().map(|(i, _)| i).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_bound_holds_under_random_pushes() {
        let mut rng = StdRng::seed_from_u64(11);
        let k = 25;
        let mut q = TopKQueue::new(k);
        let mut pushed = Vec::new();
        for i in 0..5000 {
            let p: f64 = rng.random();
            pushed.push(p);
            q.push(i, p);
            assert!(q.len() <= k);
        }
        pushed.sort_by(|a, b| b.partial_cmp(a).unwrap());
        let kth = pushed[k - 1];
        assert!(q.min_priority().unwrap() >= kth);
        let drained = q.drain_descending();
        assert_eq!(drained.len(), k);
        assert!(drained.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(q.is_empty());
    }

    #[test]
    fn test_pop_min() {
        let mut q = TopKQueue::new(3);
        q.push('x', 3.0);
        q.push('y', 1.0);
        q.push('z', 2.0);
        assert_eq!(q.pop_min(), Some(('y', 1.0)));
        assert_eq!(q.len(), 2);
    }
}
