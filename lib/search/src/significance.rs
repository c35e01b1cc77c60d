// Hypergeometric calibration of Jaccard estimates, plus Hotelling T²

use tracing::warn;

/// Slack tolerated above 1.0 before a probability is reported as invalid
const PROBABILITY_EPSILON: f64 = 1e-9;

/// Largest `m` whose `ln(m!)` is tabulated; above it the Stirling series is used
const TABLE_LIMIT: usize = 1 << 16;

/// `ln(m!)` via Stirling's series. Truncation error is below `1e-20` for
/// `m > TABLE_LIMIT`.
fn stirling_log_factorial(m: usize) -> f64 {
    let x = m as f64;
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    x * x.ln() - x + 0.5 * (2.0 * std::f64::consts::PI * x).ln()
        + inv * (1.0 / 12.0 - inv2 * (1.0 / 360.0 - inv2 / 1260.0))
}

/// Table of `ln(m!)` for small `m`, reused across calls by one worker.
/// Never grows past `TABLE_LIMIT + 1` entries.
#[derive(Debug, Clone)]
pub struct SignificanceScorer {
    log_factorials: Vec<f64>,
}

impl Default for SignificanceScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignificanceScorer {
    pub fn new() -> Self {
        Self {
            log_factorials: vec![0.0],
        }
    }

    fn log_factorial(&mut self, m: usize) -> f64 {
        if m > TABLE_LIMIT {
            return stirling_log_factorial(m);
        }
        let mut last = self.log_factorials.len() - 1;
        if m > last {
            self.log_factorials.reserve(m - last);
            while last < m {
                last += 1;
                let next = self.log_factorials[last - 1] + (last as f64).ln();
                self.log_factorials.push(next);
            }
        }
        self.log_factorials[m]
    }

    /// `ln C(m, n)`; `-inf` when `n > m`
    pub fn log_combination(&mut self, m: usize, n: usize) -> f64 {
        if n > m {
            return f64::NEG_INFINITY;
        }
        self.log_factorial(m) - self.log_factorial(n) - self.log_factorial(m - n)
    }

    /// `ln P(X = i)` for `X ~ Hypergeometric(population, successes, draws)`
    pub fn log_hypergeometric(&mut self, i: usize, successes: usize, draws: usize, population: usize) -> f64 {
        if successes > population || draws > population || i > successes || i > draws {
            return f64::NEG_INFINITY;
        }
        let failures = population - successes;
        if draws - i > failures {
            return f64::NEG_INFINITY;
        }
        self.log_combination(successes, i) + self.log_combination(failures, draws - i)
            - self.log_combination(population, draws)
    }

    /// Calibrated probability that two domains with estimated Jaccard `j`
    /// and sizes `na`, `nb` are drawn from the same domain.
    ///
    /// Returns 0.0 when either domain is empty or `j` is not a finite value
    /// in `[0, 1]`. Results slightly above 1.0 from rounding are clamped; a
    /// larger excess is logged as a data-quality warning and clamped too.
    pub fn same_domain_prob(&mut self, j: f64, na: usize, nb: usize) -> f64 {
        if na == 0 || nb == 0 || !j.is_finite() || !(0.0..=1.0).contains(&j) {
            return 0.0;
        }
        let n = na + nb;
        let mut k = ((j * n as f64) / (1.0 + j)).floor() as usize;
        let cap = na.min(nb);
        if k > cap {
            k = cap;
        }
        let mut total = 0.0;
        for i in 0..=k {
            total += self.log_hypergeometric(i, na, nb, n).exp();
        }
        if total > 1.0 + PROBABILITY_EPSILON || total < 0.0 {
            warn!(
                "same-domain probability {} out of range (jaccard={}, overlap={}, na={}, nb={})",
                total, j, k, na, nb
            );
        }
        total.clamp(0.0, 1.0)
    }
}

/// Convenience wrapper using a fresh table
pub fn same_domain_prob(j: f64, na: usize, nb: usize) -> f64 {
    SignificanceScorer::new().same_domain_prob(j, na, nb)
}

/// Two-sample Hotelling T² statistic under a diagonal covariance model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct T2Statistic {
    pub t2: f64,
    /// F-distribution transform of `t2`
    pub f: f64,
}

impl T2Statistic {
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.t2.is_finite() && self.f.is_finite()
    }
}

/// Variances below this make the pooled covariance treated as singular
const INVERTIBLE_FLOOR: f64 = 0.0001;

/// Hotelling T² between two mean vectors given per-dimension variances and
/// sample sizes. `None` if the dimensions disagree. The result may be NaN
/// or infinite for degenerate inputs; callers must check
/// [`T2Statistic::is_finite`].
pub fn hotelling_t2(
    mean1: &[f64],
    mean2: &[f64],
    var1: &[f64],
    var2: &[f64],
    card1: usize,
    card2: usize,
) -> Option<T2Statistic> {
    let dim = mean1.len();
    if dim == 0 || mean2.len() != dim || var1.len() != dim || var2.len() != dim {
        return None;
    }
    let (n1, n2) = (card1 as f64, card2 as f64);
    let scale = (1.0 / n1 + 1.0 / n2) / (n1 + n2 - 2.0);
    let pooled: Vec<f64> = var1
        .iter()
        .zip(var2)
        .map(|(v1, v2)| ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) * scale)
        .collect();
    // near-singular: shift every diagonal entry by one
    let shift = if pooled.iter().any(|&v| v < INVERTIBLE_FLOOR) { 1.0 } else { 0.0 };

    let t2: f64 = mean1
        .iter()
        .zip(mean2)
        .zip(&pooled)
        .map(|((a, b), v)| {
            let diff = a - b;
            diff * diff / (v + shift)
        })
        .sum();

    let p = dim as f64;
    let n = n1 + n2 - 1.0;
    let f = (n - p) / (p * (n - 1.0)).abs() * t2;
    Some(T2Statistic { t2, f })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_combination() {
        let mut s = SignificanceScorer::new();
        assert!((s.log_combination(5, 2) - 10f64.ln()).abs() < 1e-12);
        assert_eq!(s.log_combination(7, 0), 0.0);
        assert_eq!(s.log_combination(7, 7), 0.0);
        assert_eq!(s.log_combination(3, 4), f64::NEG_INFINITY);
    }

    #[test]
    fn test_log_factorial_table_is_bounded() {
        let mut s = SignificanceScorer::new();
        assert_eq!(s.same_domain_prob(0.0, 20_000_000, 20_000_000), 0.0);
        assert!(s.log_factorials.len() <= TABLE_LIMIT + 1);

        // series and table agree where they meet
        let tabulated = s.log_factorial(TABLE_LIMIT) + ((TABLE_LIMIT + 1) as f64).ln();
        let series = s.log_factorial(TABLE_LIMIT + 1);
        assert!((tabulated - series).abs() < 1e-6 * tabulated.abs().max(1.0));
        assert!((s.log_combination(100_000, 1) - 100_000f64.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_large_domains_stay_calibrated() {
        let mut s = SignificanceScorer::new();
        let n = 200_000;
        assert!(s.same_domain_prob(1.0, n, n) > 0.99);
        let p = s.same_domain_prob(0.5, n, n);
        assert!((0.0..=1.0).contains(&p));
        assert!(s.log_factorials.len() <= TABLE_LIMIT + 1);
    }

    #[test]
    fn test_hypergeometric_sums_to_one() {
        let mut s = SignificanceScorer::new();
        let total: f64 = (0..=6).map(|i| s.log_hypergeometric(i, 10, 6, 16).exp()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_domain_prob_bounds() {
        let mut s = SignificanceScorer::new();
        for &(na, nb) in &[(1, 1), (4, 5), (100, 30), (5000, 7000)] {
            let mut previous = -1.0;
            for step in 0..=20 {
                let j = step as f64 / 20.0;
                let p = s.same_domain_prob(j, na, nb);
                assert!((0.0..=1.0).contains(&p), "p={p} j={j} na={na} nb={nb}");
                assert!(p >= previous - 1e-12, "not monotone at j={j}");
                previous = p;
            }
        }
        assert!(s.same_domain_prob(0.0, 100, 100) < 1e-10);
        assert!(s.same_domain_prob(1.0, 100, 100) > 0.99);
    }

    #[test]
    fn test_same_domain_prob_invalid_input() {
        assert_eq!(same_domain_prob(0.5, 0, 10), 0.0);
        assert_eq!(same_domain_prob(f64::NAN, 10, 10), 0.0);
        assert_eq!(same_domain_prob(1.5, 10, 10), 0.0);
    }

    #[test]
    fn test_hotelling_identical_means() {
        let stat = hotelling_t2(&[1.0, 2.0], &[1.0, 2.0], &[0.5, 0.5], &[0.5, 0.5], 10, 12).unwrap();
        assert_eq!(stat.t2, 0.0);
        assert!(stat.is_finite());
    }

    #[test]
    fn test_hotelling_grows_with_distance() {
        let near = hotelling_t2(&[0.0], &[0.1], &[1.0], &[1.0], 20, 20).unwrap();
        let far = hotelling_t2(&[0.0], &[2.0], &[1.0], &[1.0], 20, 20).unwrap();
        assert!(far.t2 > near.t2);
        assert!(far.f > near.f);
    }

    #[test]
    fn test_hotelling_degenerate() {
        assert!(hotelling_t2(&[0.0, 1.0], &[0.0], &[1.0], &[1.0], 5, 5).is_none());
        // single-sample columns give a non-finite pooled variance
        let stat = hotelling_t2(&[0.0], &[1.0], &[1.0], &[1.0], 1, 1).unwrap();
        assert!(!stat.is_finite());
    }
}
