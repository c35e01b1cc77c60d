// (K, L) selection for banded LSH

use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::error::{Error, Result};

/// Quadrature step for the probability integrals
pub const INTEGRATION_PRECISION: f64 = 0.01;

/// Chosen band layout and its error profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LshParams {
    /// Hash values per band
    pub k: usize,
    /// Number of bands
    pub l: usize,
    pub false_positive: f64,
    pub false_negative: f64,
}

/// Midpoint-rule integral of `f` over `[a, b]`
fn integral(f: impl Fn(f64) -> f64, a: f64, b: f64, precision: f64) -> f64 {
    if b <= a {
        return 0.0;
    }
    let steps = ((b - a) / precision).ceil() as usize;
    let mut area = 0.0;
    for i in 0..steps {
        let lo = a + i as f64 * precision;
        let width = precision.min(b - lo);
        if width <= 0.0 {
            break;
        }
        area += f(lo + 0.5 * width) * width;
    }
    area
}

#[inline]
fn collision_probability(s: f64, k: usize, l: usize) -> f64 {
    1.0 - (1.0 - s.powi(k as i32)).powi(l as i32)
}

pub fn false_positive_probability(k: usize, l: usize, threshold: f64) -> f64 {
    integral(
        |s| collision_probability(s, k, l),
        0.0,
        threshold,
        INTEGRATION_PRECISION,
    )
}

pub fn false_negative_probability(k: usize, l: usize, threshold: f64) -> f64 {
    integral(
        |s| 1.0 - collision_probability(s, k, l),
        threshold,
        1.0,
        INTEGRATION_PRECISION,
    )
}

/// Exhaustive search over all `(K, L)` with `K * L <= num_hash`.
///
/// Fails when no valid layout exists (`num_hash == 0`) or the threshold is
/// outside `[0, 1]`.
pub fn optimal_params(num_hash: usize, threshold: f64) -> Result<LshParams> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidParameter(format!(
            "threshold must be within [0, 1], got {}",
            threshold
        )));
    }

    let mut best: Option<LshParams> = None;
    let mut min_error = f64::MAX;
    for l in 1..=num_hash {
        for k in 1..=num_hash / l {
            let fp = false_positive_probability(k, l, threshold);
            let fn_ = false_negative_probability(k, l, threshold);
            let err = fp + fn_;
            if err < min_error {
                min_error = err;
                best = Some(LshParams {
                    k,
                    l,
                    false_positive: fp,
                    false_negative: fn_,
                });
            }
        }
    }

    let params = best.ok_or(Error::NoValidParameters { num_hash, threshold })?;
    debug!(
        "optimal LSH params for num_hash={} threshold={}: k={} l={} fp={:.4} fn={:.4}",
        num_hash, threshold, params.k, params.l, params.false_positive, params.false_negative
    );
    Ok(params)
}
