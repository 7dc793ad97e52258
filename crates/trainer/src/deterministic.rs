//! Deterministic tie-breaking for split selection
//!
//! Two candidate splits with equal gain are ordered by
//! `(feature_idx, threshold, node_id, missing_left)` so that training is
//! reproducible regardless of float noise in the gain computation.

use std::cmp::Ordering;

/// Relative tolerance under which two gains count as equal.
pub const GAIN_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold: f64,
    pub node_id: usize,
    pub missing_left: bool,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold: f64, node_id: usize, missing_left: bool) -> Self {
        Self {
            feature_idx,
            threshold,
            node_id,
            missing_left,
        }
    }
}

impl Ord for SplitTieBreaker {
    fn cmp(&self, other: &Self) -> Ordering {
        self.feature_idx
            .cmp(&other.feature_idx)
            .then_with(|| self.threshold.total_cmp(&other.threshold))
            .then_with(|| self.node_id.cmp(&other.node_id))
            .then_with(|| self.missing_left.cmp(&other.missing_left))
    }
}

impl PartialOrd for SplitTieBreaker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SplitTieBreaker {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SplitTieBreaker {}

/// Whether gain `a` beats gain `b`, treating near-equal gains as ties.
pub fn gain_cmp(a: f64, b: f64) -> Ordering {
    let scale = a.abs().max(b.abs()).max(1.0);
    if (a - b).abs() <= GAIN_EPSILON * scale {
        Ordering::Equal
    } else {
        a.total_cmp(&b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 1.5, 0, false);
        let t2 = SplitTieBreaker::new(0, 1.5, 1, false);
        let t3 = SplitTieBreaker::new(1, -3.0, 0, false);
        let t4 = SplitTieBreaker::new(0, 1.5, 0, true);
        let t5 = SplitTieBreaker::new(0, -2.0, 5, true);

        assert!(t1 < t2);
        assert!(t1 < t3);
        assert!(t1 < t4);
        assert!(t5 < t1);
    }

    #[test]
    fn test_near_equal_gains_tie() {
        assert_eq!(gain_cmp(1.0, 1.0 + 1e-15), Ordering::Equal);
        assert_eq!(gain_cmp(2.0, 1.0), Ordering::Greater);
        assert_eq!(gain_cmp(-1.0, 0.5), Ordering::Less);
    }
}
