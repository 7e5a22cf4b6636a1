//! Peer scoring and inactivity detection.
//!
//! A score is a weighted sum of bounded components, one per kind of evidence.
//! Each success/failure pair is turned into a Laplace-smoothed success ratio
//! centred on zero, so a peer with no history scores 0 for that component and
//! a long run of successes approaches `+weight / 2`. Bandwidth and build time
//! contribute saturating bonuses in `[0, weight)`.
//!
//! Scores are only comparable between peers ranked with the same weights.

use serde::{Deserialize, Serialize};

use crate::ident::PeerIdentHash;
use crate::peer::{PeerStats, PeerStatsSnapshot};

/// Weights for each score component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub connect: f64,
    pub tunnel_test: f64,
    pub tunnel_member: f64,
    pub floodfill: f64,
    pub bandwidth: f64,
    /// Bandwidth (KiB/s) at which the bandwidth bonus reaches half its weight.
    pub bandwidth_reference: f64,
    pub build_time: f64,
    /// Per-hop build time at which the build-time bonus reaches half its weight.
    pub build_time_reference_ms: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            connect: 4.0,
            tunnel_test: 3.0,
            tunnel_member: 3.0,
            floodfill: 2.0,
            bandwidth: 1.0,
            bandwidth_reference: 256.0,
            build_time: 1.0,
            build_time_reference_ms: 1000.0,
        }
    }
}

/// Compute the score for one peer.
///
/// Non-decreasing in every success counter and bandwidth, non-increasing in
/// every failure counter and build time.
pub fn compute_score(stats: &PeerStatsSnapshot, weights: &ScoreWeights) -> f64 {
    let connect = centred_ratio(
        f64::from(stats.successful_connects),
        f64::from(stats.failed_connects)
            + f64::from(stats.information_faulty)
            + 0.5 * f64::from(stats.slow_handshake_connects),
    );
    let tunnel_test = centred_ratio(
        f64::from(stats.successful_tunnel_tests),
        f64::from(stats.failed_tunnel_tests),
    );
    // Not answering a build request is worse than declining it.
    let tunnel_member = centred_ratio(
        f64::from(stats.successful_tunnel_member),
        f64::from(stats.declined_tunnel_member) + 2.0 * f64::from(stats.tunnel_build_timeouts),
    );
    let floodfill = centred_ratio(
        f64::from(stats.floodfill_update_successes),
        f64::from(stats.floodfill_update_timeouts),
    );
    let bandwidth = saturating(
        f64::from(stats.max_bandwidth_seen),
        weights.bandwidth_reference,
    );
    let build_time = stats
        .tunnel_build_time_per_hop()
        .map_or(0.0, |per_hop| {
            inverse_saturating(per_hop.as_secs_f64() * 1000.0, weights.build_time_reference_ms)
        });

    weights.connect * connect
        + weights.tunnel_test * tunnel_test
        + weights.tunnel_member * tunnel_member
        + weights.floodfill * floodfill
        + weights.bandwidth * bandwidth
        + weights.build_time * build_time
}

/// `(s + 1) / (s + f + 2) - 0.5`, in `(-0.5, 0.5)`.
fn centred_ratio(successes: f64, failures: f64) -> f64 {
    (successes + 1.0) / (successes + failures + 2.0) - 0.5
}

/// `x / (x + reference)`, in `[0, 1)`.
fn saturating(value: f64, reference: f64) -> f64 {
    if value <= 0.0 || reference <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    value / (value + reference)
}

/// `reference / (reference + x)`, in `(0, 1]`.
fn inverse_saturating(value: f64, reference: f64) -> f64 {
    if reference <= 0.0 {
        return 0.0;
    }
    reference / (reference + value.max(0.0))
}

/// Thresholds for flagging a peer as inactive.
///
/// A peer is inactive when its tunnel test failures exceed
/// `min_failed_tunnel_tests` and outnumber its successes by more than
/// `tunnel_test_failure_factor`, or the same holds for connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InactivityPolicy {
    pub min_failed_tunnel_tests: u32,
    pub tunnel_test_failure_factor: u32,
    pub min_failed_connects: u32,
    pub connect_failure_factor: u32,
}

impl Default for InactivityPolicy {
    fn default() -> Self {
        Self {
            min_failed_tunnel_tests: 8,
            tunnel_test_failure_factor: 3,
            min_failed_connects: 5,
            connect_failure_factor: 3,
        }
    }
}

impl InactivityPolicy {
    pub fn is_inactive(&self, stats: &PeerStatsSnapshot) -> bool {
        exceeds(
            stats.failed_tunnel_tests,
            stats.successful_tunnel_tests,
            self.min_failed_tunnel_tests,
            self.tunnel_test_failure_factor,
        ) || exceeds(
            stats.failed_connects,
            stats.successful_connects,
            self.min_failed_connects,
            self.connect_failure_factor,
        )
    }
}

fn exceeds(failures: u32, successes: u32, min_failures: u32, factor: u32) -> bool {
    failures > min_failures && u64::from(failures) > u64::from(factor) * u64::from(successes)
}

/// Mean and population standard deviation of a set of scores.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreDistribution {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl ScoreDistribution {
    /// Single-pass (Welford) over `scores`. Empty input yields all zeros.
    pub fn from_scores<I: IntoIterator<Item = f64>>(scores: I) -> Self {
        let mut count = 0usize;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for score in scores {
            count += 1;
            let delta = score - mean;
            mean += delta / count as f64;
            m2 += delta * (score - mean);
        }
        if count == 0 {
            return Self::default();
        }
        Self {
            count,
            mean,
            std_dev: (m2 / count as f64).sqrt(),
        }
    }

    /// Distribution of the stored scores of `peers`.
    pub fn from_peers<'a, I>(peers: I) -> Self
    where
        I: IntoIterator<Item = (&'a PeerIdentHash, &'a PeerStats)>,
    {
        Self::from_scores(peers.into_iter().map(|(_, stats)| stats.score()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn empty() -> PeerStatsSnapshot {
        PeerStatsSnapshot::new(PeerIdentHash::repeat_byte(1), 0)
    }

    #[test]
    fn test_no_history_scores_zero() {
        assert_eq!(compute_score(&empty(), &ScoreWeights::default()), 0.0);
    }

    #[test]
    fn test_successes_raise_failures_lower() {
        let weights = ScoreWeights::default();
        let base = compute_score(&empty(), &weights);

        let mut good = empty();
        good.successful_connects = 10;
        good.successful_tunnel_tests = 10;
        assert!(compute_score(&good, &weights) > base);

        let mut bad = empty();
        bad.failed_connects = 10;
        bad.tunnel_build_timeouts = 3;
        assert!(compute_score(&bad, &weights) < base);
    }

    #[test]
    fn test_timeout_worse_than_decline() {
        let weights = ScoreWeights::default();
        let mut declined = empty();
        declined.declined_tunnel_member = 2;
        let mut timed_out = empty();
        timed_out.tunnel_build_timeouts = 2;
        assert!(compute_score(&timed_out, &weights) < compute_score(&declined, &weights));
    }

    #[test]
    fn test_bandwidth_and_build_time_bonus() {
        let weights = ScoreWeights::default();
        let mut stats = empty();
        stats.max_bandwidth_seen = 256.0;
        assert!((compute_score(&stats, &weights) - 0.5).abs() < 1e-9);

        let mut fast = empty();
        fast.tunnel_build_time_ms_per_hop = 1000.0;
        assert!((compute_score(&fast, &weights) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_inactivity_thresholds() {
        let policy = InactivityPolicy::default();

        let mut stats = empty();
        stats.failed_tunnel_tests = 9;
        assert!(policy.is_inactive(&stats));

        stats.successful_tunnel_tests = 5;
        assert!(!policy.is_inactive(&stats));

        // At the minimum, not above it.
        let mut stats = empty();
        stats.failed_tunnel_tests = 8;
        assert!(!policy.is_inactive(&stats));

        let mut stats = empty();
        stats.failed_connects = 6;
        stats.successful_connects = 1;
        assert!(policy.is_inactive(&stats));
        stats.successful_connects = 2;
        assert!(!policy.is_inactive(&stats));
    }

    #[test]
    fn test_distribution() {
        let dist = ScoreDistribution::from_scores([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(dist.count, 8);
        assert!((dist.mean - 5.0).abs() < 1e-12);
        assert!((dist.std_dev - 2.0).abs() < 1e-12);

        assert_eq!(
            ScoreDistribution::from_scores(std::iter::empty()),
            ScoreDistribution::default()
        );
    }

    #[test]
    fn test_distribution_from_peers() {
        let a = PeerIdentHash::repeat_byte(1);
        let b = PeerIdentHash::repeat_byte(2);
        let sa = PeerStats::new(a, 0);
        let sb = PeerStats::new(b, 0);
        sa.set_score(1.0);
        sb.set_score(3.0);

        let dist = ScoreDistribution::from_peers([(&a, &sa), (&b, &sb)]);
        assert_eq!(dist.count, 2);
        assert!((dist.mean - 2.0).abs() < 1e-12);
        assert!((dist.std_dev - 1.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_score_monotone(
            successes in 0u32..10_000,
            failures in 0u32..10_000,
            extra in 1u32..1_000,
        ) {
            let weights = ScoreWeights::default();
            let mut stats = empty();
            stats.successful_tunnel_tests = successes;
            stats.failed_tunnel_tests = failures;
            let score = compute_score(&stats, &weights);

            let mut better = stats.clone();
            better.successful_tunnel_tests += extra;
            prop_assert!(compute_score(&better, &weights) >= score);

            let mut worse = stats.clone();
            worse.failed_tunnel_tests += extra;
            prop_assert!(compute_score(&worse, &weights) <= score);
        }

        #[test]
        fn prop_score_bounded(
            connects in any::<u32>(),
            failed in any::<u32>(),
            bandwidth in 0f32..1e9,
        ) {
            let weights = ScoreWeights::default();
            let mut stats = empty();
            stats.successful_connects = connects;
            stats.failed_connects = failed;
            stats.max_bandwidth_seen = bandwidth;
            let score = compute_score(&stats, &weights);
            prop_assert!(score.is_finite());
            prop_assert!(score.abs() <= 0.5 * weights.connect + weights.bandwidth);
        }
    }
}
