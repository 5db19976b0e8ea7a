// ODTE - On-time Data Transmission Efficiency metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sent → received pairing.
//!
//! Two pointers walk the sorted `sent` and `received` sequences. A receive
//! that precedes the current send is discarded; otherwise the pair is
//! emitted and both pointers advance. Each timestamp is consumed at most
//! once, so one physical response is never booked against several sends
//! and reliability cannot exceed 1.0 through double counting. Given sorted
//! input the result is fully deterministic.

use crate::event::DirectionalSeries;

/// A send paired with its receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    /// Receive timestamp (epoch ms).
    pub recv_ms: i64,
    /// `recv_ms - sent_ms`, never negative.
    pub latency_ms: i64,
}

/// Pair sorted `sent` and `received` timestamps.
///
/// Both slices must be sorted ascending. Duplicate values are distinct
/// slots and are consumed one at a time.
pub fn match_pairs(sent: &[i64], received: &[i64]) -> Vec<MatchedPair> {
    debug_assert!(sent.windows(2).all(|w| w[0] <= w[1]));
    debug_assert!(received.windows(2).all(|w| w[0] <= w[1]));

    let mut pairs = Vec::with_capacity(sent.len().min(received.len()));
    let mut si = 0;
    let mut ri = 0;

    while si < sent.len() && ri < received.len() {
        let s = sent[si];
        let r = received[ri];
        if r < s {
            // Cannot belong to this or any later send.
            ri += 1;
            continue;
        }
        pairs.push(MatchedPair {
            recv_ms: r,
            latency_ms: r - s,
        });
        si += 1;
        ri += 1;
    }

    pairs
}

/// Pair one direction of a sensor.
pub fn match_series(series: &DirectionalSeries) -> Vec<MatchedPair> {
    match_pairs(&series.sent, &series.received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_reference_scenario() {
        let pairs = match_pairs(&[1000, 2000, 3000], &[1050, 1990, 5000]);
        assert_eq!(
            pairs,
            vec![
                MatchedPair {
                    recv_ms: 1050,
                    latency_ms: 50
                },
                MatchedPair {
                    recv_ms: 5000,
                    latency_ms: 3000
                },
            ]
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert!(match_pairs(&[], &[1, 2, 3]).is_empty());
        assert!(match_pairs(&[1, 2, 3], &[]).is_empty());
        assert!(match_pairs(&[], &[]).is_empty());
    }

    #[test]
    fn test_receive_consumed_once() {
        // A single response must not satisfy two sends.
        let pairs = match_pairs(&[100, 100, 100], &[150]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].latency_ms, 50);
    }

    #[test]
    fn test_duplicate_timestamps() {
        let pairs = match_pairs(&[100, 100], &[100, 100, 100]);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.latency_ms == 0));
    }

    #[test]
    fn test_all_receives_precede_sends() {
        assert!(match_pairs(&[500, 600], &[100, 200, 300]).is_empty());
    }

    #[test]
    fn test_randomized_invariants() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x0D7E);
        for _ in 0..200 {
            let mut sent: Vec<i64> = (0..rng.gen_range(0..50))
                .map(|_| rng.gen_range(0..10_000))
                .collect();
            let mut received: Vec<i64> = (0..rng.gen_range(0..50))
                .map(|_| rng.gen_range(0..10_000))
                .collect();
            sent.sort_unstable();
            received.sort_unstable();

            let pairs = match_pairs(&sent, &received);
            assert!(pairs.len() <= sent.len().min(received.len()));
            assert!(pairs.iter().all(|p| p.latency_ms >= 0));
            // Receives are consumed in order, each at most once.
            assert!(pairs.windows(2).all(|w| w[0].recv_ms <= w[1].recv_ms));
            // Deterministic.
            assert_eq!(pairs, match_pairs(&sent, &received));
        }
    }
}
