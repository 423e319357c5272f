//! Time-windowed trade aggregator (spec.md §4.7). A process-wide keyed
//! buffer merging same-key sized intents into one weighted-average
//! order per window. Uses an insertion-order-preserving `Vec` instead of
//! a plain `HashMap` for bucket storage — `std::collections::HashMap`
//! does not guarantee iteration order, and spec.md §4.7 requires
//! "emission order within a call is the order of bucket creation".

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::{AggregatedTrade, AggregationContribution, AggregationKey};

struct Bucket {
    key: AggregationKey,
    contributions: Vec<AggregationContribution>,
    total_usdc_size: f64,
    average_price: f64,
    window_start: Instant,
}

impl Bucket {
    fn new(key: AggregationKey, contribution: AggregationContribution) -> Self {
        let total_usdc_size = contribution.usdc_size;
        let average_price = contribution.price;
        Self {
            key,
            contributions: vec![contribution],
            total_usdc_size,
            average_price,
            window_start: Instant::now(),
        }
    }

    fn add(&mut self, contribution: AggregationContribution) {
        self.contributions.push(contribution);
        self.total_usdc_size = self.contributions.iter().map(|c| c.usdc_size).sum();
        let weighted: f64 = self.contributions.iter().map(|c| c.usdc_size * c.price).sum();
        self.average_price = if self.total_usdc_size > 0.0 {
            weighted / self.total_usdc_size
        } else {
            0.0
        };
    }

    fn is_ready(&self, window: Duration) -> bool {
        self.window_start.elapsed() >= window
    }
}

/// An aggregated bucket that fell below the minimum order size on drain
/// and must be marked skipped in persistence rather than emitted.
pub struct SkippedBucket {
    pub activity_ids: Vec<String>,
}

/// Process-wide aggregation buffer. Bucket storage is a `Vec` walked
/// linearly by key equality — bucket counts per process are small (one
/// per active leader/condition/asset/side combination), so this trades a
/// little lookup speed for a correctness guarantee a `HashMap` can't give.
#[derive(Default)]
pub struct Aggregator {
    buckets: Mutex<Vec<Bucket>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `addToAggregationBuffer` (spec.md §4.7).
    pub fn add_to_aggregation_buffer(
        &self,
        key: AggregationKey,
        contribution: AggregationContribution,
    ) {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.iter_mut().find(|b| b.key == key) {
            bucket.add(contribution);
        } else {
            buckets.push(Bucket::new(key, contribution));
        }
    }

    /// `getReadyAggregatedTrades` (spec.md §4.7). Ready buckets below
    /// `min_order_size_usd` are returned as `SkippedBucket`s (for the
    /// caller to mark skipped in persistence) instead of `AggregatedTrade`s,
    /// and both kinds are atomically removed from the buffer.
    pub fn get_ready_aggregated_trades(
        &self,
        window: Duration,
        min_order_size_usd: f64,
    ) -> (Vec<AggregatedTrade>, Vec<SkippedBucket>) {
        let mut buckets = self.buckets.lock();

        let mut ready_indices = Vec::new();
        for (i, bucket) in buckets.iter().enumerate() {
            if bucket.is_ready(window) {
                ready_indices.push(i);
            }
        }

        let mut emitted = Vec::new();
        let mut skipped = Vec::new();

        // Drain back-to-front so earlier indices stay valid, then
        // reverse to restore bucket-creation order (spec.md §4.7
        // determinism requirement).
        let mut removed = Vec::new();
        for &i in ready_indices.iter().rev() {
            removed.push(buckets.remove(i));
        }
        removed.reverse();

        for bucket in removed {
            if bucket.total_usdc_size < min_order_size_usd {
                skipped.push(SkippedBucket {
                    activity_ids: bucket.contributions.into_iter().map(|c| c.activity_id).collect(),
                });
            } else {
                emitted.push(AggregatedTrade {
                    key: bucket.key,
                    contributions: bucket.contributions,
                    total_usdc_size: bucket.total_usdc_size,
                    average_price: bucket.average_price,
                });
            }
        }

        (emitted, skipped)
    }

    pub fn get_aggregation_buffer_size(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;

    fn key() -> AggregationKey {
        AggregationKey {
            leader_account: "0xleader".to_string(),
            condition_id: "cond1".to_string(),
            asset_id: "asset1".to_string(),
            side: Side::Buy,
        }
    }

    #[test]
    fn merges_same_key_with_weighted_average() {
        let agg = Aggregator::new();
        agg.add_to_aggregation_buffer(
            key(),
            AggregationContribution { activity_id: "a1".to_string(), usdc_size: 100.0, price: 1.0 },
        );
        agg.add_to_aggregation_buffer(
            key(),
            AggregationContribution { activity_id: "a2".to_string(), usdc_size: 200.0, price: 1.5 },
        );
        assert_eq!(agg.get_aggregation_buffer_size(), 1);

        let (ready, _) = agg.get_ready_aggregated_trades(Duration::from_millis(0), 0.0);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].total_usdc_size, 300.0);
        assert!((ready[0].average_price - 1.1666666666666667).abs() < 1e-9);
    }

    #[test]
    fn different_keys_never_merge() {
        let agg = Aggregator::new();
        let mut other = key();
        other.asset_id = "asset2".to_string();

        agg.add_to_aggregation_buffer(
            key(),
            AggregationContribution { activity_id: "a1".to_string(), usdc_size: 10.0, price: 1.0 },
        );
        agg.add_to_aggregation_buffer(
            other,
            AggregationContribution { activity_id: "a2".to_string(), usdc_size: 10.0, price: 1.0 },
        );
        assert_eq!(agg.get_aggregation_buffer_size(), 2);
    }

    #[test]
    fn not_ready_before_window_elapses() {
        let agg = Aggregator::new();
        agg.add_to_aggregation_buffer(
            key(),
            AggregationContribution { activity_id: "a1".to_string(), usdc_size: 10.0, price: 1.0 },
        );
        let (ready, skipped) = agg.get_ready_aggregated_trades(Duration::from_secs(60), 0.0);
        assert!(ready.is_empty());
        assert!(skipped.is_empty());
        assert_eq!(agg.get_aggregation_buffer_size(), 1);
    }

    #[test]
    fn below_minimum_ready_bucket_is_skipped_not_emitted() {
        let agg = Aggregator::new();
        agg.add_to_aggregation_buffer(
            key(),
            AggregationContribution { activity_id: "a1".to_string(), usdc_size: 0.5, price: 1.0 },
        );
        let (ready, skipped) = agg.get_ready_aggregated_trades(Duration::from_millis(0), 1.0);
        assert!(ready.is_empty());
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].activity_ids, vec!["a1".to_string()]);
        assert_eq!(agg.get_aggregation_buffer_size(), 0);
    }

    #[test]
    fn drain_is_atomic_removal() {
        let agg = Aggregator::new();
        agg.add_to_aggregation_buffer(
            key(),
            AggregationContribution { activity_id: "a1".to_string(), usdc_size: 10.0, price: 1.0 },
        );
        let (ready, _) = agg.get_ready_aggregated_trades(Duration::from_millis(0), 0.0);
        assert_eq!(ready.len(), 1);
        assert_eq!(agg.get_aggregation_buffer_size(), 0);

        let (ready_again, _) = agg.get_ready_aggregated_trades(Duration::from_millis(0), 0.0);
        assert!(ready_again.is_empty());
    }

    #[test]
    fn emission_order_matches_bucket_creation_order() {
        let agg = Aggregator::new();
        for i in 0..5 {
            let mut k = key();
            k.asset_id = format!("asset{i}");
            agg.add_to_aggregation_buffer(
                k,
                AggregationContribution { activity_id: format!("a{i}"), usdc_size: 10.0, price: 1.0 },
            );
        }
        let (ready, _) = agg.get_ready_aggregated_trades(Duration::from_millis(0), 0.0);
        let order: Vec<_> = ready.iter().map(|t| t.key.asset_id.clone()).collect();
        assert_eq!(order, vec!["asset0", "asset1", "asset2", "asset3", "asset4"]);
    }
}
