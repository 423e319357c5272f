//! Execution engine (spec.md §4.8): drives validation, order posting,
//! and persistence markers. Marker transitions are guarded by an
//! in-process compare-and-set map so that at most one worker ever
//! advances a given activity past IN_FLIGHT (spec.md §5's ordering
//! guarantee); writes are mirrored to the injected `PersistenceStore`
//! so a restart can reconcile from durable state.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::aggregator::Aggregator;
use crate::error::{BotError, RecoveryStrategy};
use crate::models::{AggregatedTrade, CopyStrategyConfig, LeaderActivity, ProcessingMarker};
use crate::order_client::{OrderClient, OrderPostRequest};
use crate::persistence::{PersistenceStore, Update};
use crate::validator::{validate_trade, DuplicateGuard, DEFAULT_FRESHNESS_HORIZON};

/// In-process marker CAS store. The persistence store itself does not
/// expose a compare-and-set primitive (spec.md §6 only specifies plain
/// `updateOne`), so the single-advance-past-IN_FLIGHT guarantee is
/// enforced here, in the same process that owns the workers sharing it.
#[derive(Default)]
pub struct MarkerStore {
    markers: Mutex<HashMap<String, ProcessingMarker>>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts UNSEEN -> IN_FLIGHT for `activity_id`. Returns false if
    /// another worker already owns it (marker is non-UNSEEN).
    fn try_pick_up(&self, activity_id: &str, started_at: i64) -> bool {
        let mut markers = self.markers.lock();
        let current = markers.entry(activity_id.to_string()).or_insert(ProcessingMarker::Unseen);
        if !current.is_unseen() {
            return false;
        }
        *current = ProcessingMarker::InFlight(started_at);
        true
    }

    fn set(&self, activity_id: &str, marker: ProcessingMarker) {
        self.markers.lock().insert(activity_id.to_string(), marker);
    }

    pub fn get(&self, activity_id: &str) -> ProcessingMarker {
        self.markers
            .lock()
            .get(activity_id)
            .copied()
            .unwrap_or(ProcessingMarker::Unseen)
    }
}

pub struct ExecutionEngine<S: PersistenceStore, C: OrderClient> {
    store: S,
    order_client: C,
    markers: MarkerStore,
    duplicates: DuplicateGuard,
}

impl<S: PersistenceStore, C: OrderClient> ExecutionEngine<S, C> {
    pub fn new(store: S, order_client: C) -> Self {
        Self {
            store,
            order_client,
            markers: MarkerStore::new(),
            duplicates: DuplicateGuard::new(),
        }
    }

    /// `executeTrade` (spec.md §4.8).
    pub async fn execute_trade(
        &self,
        activity: &LeaderActivity,
        config: &CopyStrategyConfig,
        available_balance: f64,
        current_position_size: f64,
        now_unix: i64,
    ) -> Result<(), BotError> {
        if !self.markers.try_pick_up(&activity.id, now_unix) {
            info!(activity_id = %activity.id, "activity already owned by another worker");
            return Ok(());
        }
        self.store
            .update_one(&activity.id, Update::SetMarker(now_unix))
            .await?;

        let validation = validate_trade(
            activity,
            config,
            available_balance,
            current_position_size,
            now_unix,
            DEFAULT_FRESHNESS_HORIZON,
            &self.duplicates,
        );

        if !validation.is_valid {
            let reason = validation.reason.unwrap_or_else(|| "invalid".to_string());
            info!(activity_id = %activity.id, reason = %reason, "skipping activity");
            self.markers.set(&activity.id, ProcessingMarker::Skipped);
            self.store.update_one(&activity.id, Update::MarkSkipped).await?;
            return Ok(());
        }

        let sized = validation.sized.expect("valid result always carries a sized intent");

        let request = OrderPostRequest {
            asset_id: activity.asset_id.clone(),
            side: activity.side,
            size: sized.final_amount,
            price: activity.price,
        };

        match self.order_client.post_order(request).await {
            Ok(()) => {
                let completed_at = now_unix + 1;
                self.markers.set(&activity.id, ProcessingMarker::Completed(completed_at));
                self.store
                    .update_one(&activity.id, Update::SetMarker(completed_at))
                    .await?;
                Ok(())
            }
            Err(err) => self.handle_post_failure(&activity.id, err).await,
        }
    }

    /// `executeAggregatedTrades` (spec.md §4.8): one order per bucket,
    /// followed by per-activity COMPLETED marker writes. A bucket's post
    /// precedes its marker writes; buckets are otherwise unordered.
    pub async fn execute_aggregated_trades(
        &self,
        trades: Vec<AggregatedTrade>,
        now_unix: i64,
    ) -> Vec<Result<(), BotError>> {
        let mut results = Vec::with_capacity(trades.len());
        for trade in trades {
            let side = trade.key.side;
            let request = OrderPostRequest {
                asset_id: trade.key.asset_id.clone(),
                side,
                size: trade.total_usdc_size,
                price: trade.average_price,
            };

            let result = match self.order_client.post_order(request).await {
                Ok(()) => {
                    for contribution in &trade.contributions {
                        self.markers.set(&contribution.activity_id, ProcessingMarker::Completed(now_unix));
                        if let Err(e) = self
                            .store
                            .update_one(&contribution.activity_id, Update::SetMarker(now_unix))
                            .await
                        {
                            warn!(activity_id = %contribution.activity_id, error = %e, "failed to persist COMPLETED marker");
                        }
                    }
                    Ok(())
                }
                Err(err) => {
                    let mut last = Ok(());
                    for contribution in &trade.contributions {
                        last = self.handle_post_failure(&contribution.activity_id, err.clone()).await;
                    }
                    last
                }
            };
            results.push(result);
        }
        results
    }

    /// Marks the activity SKIPPED for non-retryable failures, leaves it
    /// IN_FLIGHT otherwise so the retry policy may re-attempt later
    /// (spec.md §4.8 step 3 / §7).
    async fn handle_post_failure(&self, activity_id: &str, err: BotError) -> Result<(), BotError> {
        error!(
            activity_id,
            code = err.code(),
            severity = %err.severity(),
            is_retryable = err.is_retryable(),
            "order post failed"
        );

        if !err.is_retryable() {
            self.markers.set(activity_id, ProcessingMarker::Skipped);
            self.store.update_one(activity_id, Update::MarkSkipped).await?;
        }

        match err.recovery_strategy() {
            RecoveryStrategy::Shutdown => warn!(activity_id, "critical error requests shutdown"),
            RecoveryStrategy::CircuitBreak => warn!(activity_id, "error requests circuit break"),
            _ => {}
        }

        Err(err)
    }
}

/// Polls the aggregator for ready buckets and drives them through the
/// engine; a thin loop body meant to be called on a fixed interval by
/// the process driver in `main.rs`.
pub async fn drain_ready_aggregations<S: PersistenceStore, C: OrderClient>(
    engine: &ExecutionEngine<S, C>,
    aggregator: &Aggregator,
    window: Duration,
    min_order_size_usd: f64,
    now_unix: i64,
) {
    let (ready, skipped) = aggregator.get_ready_aggregated_trades(window, min_order_size_usd);

    for bucket in skipped {
        for activity_id in bucket.activity_ids {
            if let Err(e) = engine.store.update_one(&activity_id, Update::MarkSkipped).await {
                warn!(activity_id, error = %e, "failed to persist skipped aggregation marker");
            }
        }
    }

    if !ready.is_empty() {
        let _ = engine.execute_aggregated_trades(ready, now_unix).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Side, Strategy};
    use crate::order_client::RecordingOrderClient;
    use crate::persistence::InMemoryStore;
    use serde_json::json;

    fn activity(id: &str, tx_hash: &str, timestamp: i64) -> LeaderActivity {
        LeaderActivity {
            id: id.to_string(),
            leader_account: "0xleader".to_string(),
            condition_id: "cond1".to_string(),
            asset_id: "asset1".to_string(),
            side: Side::Buy,
            size_outcome_units: 100.0,
            usdc_size: 100.0,
            price: 0.5,
            leader_timestamp: timestamp,
            tx_hash: tx_hash.to_string(),
            marker: ProcessingMarker::Unseen,
            extra: json!({}),
        }
    }

    fn config() -> CopyStrategyConfig {
        CopyStrategyConfig {
            strategy: Strategy::Percentage,
            copy_size: 10.0,
            max_order_size_usd: 100.0,
            min_order_size_usd: 1.0,
            max_position_size_usd: None,
            adaptive_min_percent: None,
            adaptive_max_percent: None,
            adaptive_threshold: None,
            trade_multiplier: None,
            tiered_multipliers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn successful_trade_completes_and_posts_order() {
        let store = InMemoryStore::new();
        let client = RecordingOrderClient::new();
        let engine = ExecutionEngine::new(store, client);

        let a = activity("a1", "0xtx1", 1000);
        engine.execute_trade(&a, &config(), 50.0, 0.0, 1010).await.unwrap();

        assert_eq!(engine.markers.get("a1"), ProcessingMarker::Completed(1011));
        assert_eq!(engine.order_client.posted().len(), 1);
    }

    #[tokio::test]
    async fn second_pickup_of_same_activity_is_a_noop() {
        let store = InMemoryStore::new();
        let client = RecordingOrderClient::new();
        let engine = ExecutionEngine::new(store, client);

        let a = activity("a2", "0xtx2", 1000);
        engine.execute_trade(&a, &config(), 50.0, 0.0, 1010).await.unwrap();
        let first_marker = engine.markers.get("a2");

        // Simulate a second worker racing on the same id: marker store
        // already advanced it, so a fresh pickup attempt is rejected.
        let owned = engine.markers.try_pick_up("a2", 2000);
        assert!(!owned);
        assert_eq!(engine.markers.get("a2"), first_marker);
    }

    #[tokio::test]
    async fn invalid_trade_is_skipped_without_posting() {
        let store = InMemoryStore::new();
        let client = RecordingOrderClient::new();
        let engine = ExecutionEngine::new(store, client);

        let a = activity("a3", "0xtx3", 1000);
        // now_unix far beyond freshness horizon -> stale
        engine.execute_trade(&a, &config(), 50.0, 0.0, 100_000).await.unwrap();

        assert_eq!(engine.markers.get("a3"), ProcessingMarker::Skipped);
        assert!(engine.order_client.posted().is_empty());
    }

    #[tokio::test]
    async fn non_retryable_post_failure_marks_skipped() {
        let store = InMemoryStore::new();
        let client = RecordingOrderClient::new();
        client.fail_next_with(BotError::validation("BAD_ORDER", "rejected"));
        let engine = ExecutionEngine::new(store, client);

        let a = activity("a4", "0xtx4", 1000);
        let result = engine.execute_trade(&a, &config(), 50.0, 0.0, 1010).await;
        assert!(result.is_err());
        assert_eq!(engine.markers.get("a4"), ProcessingMarker::Skipped);
    }

    #[tokio::test]
    async fn retryable_post_failure_leaves_marker_in_flight() {
        let store = InMemoryStore::new();
        let client = RecordingOrderClient::new();
        client.fail_next_with(BotError::network("TIMEOUT", "timed out"));
        let engine = ExecutionEngine::new(store, client);

        let a = activity("a5", "0xtx5", 1000);
        let result = engine.execute_trade(&a, &config(), 50.0, 0.0, 1010).await;
        assert!(result.is_err());
        assert!(matches!(engine.markers.get("a5"), ProcessingMarker::InFlight(_)));
    }

    #[tokio::test]
    async fn aggregated_trades_post_one_order_and_complete_all_contributions() {
        use crate::models::{AggregatedTrade, AggregationContribution, AggregationKey};

        let store = InMemoryStore::new();
        let client = RecordingOrderClient::new();
        let engine = ExecutionEngine::new(store, client);

        let trade = AggregatedTrade {
            key: AggregationKey {
                leader_account: "0xleader".to_string(),
                condition_id: "cond1".to_string(),
                asset_id: "asset1".to_string(),
                side: Side::Buy,
            },
            contributions: vec![
                AggregationContribution { activity_id: "a1".to_string(), usdc_size: 100.0, price: 1.0 },
                AggregationContribution { activity_id: "a2".to_string(), usdc_size: 200.0, price: 1.5 },
            ],
            total_usdc_size: 300.0,
            average_price: 1.1666666666666667,
        };

        let results = engine.execute_aggregated_trades(vec![trade], 5000).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(engine.order_client.posted().len(), 1);
        assert_eq!(engine.markers.get("a1"), ProcessingMarker::Completed(5000));
        assert_eq!(engine.markers.get("a2"), ProcessingMarker::Completed(5000));
    }
}
