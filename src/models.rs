//! Core data model: leader activities, the processing marker, sized
//! intents, and copy-strategy configuration (spec.md §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Tagged-variant processing marker (spec.md §9 REDESIGN: "a cleaner
/// implementation uses a tagged-variant marker with explicit states").
/// `to_sentinel`/`from_sentinel` preserve wire compatibility with the
/// historical `{0, +ts, -1, ts}` persistence values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMarker {
    Unseen,
    InFlight(i64),
    Skipped,
    Completed(i64),
}

impl ProcessingMarker {
    pub fn to_sentinel(self) -> i64 {
        match self {
            ProcessingMarker::Unseen => 0,
            ProcessingMarker::InFlight(ts) => ts,
            ProcessingMarker::Skipped => -1,
            ProcessingMarker::Completed(ts) => ts,
        }
    }

    /// `completed` distinguishes a terminal COMPLETED sentinel from a
    /// live IN_FLIGHT one carrying the same raw timestamp shape.
    pub fn from_sentinel(value: i64, completed: bool) -> Self {
        match value {
            0 => ProcessingMarker::Unseen,
            -1 => ProcessingMarker::Skipped,
            ts if completed => ProcessingMarker::Completed(ts),
            ts => ProcessingMarker::InFlight(ts),
        }
    }

    pub fn is_unseen(&self) -> bool {
        matches!(self, ProcessingMarker::Unseen)
    }
}

/// A single leader fill record, immutable once received.
#[derive(Debug, Clone)]
pub struct LeaderActivity {
    pub id: String,
    pub leader_account: String,
    pub condition_id: String,
    pub asset_id: String,
    pub side: Side,
    pub size_outcome_units: f64,
    pub usdc_size: f64,
    pub price: f64,
    pub leader_timestamp: i64,
    pub tx_hash: String,
    pub marker: ProcessingMarker,
    /// Auxiliary leader profile fields, carried through opaquely.
    pub extra: Value,
}

/// (leader, condition, asset, side) — the aggregation key (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationKey {
    pub leader_account: String,
    pub condition_id: String,
    pub asset_id: String,
    pub side: Side,
}

impl AggregationKey {
    pub fn from_activity(activity: &LeaderActivity) -> Self {
        Self {
            leader_account: activity.leader_account.clone(),
            condition_id: activity.condition_id.clone(),
            asset_id: activity.asset_id.clone(),
            side: activity.side,
        }
    }
}

/// A copy-strategy selector (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Percentage,
    Fixed,
    Adaptive,
}

/// One tier of a piecewise-constant multiplier function over trader
/// order size. `max` of `None` means an unbounded (∞) upper tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tier {
    pub min: f64,
    pub max: Option<f64>,
    pub multiplier: f64,
}

/// Copy-strategy configuration (spec.md §3).
#[derive(Debug, Clone)]
pub struct CopyStrategyConfig {
    pub strategy: Strategy,
    /// Percent (for PERCENTAGE/ADAPTIVE) or absolute USD (for FIXED).
    pub copy_size: f64,
    pub max_order_size_usd: f64,
    pub min_order_size_usd: f64,
    pub max_position_size_usd: Option<f64>,
    pub adaptive_min_percent: Option<f64>,
    pub adaptive_max_percent: Option<f64>,
    pub adaptive_threshold: Option<f64>,
    pub trade_multiplier: Option<f64>,
    pub tiered_multipliers: Vec<Tier>,
}

/// Policy output for one sized order (spec.md §3).
#[derive(Debug, Clone)]
pub struct SizedIntent {
    pub strategy: Strategy,
    pub trader_order_size: f64,
    pub base_amount: f64,
    pub final_amount: f64,
    pub capped_by_max: bool,
    pub reduced_by_balance: bool,
    pub below_minimum: bool,
    pub reasoning: Vec<String>,
}

/// One bucket in the aggregator, keyed by `AggregationKey`.
#[derive(Debug, Clone)]
pub struct AggregationContribution {
    pub activity_id: String,
    pub usdc_size: f64,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct AggregatedTrade {
    pub key: AggregationKey,
    pub contributions: Vec<AggregationContribution>,
    pub total_usdc_size: f64,
    pub average_price: f64,
}
