//! Order validator (spec.md §4.6): combines the sizing policy with
//! freshness, marker, and duplicate-transaction checks to produce a
//! single go/no-go decision the engine can act on without recomputing.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::{CopyStrategyConfig, LeaderActivity, SizedIntent};
use crate::sizing::calculate_order_size;

/// Freshness horizon: an activity older than this relative to now is
/// stale and rejected outright.
pub const DEFAULT_FRESHNESS_HORIZON: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub reason: Option<String>,
    pub my_position: Option<f64>,
    pub user_position: Option<f64>,
    pub my_balance: f64,
    pub user_balance: f64,
    pub sized: Option<SizedIntent>,
}

/// Tracks transaction hashes already seen, to enforce the
/// duplicate-transaction guard across calls (spec.md §4.6). Kept
/// separate from the marker check since a duplicate tx hash can arrive
/// under a distinct activity id.
#[derive(Default)]
pub struct DuplicateGuard {
    seen: Mutex<HashSet<String>>,
}

impl DuplicateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time a hash is seen; false on any repeat.
    fn observe(&self, tx_hash: &str) -> bool {
        self.seen.lock().insert(tx_hash.to_string())
    }
}

/// `validateTrade` (spec.md §4.6). `now_unix` and `follower_position`
/// are passed in explicitly rather than read from ambient clocks/state,
/// keeping this function deterministic and unit-testable.
#[allow(clippy::too_many_arguments)]
pub fn validate_trade(
    activity: &LeaderActivity,
    config: &CopyStrategyConfig,
    available_balance: f64,
    current_position_size: f64,
    now_unix: i64,
    freshness_horizon: Duration,
    duplicates: &DuplicateGuard,
) -> ValidationResult {
    let base = ValidationResult {
        is_valid: false,
        reason: None,
        my_position: Some(current_position_size),
        user_position: None,
        my_balance: available_balance,
        user_balance: available_balance,
        sized: None,
    };

    if !activity.marker.is_unseen() {
        return ValidationResult {
            reason: Some("Activity already processed".to_string()),
            ..base
        };
    }

    let age_secs = now_unix.saturating_sub(activity.leader_timestamp);
    if age_secs > freshness_horizon.as_secs() as i64 {
        return ValidationResult {
            reason: Some("Stale activity".to_string()),
            ..base
        };
    }

    if !duplicates.observe(&activity.tx_hash) {
        return ValidationResult {
            reason: Some("Duplicate transaction".to_string()),
            ..base
        };
    }

    let sized = calculate_order_size(
        config,
        activity.usdc_size,
        available_balance,
        current_position_size,
    );

    if sized.below_minimum {
        return ValidationResult {
            reason: Some("Below minimum".to_string()),
            sized: Some(sized),
            ..base
        };
    }
    if sized.final_amount <= 0.0 {
        return ValidationResult {
            reason: Some("Insufficient balance".to_string()),
            sized: Some(sized),
            ..base
        };
    }

    ValidationResult {
        is_valid: true,
        reason: None,
        sized: Some(sized),
        ..base
    }
}
