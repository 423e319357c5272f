//! Copy-sizing policy: a pure function mapping (leader fill, follower
//! balance, current position, config) to a sized order or skip decision
//! (spec.md §4.5). No I/O, no logging — kept as a plain value-computing
//! routine the way `risk::RiskManager::calculate_position` is in the
//! teacher, so it can be exercised exhaustively in unit tests.

use crate::models::{CopyStrategyConfig, SizedIntent, Strategy, Tier};

/// Open Question (spec.md §9): `current_position_size` is ambiguous for
/// short positions. This implementation treats it as non-negative, per
/// the source's assumption — callers are responsible for clamping at
/// the boundary before calling in, not this pure function.
pub fn calculate_order_size(
    config: &CopyStrategyConfig,
    trader_order_size: f64,
    available_balance: f64,
    current_position_size: f64,
) -> SizedIntent {
    let mut reasoning = Vec::new();

    let mut base_amount = match config.strategy {
        Strategy::Fixed => {
            reasoning.push(format!("FIXED base amount {:.4}", config.copy_size));
            config.copy_size
        }
        Strategy::Percentage => {
            let amount = trader_order_size * (config.copy_size / 100.0);
            reasoning.push(format!(
                "PERCENTAGE {}% of trader size {:.4} = {:.4}",
                config.copy_size, trader_order_size, amount
            ));
            amount
        }
        Strategy::Adaptive => {
            let pct = adaptive_percent(config, trader_order_size);
            let amount = trader_order_size * (pct / 100.0);
            reasoning.push(format!(
                "ADAPTIVE {:.4}% of trader size {:.4} = {:.4}",
                pct, trader_order_size, amount
            ));
            amount
        }
    };

    let multiplier = get_trade_multiplier(config, trader_order_size);
    if (multiplier - 1.0).abs() > f64::EPSILON {
        base_amount *= multiplier;
        reasoning.push(format!("applied multiplier {:.4} -> {:.4}", multiplier, base_amount));
    }

    let mut final_amount = base_amount;
    let mut capped_by_max = false;
    if final_amount > config.max_order_size_usd {
        final_amount = config.max_order_size_usd;
        capped_by_max = true;
        reasoning.push(format!("capped by maxOrderSizeUSD {:.4}", config.max_order_size_usd));
    }

    if let Some(max_position) = config.max_position_size_usd {
        if current_position_size + final_amount > max_position {
            final_amount = (max_position - current_position_size).max(0.0);
            reasoning.push("Reduced to fit position limit".to_string());
        }
    }

    let mut reduced_by_balance = false;
    if final_amount > available_balance {
        final_amount = available_balance * 0.99;
        reduced_by_balance = true;
        reasoning.push(format!(
            "reduced to 99% of available balance {:.4} -> {:.4}",
            available_balance, final_amount
        ));
    }

    let mut below_minimum = false;
    if final_amount < config.min_order_size_usd {
        final_amount = 0.0;
        below_minimum = true;
        reasoning.push(format!(
            "below minOrderSizeUSD {:.4}, suppressed",
            config.min_order_size_usd
        ));
    }

    SizedIntent {
        strategy: config.strategy,
        trader_order_size,
        base_amount,
        final_amount: final_amount.max(0.0),
        capped_by_max,
        reduced_by_balance,
        below_minimum,
        reasoning,
    }
}

/// ADAPTIVE percent: linearly interpolates from `adaptive_max_percent`
/// down to `adaptive_min_percent` as `trader_order_size` grows toward
/// `adaptive_threshold`, clamped at the bounds beyond it (spec.md §4.5
/// contract: non-increasing in trader_order_size).
fn adaptive_percent(config: &CopyStrategyConfig, trader_order_size: f64) -> f64 {
    let min_pct = config.adaptive_min_percent.unwrap_or(0.0);
    let max_pct = config.adaptive_max_percent.unwrap_or(min_pct);
    let threshold = config.adaptive_threshold.unwrap_or(1.0).max(f64::EPSILON);

    let ratio = (trader_order_size / threshold).min(1.0).max(0.0);
    let pct = max_pct - ratio * (max_pct - min_pct);
    pct.clamp(min_pct.min(max_pct), min_pct.max(max_pct))
}

/// First matching tier wins; falls back to `trade_multiplier`, then 1.0
/// (spec.md §4.5 step 2).
pub fn get_trade_multiplier(config: &CopyStrategyConfig, trader_order_size: f64) -> f64 {
    if !config.tiered_multipliers.is_empty() {
        if let Some(tier) = config
            .tiered_multipliers
            .iter()
            .find(|t| matches_tier(t, trader_order_size))
        {
            return tier.multiplier;
        }
    }
    config.trade_multiplier.unwrap_or(1.0)
}

fn matches_tier(tier: &Tier, size: f64) -> bool {
    match tier.max {
        Some(max) => size >= tier.min && size < max,
        None => size >= tier.min,
    }
}

/// Validates a `CopyStrategyConfig` per spec.md §4.5, returning a list of
/// human-readable errors (empty if valid).
pub fn validate_copy_strategy_config(config: &CopyStrategyConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.copy_size <= 0.0 {
        errors.push("copySize must be > 0".to_string());
    }
    if config.strategy == Strategy::Percentage && config.copy_size > 100.0 {
        errors.push("copySize must be <= 100 for PERCENTAGE strategy".to_string());
    }
    if config.max_order_size_usd <= 0.0 {
        errors.push("maxOrderSizeUSD must be > 0".to_string());
    }
    if config.min_order_size_usd < 0.0 {
        errors.push("minOrderSizeUSD must be >= 0".to_string());
    }
    if config.min_order_size_usd > config.max_order_size_usd {
        errors.push("minOrderSizeUSD must be <= maxOrderSizeUSD".to_string());
    }
    if config.strategy == Strategy::Adaptive {
        match (config.adaptive_min_percent, config.adaptive_max_percent) {
            (Some(min), Some(max)) if min > max => {
                errors.push("adaptiveMinPercent must be <= adaptiveMaxPercent".to_string());
            }
            (None, _) | (_, None) => {
                errors.push("ADAPTIVE strategy requires both adaptive bounds".to_string());
            }
            _ => {}
        }
    }

    errors.extend(validate_tiers(&config.tiered_multipliers));
    errors
}

fn validate_tiers(tiers: &[Tier]) -> Vec<String> {
    let mut errors = Vec::new();
    if tiers.is_empty() {
        return errors;
    }

    for (i, tier) in tiers.iter().enumerate() {
        if tier.multiplier < 0.0 {
            errors.push(format!("tier {i} has negative multiplier"));
        }
        let max_is_finite = match tier.max {
            Some(m) => m.is_finite(),
            None => true,
        };
        if !tier.min.is_finite() || !max_is_finite {
            errors.push(format!("tier {i} has a non-finite bound"));
        }
    }

    // A non-finite bound makes `partial_cmp` below return `None`, which
    // would panic on `unwrap`; bail out with the errors collected so far.
    if !errors.is_empty() {
        return errors;
    }

    let mut sorted: Vec<&Tier> = tiers.iter().collect();
    sorted.sort_by(|a, b| a.min.partial_cmp(&b.min).unwrap());

    for (i, tier) in sorted.iter().enumerate() {
        if tier.max.is_none() && i != sorted.len() - 1 {
            errors.push("an unbounded (∞) tier must be last".to_string());
        }
    }

    for window in sorted.windows(2) {
        let (a, b) = (window[0], window[1]);
        let a_end = a.max.unwrap_or(f64::INFINITY);
        if b.min < a_end {
            errors.push(format!(
                "overlapping tiers: [{}, {:?}) and [{}, {:?})",
                a.min, a.max, b.min, b.max
            ));
        }
    }

    errors
}

/// Parses `"a-b:m,...,c+:m"` tier specs (spec.md §4.5, §6). Sorts by
/// `min` ascending; rejects malformed, overlapping, or mis-ordered input.
pub fn parse_tiered_multipliers(spec: &str) -> Result<Vec<Tier>, String> {
    let mut tiers = Vec::new();

    for part in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (range, mult_str) = part
            .rsplit_once(':')
            .ok_or_else(|| format!("malformed tier segment: {part}"))?;
        let multiplier: f64 = mult_str
            .trim()
            .parse()
            .map_err(|_| format!("non-numeric multiplier in: {part}"))?;
        if multiplier < 0.0 {
            return Err(format!("negative multiplier in: {part}"));
        }

        if let Some(min_str) = range.strip_suffix('+') {
            let min: f64 = min_str
                .trim()
                .parse()
                .map_err(|_| format!("non-numeric tier bound in: {part}"))?;
            if !min.is_finite() {
                return Err(format!("non-finite tier bound in: {part}"));
            }
            tiers.push(Tier { min, max: None, multiplier });
        } else {
            let (min_str, max_str) = range
                .split_once('-')
                .ok_or_else(|| format!("malformed tier range in: {part}"))?;
            let min: f64 = min_str
                .trim()
                .parse()
                .map_err(|_| format!("non-numeric tier bound in: {part}"))?;
            let max: f64 = max_str
                .trim()
                .parse()
                .map_err(|_| format!("non-numeric tier bound in: {part}"))?;
            if !min.is_finite() || !max.is_finite() {
                return Err(format!("non-finite tier bound in: {part}"));
            }
            tiers.push(Tier { min, max: Some(max), multiplier });
        }
    }

    // Non-finite bounds are rejected above, before this sort ever sees
    // a NaN that would make `partial_cmp` return `None` and panic.
    tiers.sort_by(|a, b| a.min.partial_cmp(&b.min).unwrap());

    let errors = validate_tiers(&tiers);
    if !errors.is_empty() {
        return Err(errors.join("; "));
    }

    Ok(tiers)
}

/// Serializes tiers back to the `"a-b:m,...,c+:m"` wire format, the
/// inverse of `parse_tiered_multipliers` for valid tier lists.
pub fn serialize_tiered_multipliers(tiers: &[Tier]) -> String {
    tiers
        .iter()
        .map(|t| match t.max {
            Some(max) => format!("{}-{}:{}", t.min, max, t.multiplier),
            None => format!("{}+:{}", t.min, t.multiplier),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Suggests a starter config scaled to the follower's balance (spec.md
/// §4.5).
pub fn get_recommended_config(balance: f64) -> CopyStrategyConfig {
    if balance < 500.0 {
        CopyStrategyConfig {
            strategy: Strategy::Percentage,
            copy_size: 5.0,
            max_order_size_usd: 20.0,
            min_order_size_usd: 1.0,
            max_position_size_usd: None,
            adaptive_min_percent: None,
            adaptive_max_percent: None,
            adaptive_threshold: None,
            trade_multiplier: None,
            tiered_multipliers: Vec::new(),
        }
    } else if balance < 2000.0 {
        CopyStrategyConfig {
            strategy: Strategy::Percentage,
            copy_size: 10.0,
            max_order_size_usd: 50.0,
            min_order_size_usd: 1.0,
            max_position_size_usd: None,
            adaptive_min_percent: None,
            adaptive_max_percent: None,
            adaptive_threshold: None,
            trade_multiplier: None,
            tiered_multipliers: Vec::new(),
        }
    } else {
        CopyStrategyConfig {
            strategy: Strategy::Adaptive,
            copy_size: 10.0,
            max_order_size_usd: balance / 20.0,
            min_order_size_usd: 1.0,
            max_position_size_usd: None,
            adaptive_min_percent: Some(5.0),
            adaptive_max_percent: Some(15.0),
            adaptive_threshold: Some(balance / 10.0),
            trade_multiplier: None,
            tiered_multipliers: Vec::new(),
        }
    }
}
