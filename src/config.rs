//! Process configuration (spec.md §6), loaded the way
//! `models::Config::from_env` does in the teacher: `dotenv::dotenv().ok()`
//! then `std::env::var(...).unwrap_or_else(...)` / `.parse().unwrap_or(...)`
//! for optional fields — but required fields produce a typed
//! `BotError::configuration` instead of silently falling back, since a
//! missing RPC URL or contract address is not something this system
//! should start up and paper over.

use std::time::Duration;

use crate::error::BotError;
use crate::models::{CopyStrategyConfig, Strategy};
use crate::sizing::parse_tiered_multipliers;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub usdc_contract_address: String,
    pub network_retry_limit: u32,
    pub request_timeout: Duration,
    pub trade_aggregation_window: Duration,
    pub copy_strategy: CopyStrategyConfig,
    /// Order-posting endpoint for the `HttpOrderClient` wiring in
    /// `main.rs`. Not part of spec.md's external-interface contract
    /// (the order client itself is out of scope); defaults to the RPC
    /// host's companion order-gateway convention used in development.
    pub order_post_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, BotError> {
        dotenv::dotenv().ok();

        let rpc_url = required_env("RPC_URL")?;
        let usdc_contract_address = required_env("USDC_CONTRACT_ADDRESS")?;

        let network_retry_limit = std::env::var("NETWORK_RETRY_LIMIT")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .map_err(|_| BotError::configuration("BAD_RETRY_LIMIT", "NETWORK_RETRY_LIMIT must be a positive integer"))?;
        if network_retry_limit < 1 {
            return Err(BotError::configuration(
                "BAD_RETRY_LIMIT",
                "NETWORK_RETRY_LIMIT must be >= 1",
            ));
        }

        let request_timeout_ms = std::env::var("REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse::<u64>()
            .map_err(|_| BotError::configuration("BAD_TIMEOUT", "REQUEST_TIMEOUT_MS must be an integer"))?;

        let aggregation_window_secs = std::env::var("TRADE_AGGREGATION_WINDOW_SECONDS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .map_err(|_| {
                BotError::configuration(
                    "BAD_AGGREGATION_WINDOW",
                    "TRADE_AGGREGATION_WINDOW_SECONDS must be an integer",
                )
            })?;

        let copy_strategy = copy_strategy_from_env()?;
        let order_post_url = std::env::var("ORDER_POST_URL")
            .unwrap_or_else(|_| "https://clob.polymarket.com/order".to_string());

        Ok(Self {
            rpc_url,
            usdc_contract_address,
            network_retry_limit,
            request_timeout: Duration::from_millis(request_timeout_ms),
            trade_aggregation_window: Duration::from_secs(aggregation_window_secs),
            copy_strategy,
            order_post_url,
        })
    }
}

fn required_env(key: &str) -> Result<String, BotError> {
    std::env::var(key).map_err(|_| {
        BotError::configuration("MISSING_CONFIG", format!("{key} is required but not set"))
    })
}

fn copy_strategy_from_env() -> Result<CopyStrategyConfig, BotError> {
    let strategy = match std::env::var("COPY_STRATEGY").unwrap_or_else(|_| "PERCENTAGE".to_string()).as_str() {
        "PERCENTAGE" => Strategy::Percentage,
        "FIXED" => Strategy::Fixed,
        "ADAPTIVE" => Strategy::Adaptive,
        other => {
            return Err(BotError::configuration(
                "BAD_STRATEGY",
                format!("unknown COPY_STRATEGY '{other}'"),
            ))
        }
    };

    let copy_size = std::env::var("COPY_SIZE")
        .unwrap_or_else(|_| "10".to_string())
        .parse::<f64>()
        .map_err(|_| BotError::configuration("BAD_COPY_SIZE", "COPY_SIZE must be numeric"))?;

    let max_order_size_usd = std::env::var("MAX_ORDER_SIZE_USD")
        .unwrap_or_else(|_| "100".to_string())
        .parse::<f64>()
        .map_err(|_| BotError::configuration("BAD_MAX_ORDER_SIZE", "MAX_ORDER_SIZE_USD must be numeric"))?;

    let min_order_size_usd = std::env::var("MIN_ORDER_SIZE_USD")
        .unwrap_or_else(|_| "1".to_string())
        .parse::<f64>()
        .map_err(|_| BotError::configuration("BAD_MIN_ORDER_SIZE", "MIN_ORDER_SIZE_USD must be numeric"))?;

    let max_position_size_usd = std::env::var("MAX_POSITION_SIZE_USD")
        .ok()
        .and_then(|v| v.parse::<f64>().ok());

    let adaptive_min_percent = std::env::var("ADAPTIVE_MIN_PERCENT").ok().and_then(|v| v.parse::<f64>().ok());
    let adaptive_max_percent = std::env::var("ADAPTIVE_MAX_PERCENT").ok().and_then(|v| v.parse::<f64>().ok());
    let adaptive_threshold = std::env::var("ADAPTIVE_THRESHOLD").ok().and_then(|v| v.parse::<f64>().ok());
    let trade_multiplier = std::env::var("TRADE_MULTIPLIER").ok().and_then(|v| v.parse::<f64>().ok());

    let tiered_multipliers = match std::env::var("TIERED_MULTIPLIERS").ok() {
        Some(spec) if !spec.trim().is_empty() => parse_tiered_multipliers(&spec)
            .map_err(|e| BotError::configuration("BAD_TIERED_MULTIPLIERS", e))?,
        _ => Vec::new(),
    };

    let config = CopyStrategyConfig {
        strategy,
        copy_size,
        max_order_size_usd,
        min_order_size_usd,
        max_position_size_usd,
        adaptive_min_percent,
        adaptive_max_percent,
        adaptive_threshold,
        trade_multiplier,
        tiered_multipliers,
    };

    let errors = crate::sizing::validate_copy_strategy_config(&config);
    if !errors.is_empty() {
        return Err(BotError::configuration("INVALID_COPY_STRATEGY", errors.join("; ")));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes env-mutating tests; std::env::set_var is process-global.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "RPC_URL",
            "USDC_CONTRACT_ADDRESS",
            "NETWORK_RETRY_LIMIT",
            "REQUEST_TIMEOUT_MS",
            "TRADE_AGGREGATION_WINDOW_SECONDS",
            "COPY_STRATEGY",
            "COPY_SIZE",
            "MAX_ORDER_SIZE_USD",
            "MIN_ORDER_SIZE_USD",
            "TIERED_MULTIPLIERS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_field_is_configuration_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, BotError::Configuration { .. }));
    }

    #[test]
    fn valid_env_parses_into_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("RPC_URL", "https://polygon-rpc.example");
        std::env::set_var("USDC_CONTRACT_ADDRESS", "0xusdc");
        std::env::set_var("NETWORK_RETRY_LIMIT", "3");

        let config = Config::from_env().unwrap();
        assert_eq!(config.rpc_url, "https://polygon-rpc.example");
        assert_eq!(config.network_retry_limit, 3);
        assert_eq!(config.copy_strategy.strategy, Strategy::Percentage);
        clear_env();
    }

    #[test]
    fn invalid_copy_strategy_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("RPC_URL", "https://polygon-rpc.example");
        std::env::set_var("USDC_CONTRACT_ADDRESS", "0xusdc");
        std::env::set_var("COPY_STRATEGY", "PERCENTAGE");
        std::env::set_var("COPY_SIZE", "150");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, BotError::Configuration { .. }));
        clear_env();
    }
}
