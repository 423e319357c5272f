//! On-chain stablecoin balance probe (spec.md §4.4). Reads the
//! follower's USDC balance through a breaker-protected JSON-RPC
//! `balanceOf` call. Grounded in `route_quality::mitigation`'s breaker
//! usage pattern (wrap-and-redact) rather than any single teacher
//! balance reader, since the teacher's vault module does not expose one
//! directly — `ChainProvider` here plays the role `polymarket_api`
//! plays for HTTP: a narrow, injectable collaborator trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use num_bigint::BigUint;
use num_traits::ToPrimitive;

use crate::error::BotError;
use crate::resilience::BreakerRegistry;

const BREAKER_NAME: &str = "polygon-balance";
const FAILURE_THRESHOLD: u32 = 3;
const RECOVERY_TIMEOUT_SECS: u64 = 30;
const USDC_DECIMALS: u32 = 6;

/// The on-chain RPC client external collaborator (spec.md §1, §6):
/// a standard JSON-RPC provider exposing ERC-20 `balanceOf`.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Returns the raw hex result of an `eth_call` to `balanceOf(holder)`
    /// on `contract`, e.g. `"0x00...3e8"`.
    async fn call_balance_of(&self, contract: &str, holder: &str) -> Result<String, BotError>;
}

pub struct BalanceProbe<P: ChainProvider> {
    provider: P,
    usdc_contract: String,
    breakers: Arc<BreakerRegistry>,
}

impl<P: ChainProvider> BalanceProbe<P> {
    pub fn new(provider: P, usdc_contract: String, breakers: Arc<BreakerRegistry>) -> Self {
        Self { provider, usdc_contract, breakers }
    }

    /// Reads and decimal-scales the follower's USDC balance (spec.md
    /// §4.4). Any failure surfaces as an API error carrying a redacted
    /// address.
    pub async fn get_balance(&self, address: &str) -> Result<f64, BotError> {
        let breaker = self
            .breakers
            .get_or_create(BREAKER_NAME, FAILURE_THRESHOLD, Duration::from_secs(RECOVERY_TIMEOUT_SECS));

        let contract = self.usdc_contract.clone();
        let holder = address.to_string();
        let result = breaker
            .call(|| async move { self.provider.call_balance_of(&contract, &holder).await })
            .await;

        result
            .and_then(|hex| decode_balance(&hex))
            .map_err(|e| {
                BotError::api(
                    "BALANCE_PROBE_FAILED",
                    format!("balance read failed for {}: {}", redact(address), e),
                    e.is_retryable(),
                )
            })
    }
}

fn decode_balance(hex: &str) -> Result<f64, BotError> {
    let trimmed = hex.trim_start_matches("0x");
    let raw = BigUint::parse_bytes(trimmed.as_bytes(), 16)
        .ok_or_else(|| BotError::api("BALANCE_DECODE_FAILED", format!("non-hex balance: {hex}"), false))?;
    let scale = (0..USDC_DECIMALS).fold(BigUint::from(1u32), |acc, _| acc * 10u32);
    let whole = &raw / &scale;
    let remainder = &raw % &scale;
    let whole_f = whole.to_f64().unwrap_or(f64::MAX);
    let frac_f = remainder.to_f64().unwrap_or(0.0) / 10f64.powi(USDC_DECIMALS as i32);
    Ok(whole_f + frac_f)
}

/// First-6/last-4 address redaction (spec.md §4.4).
fn redact(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}
