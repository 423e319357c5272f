//! Retrying HTTP fetcher.
//!
//! Same attempt-loop-with-backoff shape as
//! `scrapers::polymarket_api::PolymarketScraper::execute_with_retry` in
//! the teacher, re-targeted to classify failures into `BotError` and to
//! follow the exact backoff formula of spec.md §4.2 instead of the
//! teacher's ad hoc rate-limit sleep.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::BotError;

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 30_000;

pub struct RetryingFetcher {
    client: Client,
    max_attempts: u32,
    request_timeout: Duration,
}

impl RetryingFetcher {
    pub fn new(max_attempts: u32, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .local_address(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
            .user_agent("Mozilla/5.0 (compatible; PolymarketCopyBot/1.0)")
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            max_attempts: max_attempts.max(1),
            request_timeout,
        }
    }

    /// Idempotent GET with classified exponential backoff + jitter
    /// (spec.md §4.2). Retries transport failures and HTTP 5xx; 4xx is
    /// terminal after exactly one attempt.
    pub async fn get(&self, url: &str) -> Result<String, BotError> {
        let mut last_transport_err: Option<String> = None;
        let mut last_status: Option<StatusCode> = None;

        for attempt in 1..=self.max_attempts {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .text()
                            .await
                            .map_err(|e| BotError::api("API_BODY_READ", e.to_string(), false));
                    }
                    if status.is_client_error() {
                        return Err(BotError::api(
                            "API_CLIENT_ERROR",
                            format!("GET {url} -> {status}"),
                            false,
                        ));
                    }
                    // 5xx: retryable
                    last_status = Some(status);
                    warn!(url, attempt, %status, "retryable API failure");
                }
                Err(e) => {
                    last_transport_err = Some(e.to_string());
                    warn!(url, attempt, error = %e, "retryable transport failure");
                }
            }

            if attempt < self.max_attempts {
                let delay = self.backoff_delay(attempt);
                sleep(delay).await;
            }
        }

        if let Some(status) = last_status {
            let msg = format!("GET {url} exhausted retries at {status}");
            error!(url, %status, "fetcher exhausted retries");
            Err(BotError::api("API_RETRIES_EXHAUSTED", msg, true))
        } else {
            let msg = last_transport_err
                .unwrap_or_else(|| "unknown transport failure".to_string());
            error!(url, error = %msg, "fetcher exhausted retries");
            Err(BotError::network("NETWORK_RETRIES_EXHAUSTED", msg))
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = BASE_DELAY_MS.saturating_mul(1u64 << (attempt - 1).min(20));
        let jitter_ms = rand::thread_rng().gen_range(0..1000);
        Duration::from_millis((exp + jitter_ms).min(MAX_DELAY_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let fetcher = RetryingFetcher::new(5, Duration::from_secs(10));
        let d1 = fetcher.backoff_delay(1).as_millis();
        let d4 = fetcher.backoff_delay(10).as_millis();
        assert!(d1 >= BASE_DELAY_MS as u128 && d1 < (BASE_DELAY_MS + 1000) as u128);
        assert!(d4 <= MAX_DELAY_MS as u128);
    }

    #[tokio::test]
    async fn non_reachable_host_yields_network_error() {
        let fetcher = RetryingFetcher::new(1, Duration::from_millis(200));
        let err = fetcher
            .get("http://127.0.0.1:1/does-not-exist")
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Network { .. }));
        assert!(err.is_retryable());
    }
}
