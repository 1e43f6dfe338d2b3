// =============================================================================
// Market Data Client — upstream fetch with retry, backoff, and jitter
// =============================================================================
//
// The screener consumes one upstream capability: fetch recent closed candles
// plus a best-effort derivatives snapshot for a symbol/timeframe pair. The
// trait seam exists so the engine can be exercised against a mock in tests.
//
// Retry policy: only retryable failures (network errors, HTTP 5xx/408/429)
// are re-attempted. Delays follow `base * multiplier^attempt`, clamped to
// `max_delay`, with +/-50% jitter so synchronized clients do not stampede a
// recovering upstream.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use crate::market_data::{Candle, DerivativesSnapshot, MarketSnapshot, Timeframe};

/// Upstream market-data capability consumed by the screening engine.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Fetch up to `limit` most-recent closed candles plus a derivatives
    /// snapshot for `symbol` on `timeframe`.
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<MarketSnapshot>;
}

// =============================================================================
// Retry policy
// =============================================================================

/// Exponential-backoff retry policy with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), jittered by +/-50%.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let clamped = raw.min(self.max_delay.as_millis() as f64);
        let jitter = rand::thread_rng().gen_range(0.5..=1.5);
        Duration::from_millis((clamped * jitter) as u64)
    }
}

/// Classify an HTTP status as retryable for upstream market-data calls.
///
/// 5xx, 408, and 429 are transient; other 4xx are caller errors and must not
/// be retried (they would fail identically on every attempt).
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// reqwest-backed [`MarketDataClient`] against a configurable upstream base
/// URL (kline endpoint in the Binance array-of-arrays shape).
pub struct HttpMarketDataClient {
    client: reqwest::Client,
    base_url: String,
    derivatives_url: Option<String>,
    retry: RetryPolicy,
}

impl HttpMarketDataClient {
    /// Create a client against `base_url`.
    ///
    /// `derivatives_url` is the optional futures API base for funding and
    /// open-interest lookups; when absent, snapshots carry no derivatives.
    pub fn new(base_url: impl Into<String>, derivatives_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: base_url.into(),
            derivatives_url,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// GET a JSON body with the retry policy applied.
    async fn get_json_with_retry(&self, url: &str) -> Result<serde_json::Value> {
        let mut attempt = 0u32;
        loop {
            match self.get_json_once(url).await {
                Ok(body) => return Ok(body),
                Err(FetchError::Fatal(e)) => return Err(e),
                Err(FetchError::Retryable(e)) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(e.context(format!("upstream failed after {attempt} attempts")));
                    }
                    let delay = self.retry.delay_for(attempt - 1);
                    warn!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying upstream fetch");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn get_json_once(&self, url: &str) -> std::result::Result<serde_json::Value, FetchError> {
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            // Connection resets, DNS failures, and timeouts surface here.
            Err(e) => return Err(FetchError::Retryable(anyhow::Error::new(e).context("request failed"))),
        };

        let status = resp.status().as_u16();
        if !(200..400).contains(&status) {
            let body = resp.text().await.unwrap_or_default();
            let err = anyhow::anyhow!("upstream returned {status}: {body}");
            return if is_retryable_status(status) {
                Err(FetchError::Retryable(err))
            } else {
                Err(FetchError::Fatal(err))
            };
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| FetchError::Fatal(anyhow::Error::new(e).context("failed to parse upstream JSON")))
    }

    /// Parse a JSON value that may be either a string or a number into `f64`.
    fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>()
                .with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            anyhow::bail!("expected string or number, got: {val}")
        }
    }

    /// Parse the kline array-of-arrays payload into candles.
    ///
    /// Array indices: [0] openTime, [1] open, [2] high, [3] low, [4] close,
    /// [5] volume. Trailing elements are ignored.
    fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
        let raw = body.as_array().context("klines response is not an array")?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let arr = entry.as_array().context("kline entry is not an array")?;
            if arr.len() < 6 {
                warn!("skipping malformed kline entry with {} elements", arr.len());
                continue;
            }

            let candle = Candle::new(
                arr[0].as_i64().unwrap_or(0),
                Self::parse_str_f64(&arr[1])?,
                Self::parse_str_f64(&arr[2])?,
                Self::parse_str_f64(&arr[3])?,
                Self::parse_str_f64(&arr[4])?,
                Self::parse_str_f64(&arr[5])?,
            );
            if !candle.is_well_formed() {
                warn!(open_time = candle.open_time, "skipping malformed candle");
                continue;
            }
            candles.push(candle);
        }

        Ok(candles)
    }

    /// Best-effort funding + open-interest lookup. Never fails the snapshot;
    /// missing derivatives are reported as `None`.
    async fn fetch_derivatives(&self, symbol: &str) -> DerivativesSnapshot {
        let Some(base) = &self.derivatives_url else {
            return DerivativesSnapshot::default();
        };

        let funding_rate = {
            let url = format!("{base}/fapi/v1/fundingRate?symbol={symbol}&limit=1");
            match self.get_json_once(&url).await {
                Ok(body) => body
                    .as_array()
                    .and_then(|a| a.first())
                    .and_then(|e| e["fundingRate"].as_str())
                    .and_then(|s| s.parse::<f64>().ok()),
                Err(e) => {
                    debug!(symbol, error = %e.into_inner(), "funding rate unavailable");
                    None
                }
            }
        };

        let oi_change_pct = {
            let url = format!(
                "{base}/futures/data/openInterestHist?symbol={symbol}&period=1h&limit=2"
            );
            match self.get_json_once(&url).await {
                Ok(body) => body.as_array().and_then(|arr| {
                    if arr.len() < 2 {
                        return None;
                    }
                    let prev = arr[0]["sumOpenInterest"].as_str()?.parse::<f64>().ok()?;
                    let curr = arr[1]["sumOpenInterest"].as_str()?.parse::<f64>().ok()?;
                    if prev.abs() < f64::EPSILON {
                        return None;
                    }
                    Some(((curr - prev) / prev) * 100.0)
                }),
                Err(e) => {
                    debug!(symbol, error = %e.into_inner(), "open interest unavailable");
                    None
                }
            }
        };

        DerivativesSnapshot {
            oi_change_pct,
            funding_rate,
        }
    }
}

#[async_trait]
impl MarketDataClient for HttpMarketDataClient {
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<MarketSnapshot> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            timeframe.as_str(),
            limit
        );

        let body = self.get_json_with_retry(&url).await?;
        let candles = Self::parse_klines(&body)?;
        let derivatives = self.fetch_derivatives(symbol).await;

        debug!(symbol, timeframe = %timeframe, count = candles.len(), "market snapshot fetched");

        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            timeframe,
            candles,
            derivatives,
        })
    }
}

/// Internal split between failures worth retrying and caller errors.
enum FetchError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

impl FetchError {
    fn into_inner(self) -> anyhow::Error {
        match self {
            Self::Retryable(e) | Self::Fatal(e) => e,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_status_classification() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn backoff_grows_and_clamps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(400),
        };

        // Jitter is +/-50%, so bound each delay rather than pin it.
        let d0 = policy.delay_for(0).as_millis();
        assert!((50..=150).contains(&d0), "d0 = {d0}");

        let d1 = policy.delay_for(1).as_millis();
        assert!((100..=300).contains(&d1), "d1 = {d1}");

        // Attempt 4 would be 1600ms raw but clamps to 400ms before jitter.
        let d4 = policy.delay_for(4).as_millis();
        assert!((200..=600).contains(&d4), "d4 = {d4}");
    }

    #[test]
    fn parse_klines_skips_malformed_rows() {
        let body = serde_json::json!([
            [1000, "10.0", "12.0", "9.0", "11.0", "100.0", 1999],
            [2000, "11.0"],
            [3000, "11.0", "13.0", "10.0", "12.0", "50.0", 3999]
        ]);
        let candles = HttpMarketDataClient::parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time, 1000);
        assert_eq!(candles[1].close, 12.0);
    }

    #[test]
    fn parse_klines_drops_shape_violations() {
        // high below the body: invariant violation, row dropped.
        let body = serde_json::json!([
            [1000, "10.0", "10.2", "9.0", "11.0", "100.0"]
        ]);
        let candles = HttpMarketDataClient::parse_klines(&body).unwrap();
        assert!(candles.is_empty());
    }

    #[test]
    fn parse_klines_accepts_numeric_fields() {
        let body = serde_json::json!([[1000, 10.0, 12.0, 9.0, 11.0, 100.0]]);
        let candles = HttpMarketDataClient::parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 1);
    }
}
