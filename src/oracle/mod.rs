//! Canonicalization / date oracle — optional sidecar client
//!
//! The oracle is consulted only after every deterministic fast path has
//! failed, and its failures are never fatal: callers fall back to the
//! deterministic answer (OTHER / no date). The HTTP client enforces a short
//! per-call timeout and up to two retries with exponential backoff.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::defaults::ORACLE_MAX_RETRIES;
use crate::types::EventType;

/// Oracle call errors. All are non-fatal to the pipeline.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Request(String),

    #[error("oracle timed out after {0} ms")]
    Timeout(u64),

    #[error("oracle returned an unusable payload: {0}")]
    BadPayload(String),
}

/// What the oracle resolved a raw string to.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleAnswer {
    /// A canonical event token from the closed set
    EventToken(EventType),
    /// An ISO `YYYY-MM-DD` date
    IsoDate(NaiveDate),
    /// The oracle could not help
    Unknown,
}

/// Pluggable canonicalization oracle.
#[async_trait]
pub trait CanonOracle: Send + Sync {
    /// Resolve one raw string to a canonical token, an ISO date, or Unknown.
    async fn resolve(&self, raw: &str) -> Result<OracleAnswer, OracleError>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Deterministic default: never resolves anything.
pub struct NullOracle;

#[async_trait]
impl CanonOracle for NullOracle {
    async fn resolve(&self, _raw: &str) -> Result<OracleAnswer, OracleError> {
        Ok(OracleAnswer::Unknown)
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Wire shape of the sidecar response.
#[derive(Debug, Deserialize)]
struct OracleResponse {
    answer: String,
}

/// HTTP sidecar client.
///
/// POSTs `{"raw": "<string>"}` and expects `{"answer": "<token|date|UNKNOWN>"}`.
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
    timeout_ms: u64,
}

impl HttpOracle {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            timeout_ms,
        }
    }

    /// Interpret the sidecar's answer string.
    fn parse_answer(answer: &str) -> OracleAnswer {
        let trimmed = answer.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown") {
            return OracleAnswer::Unknown;
        }
        if let Some(token) = EventType::from_token(trimmed) {
            return OracleAnswer::EventToken(token);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return OracleAnswer::IsoDate(date);
        }
        OracleAnswer::Unknown
    }

    async fn call_once(&self, raw: &str) -> Result<OracleAnswer, OracleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_millis(self.timeout_ms))
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(self.timeout_ms)
                } else {
                    OracleError::Request(e.to_string())
                }
            })?;

        let payload: OracleResponse = response
            .json()
            .await
            .map_err(|e| OracleError::BadPayload(e.to_string()))?;

        Ok(Self::parse_answer(&payload.answer))
    }
}

#[async_trait]
impl CanonOracle for HttpOracle {
    async fn resolve(&self, raw: &str) -> Result<OracleAnswer, OracleError> {
        let mut delay = Duration::from_millis(200);
        let mut last_err = None;

        for attempt in 0..=ORACLE_MAX_RETRIES {
            match self.call_once(raw).await {
                Ok(answer) => {
                    debug!(attempt, raw, "Oracle resolved");
                    return Ok(answer);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Oracle call failed");
                    last_err = Some(e);
                    if attempt < ORACLE_MAX_RETRIES {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| OracleError::Request("no attempts made".into())))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_parsing_covers_all_shapes() {
        assert_eq!(
            HttpOracle::parse_answer("METAL_LOSS"),
            OracleAnswer::EventToken(EventType::MetalLoss)
        );
        assert_eq!(
            HttpOracle::parse_answer("girth_weld"),
            OracleAnswer::EventToken(EventType::GirthWeld)
        );
        assert_eq!(
            HttpOracle::parse_answer("2015-06-01"),
            OracleAnswer::IsoDate(NaiveDate::from_ymd_opt(2015, 6, 1).unwrap())
        );
        assert_eq!(HttpOracle::parse_answer("UNKNOWN"), OracleAnswer::Unknown);
        assert_eq!(HttpOracle::parse_answer("gibberish"), OracleAnswer::Unknown);
    }

    #[tokio::test]
    async fn null_oracle_never_resolves() {
        let oracle = NullOracle;
        assert_eq!(oracle.resolve("anything").await.unwrap(), OracleAnswer::Unknown);
    }
}
