use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::request::ProverRequest;

/// Attempts made against the proving service before giving up.
pub const PROVER_MAX_RETRIES: u32 = 5;

/// Backoff before retry `n`, milliseconds. Only server-side (5xx) failures
/// are retried; anything else is the caller's bug and fails immediately.
const RETRY_DELAYS_MS: [u64; 5] = [1_000, 2_000, 4_000, 8_000, 16_000];

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("prover request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("prover returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("prover returned {count} transactions, expected 2")]
    MalformedResponse { count: usize },
}

/// The commit/spell pair the prover hands back, in broadcast order.
#[derive(Debug, Clone)]
pub struct ProvedTxs {
    pub commit_tx_hex: String,
    pub spell_tx_hex: String,
}

impl ProvedTxs {
    /// Interprets the prover's raw response, a two-element hex array.
    pub fn from_response(txs: Vec<String>) -> Result<Self, ProverError> {
        let [commit_tx_hex, spell_tx_hex]: [String; 2] = txs
            .try_into()
            .map_err(|txs: Vec<String>| ProverError::MalformedResponse { count: txs.len() })?;
        Ok(Self {
            commit_tx_hex,
            spell_tx_hex,
        })
    }
}

/// Proving service interface, stubbed out in pipeline tests.
#[async_trait]
pub trait ProverApi: Send + Sync {
    async fn prove(&self, request: &ProverRequest) -> Result<ProvedTxs, ProverError>;
}

/// HTTP client for the proving service.
#[derive(Debug, Clone)]
pub struct HttpProver {
    client: reqwest::Client,
    url: String,
}

impl HttpProver {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    async fn prove_once(&self, request: &ProverRequest) -> Result<ProvedTxs, ProverError> {
        let resp = self.client.post(&self.url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProverError::Status {
                status: status.as_u16(),
                body,
            });
        }
        ProvedTxs::from_response(resp.json().await?)
    }
}

#[async_trait]
impl ProverApi for HttpProver {
    async fn prove(&self, request: &ProverRequest) -> Result<ProvedTxs, ProverError> {
        let mut attempt = 0;
        loop {
            match self.prove_once(request).await {
                Ok(txs) => {
                    debug!(url = %self.url, "prover returned transaction pair");
                    return Ok(txs);
                }
                Err(err) if attempt < PROVER_MAX_RETRIES && is_retriable(&err) => {
                    let delay = RETRY_DELAYS_MS[attempt as usize];
                    warn!(%err, attempt, delay_ms = delay, "prover call failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_retriable(err: &ProverError) -> bool {
    match err {
        ProverError::Status { status, .. } => (500..=511).contains(status),
        ProverError::Http(err) => err.is_timeout() || err.is_connect(),
        ProverError::MalformedResponse { .. } => false,
    }
}
