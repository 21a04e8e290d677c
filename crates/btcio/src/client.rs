use std::{collections::BTreeMap, str::FromStr};

use async_trait::async_trait;
use bitcoin::Txid;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum L1ClientError {
    #[error("bitcoind transport error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("bitcoind rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("bitcoind returned no result and no error")]
    MissingResult,

    #[error("unparsable bitcoind response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("invalid txid in bitcoind response: {0}")]
    InvalidTxid(#[from] bitcoin::hex::HexToArrayError),

    #[error("invalid transaction hex: {0}")]
    InvalidTx(#[from] bitcoin::consensus::encode::FromHexError),

    #[error("{role} transaction was not accepted by the network{reason}")]
    PackageTxRejected { role: &'static str, reason: String },
}

/// Per-transaction entry of a `submitpackage` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageTxResult {
    pub txid: Txid,

    /// Rejection detail, absent when the node took the transaction.
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of bitcoind's `submitpackage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPackageResponse {
    /// `"success"` when the package as a whole validated.
    pub package_msg: String,

    /// Keyed by wtxid, one entry per submitted transaction.
    #[serde(rename = "tx-results")]
    pub tx_results: BTreeMap<String, PackageTxResult>,

    #[serde(rename = "replaced-transactions", default)]
    pub replaced_transactions: Vec<Txid>,
}

/// Verbose `getrawtransaction` fields the pipeline cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTxInfo {
    pub txid: Txid,

    #[serde(default)]
    pub confirmations: u64,

    #[serde(default)]
    pub blockhash: Option<bitcoin::BlockHash>,
}

impl RawTxInfo {
    pub fn is_confirmed(&self) -> bool {
        self.confirmations >= 1
    }
}

/// Bitcoin node interface the pipeline runs against, stubbed in tests.
#[async_trait]
pub trait L1Client: Send + Sync {
    /// Submits dependent transactions atomically via `submitpackage`.
    async fn submit_package(
        &self,
        txs_hex: &[String],
    ) -> Result<SubmitPackageResponse, L1ClientError>;

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<Txid, L1ClientError>;

    async fn get_raw_transaction_hex(&self, txid: &Txid) -> Result<String, L1ClientError>;

    /// Verbose transaction lookup, confirmation count included.
    async fn get_raw_transaction_info(&self, txid: &Txid) -> Result<RawTxInfo, L1ClientError>;

    /// Merkle inclusion proof (`gettxoutproof`) for a confirmed transaction.
    async fn get_tx_out_proof(&self, txid: &Txid) -> Result<String, L1ClientError>;
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

/// JSON-RPC client for a bitcoind node.
#[derive(Debug, Clone)]
pub struct BitcoindClient {
    http: reqwest::Client,
    url: String,
    user: String,
    password: String,
}

impl BitcoindClient {
    pub fn new(url: String, user: String, password: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            user,
            password,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, L1ClientError> {
        trace!(method, "bitcoind rpc call");
        let body = json!({
            "jsonrpc": "1.0",
            "id": "batchmint",
            "method": method,
            "params": params,
        });
        let resp: RpcResponse = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = resp.error {
            return Err(L1ClientError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = resp.result.ok_or(L1ClientError::MissingResult)?;
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl L1Client for BitcoindClient {
    async fn submit_package(
        &self,
        txs_hex: &[String],
    ) -> Result<SubmitPackageResponse, L1ClientError> {
        self.call("submitpackage", json!([txs_hex])).await
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<Txid, L1ClientError> {
        let txid: String = self.call("sendrawtransaction", json!([tx_hex])).await?;
        Ok(Txid::from_str(&txid)?)
    }

    async fn get_raw_transaction_hex(&self, txid: &Txid) -> Result<String, L1ClientError> {
        self.call("getrawtransaction", json!([txid.to_string(), false]))
            .await
    }

    async fn get_raw_transaction_info(&self, txid: &Txid) -> Result<RawTxInfo, L1ClientError> {
        self.call("getrawtransaction", json!([txid.to_string(), true]))
            .await
    }

    async fn get_tx_out_proof(&self, txid: &Txid) -> Result<String, L1ClientError> {
        self.call("gettxoutproof", json!([[txid.to_string()]]))
            .await
    }
}
