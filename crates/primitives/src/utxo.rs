use std::{fmt, str::FromStr};

use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A spendable coin reference with its value in satoshis.
///
/// This is the unit the funding analyzer hands out and the unit the pipeline
/// records per output. Displayed as `txid:vout`, the format the prover
/// expects for spend references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
}

impl Utxo {
    pub fn new(txid: Txid, vout: u32, value: u64) -> Self {
        Self { txid, vout, value }
    }

    /// The `txid:vout` spend reference string.
    pub fn outpoint_ref(&self) -> String {
        format!("{}:{}", self.txid, self.vout)
    }
}

impl fmt::Display for Utxo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

#[derive(Debug, Error)]
pub enum ParseOutPointError {
    #[error("malformed outpoint reference '{0}', expected txid:vout")]
    Malformed(String),

    #[error("invalid txid in outpoint reference: {0}")]
    InvalidTxid(#[from] bitcoin::hex::HexToArrayError),

    #[error("invalid vout in outpoint reference: {0}")]
    InvalidVout(#[from] std::num::ParseIntError),
}

/// Parses a `txid:vout` reference into its parts.
pub fn parse_outpoint_ref(s: &str) -> Result<(Txid, u32), ParseOutPointError> {
    let (txid, vout) = s
        .split_once(':')
        .ok_or_else(|| ParseOutPointError::Malformed(s.to_owned()))?;
    Ok((Txid::from_str(txid)?, vout.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXID: &str = "d2a2622ad4b3aa3830b7056172a4fcaf00bde9ce0e65f3bc94037e5dbd2e8852";

    #[test]
    fn outpoint_ref_round_trip() {
        let utxo = Utxo::new(Txid::from_str(TXID).unwrap(), 3, 6000);
        let s = utxo.outpoint_ref();
        let (txid, vout) = parse_outpoint_ref(&s).unwrap();
        assert_eq!(txid, utxo.txid);
        assert_eq!(vout, 3);
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(
            parse_outpoint_ref(TXID),
            Err(ParseOutPointError::Malformed(_))
        ));
    }

    #[test]
    fn serde_shape_is_stable() {
        let utxo = Utxo::new(Txid::from_str(TXID).unwrap(), 0, 333);
        let json = serde_json::to_value(&utxo).unwrap();
        assert_eq!(json["txid"], TXID);
        assert_eq!(json["vout"], 0);
        assert_eq!(json["value"], 333);
    }
}
