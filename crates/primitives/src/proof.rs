use bitcoin::Txid;
use serde::{Deserialize, Serialize};

use crate::Utxo;

/// Everything known about the already-broadcast mining transaction that the
/// prover needs to anchor a mint against.
///
/// One `ProofContext` is shared by every output of a run; only the spend
/// vout differs per output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofContext {
    /// Txid of the broadcast mining transaction.
    pub mining_txid: Txid,

    /// Fully-signed mining transaction, consensus hex.
    pub mining_tx_hex: String,

    /// Token units this proof is worth, as computed at mining time.
    pub reward: u64,

    /// Outputs of the mining transaction that seed mint attempts, one per
    /// target output, ordered by run index.
    pub spendable_outputs: Vec<Utxo>,
}

impl ProofContext {
    /// The mining UTXO backing output `index`, if the run has that many.
    pub fn mining_utxo(&self, index: usize) -> Option<&Utxo> {
        self.spendable_outputs.get(index)
    }
}
