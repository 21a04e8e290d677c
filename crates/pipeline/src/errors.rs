use batchmint_btcio::L1ClientError;
use batchmint_prover::{ComposeError, ProverError};
use batchmint_signer::SignError;
use batchmint_storage::StorageError;
use thiserror::Error;

/// Why one output attempt (or the run around it) failed.
///
/// Attribution to a sub-step lives in the persisted record, which freezes
/// `current_sub_step` where the attempt broke; these variants carry the
/// mechanical cause.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Entry guard: required inputs were unresolvable. Terminal for the
    /// output; no sub-step was entered.
    #[error("output {index} has no mining UTXO at that position")]
    MissingMiningUtxo { index: u32 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("payload composition failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("prover failed: {0}")]
    Prover(#[from] ProverError),

    #[error("signing failed: {0}")]
    Sign(#[from] SignError),

    #[error("bitcoind failed: {0}")]
    Chain(#[from] L1ClientError),

    #[error("payload did not serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}
