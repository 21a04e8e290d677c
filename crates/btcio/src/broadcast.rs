use bitcoin::{consensus, Transaction, Txid};
use tracing::{info, warn};

use crate::client::{L1Client, L1ClientError, SubmitPackageResponse};

/// Txids of a fully-accepted commit/spell package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageTxids {
    pub commit_txid: Txid,
    pub spell_txid: Txid,
}

/// Broadcasts the commit/spell pair atomically.
///
/// Both transactions must be taken by the node. A per-transaction
/// "already in mempool" outcome counts as accepted (resubmission after an
/// interrupted attempt); anything else rejected fails the whole package,
/// and no txid is reported to the caller.
pub async fn broadcast_package<C: L1Client + ?Sized>(
    client: &C,
    commit_hex: &str,
    spell_hex: &str,
) -> Result<PackageTxids, L1ClientError> {
    let commit_tx: Transaction = consensus::encode::deserialize_hex(commit_hex)?;
    let spell_tx: Transaction = consensus::encode::deserialize_hex(spell_hex)?;
    let commit_txid = commit_tx.compute_txid();
    let spell_txid = spell_tx.compute_txid();

    info!(%commit_txid, %spell_txid, "submitting transaction package");
    let response = client
        .submit_package(&[commit_hex.to_owned(), spell_hex.to_owned()])
        .await?;

    check_accepted(&response, commit_txid, "commit")?;
    check_accepted(&response, spell_txid, "spell")?;

    info!(%commit_txid, %spell_txid, "package accepted");
    Ok(PackageTxids {
        commit_txid,
        spell_txid,
    })
}

/// Rejection details bitcoind uses when the transaction is already known.
fn is_already_known(reason: &str) -> bool {
    reason.contains("txn-already-in-mempool")
        || reason.contains("already in mempool")
        || reason.contains("txn-already-known")
}

fn check_accepted(
    response: &SubmitPackageResponse,
    txid: Txid,
    role: &'static str,
) -> Result<(), L1ClientError> {
    let result = response
        .tx_results
        .values()
        .find(|result| result.txid == txid)
        .ok_or(L1ClientError::PackageTxRejected {
            role,
            reason: ": missing from package results".to_owned(),
        })?;

    match &result.error {
        None => Ok(()),
        Some(reason) if is_already_known(reason) => {
            warn!(%txid, role, "transaction already in mempool, treating as accepted");
            Ok(())
        }
        Some(reason) => Err(L1ClientError::PackageTxRejected {
            role,
            reason: format!(": {reason}"),
        }),
    }
}
