use std::sync::Arc;

use batchmint_btcio::{broadcast_package, L1Client, PackageTxids};
use batchmint_db::{MintingRunDatabase, RecordPatch, SubStep};
use batchmint_key_derivation::KeyRing;
use batchmint_primitives::{FundingAnalysis, ProofContext, Utxo};
use batchmint_prover::{compose_request, validate_request, ProverApi};
use batchmint_signer::{sign_commit_tx, sign_spell_tx};
use batchmint_storage::ProgressStore;
use tracing::{debug, error, info};

use crate::errors::ProcessError;

/// Drives one output through its four sub-steps.
///
/// Every state change is written to the store before the next await; the
/// in-memory record is re-read at entry and never trusted across steps.
pub struct OutputProcessor<D> {
    store: Arc<ProgressStore<D>>,
    prover: Arc<dyn ProverApi>,
    l1: Arc<dyn L1Client>,
    ring: KeyRing,
    change_address: String,
    fee_rate: u64,
}

impl<D: MintingRunDatabase> OutputProcessor<D> {
    pub fn new(
        store: Arc<ProgressStore<D>>,
        prover: Arc<dyn ProverApi>,
        l1: Arc<dyn L1Client>,
        ring: KeyRing,
        change_address: String,
        fee_rate: u64,
    ) -> Self {
        Self {
            store,
            prover,
            l1,
            ring,
            change_address,
            fee_rate,
        }
    }

    /// Runs the full attempt for `index`. On any failure the record is
    /// marked `Failed` with the error string before the error propagates.
    pub async fn process_output(
        &self,
        index: u32,
        ctx: &ProofContext,
        analysis: &FundingAnalysis,
    ) -> Result<PackageTxids, ProcessError> {
        match self.try_process(index, ctx, analysis).await {
            Ok(txids) => {
                info!(index, commit = %txids.commit_txid, spell = %txids.spell_txid,
                    "output minted");
                Ok(txids)
            }
            Err(err) => {
                error!(index, %err, "output attempt failed");
                if should_mark_failed(&err) {
                    // Best effort; the original processing error wins.
                    let _ = self.store.fail(index, err.to_string());
                }
                Err(err)
            }
        }
    }

    async fn try_process(
        &self,
        index: u32,
        ctx: &ProofContext,
        analysis: &FundingAnalysis,
    ) -> Result<PackageTxids, ProcessError> {
        // Entry guard: both UTXOs must resolve before any sub-step runs.
        let record = self
            .store
            .load()?
            .and_then(|run| run.record(index).cloned());
        let mining_utxo = record
            .as_ref()
            .and_then(|r| r.mining_utxo.clone())
            .or_else(|| ctx.mining_utxo(index as usize).cloned())
            .ok_or(ProcessError::MissingMiningUtxo { index })?;
        let funding_utxo = record.as_ref().and_then(|r| r.funding_utxo.clone());

        self.store.begin_processing(index)?;
        let run = self.store.update_record(
            index,
            RecordPatch {
                mining_utxo: Some(mining_utxo.clone()),
                ..Default::default()
            },
        )?;
        // begin_processing guarantees the funding assignment exists.
        let funding_utxo: Utxo = funding_utxo
            .or_else(|| {
                run.record(index)
                    .and_then(|r| r.funding_utxo.clone())
                    .or_else(|| analysis.assignment(index as usize).cloned())
            })
            .ok_or(batchmint_storage::StorageError::Unfunded(index))?;

        // Sub-step 1: compose the prover payload.
        debug!(index, "composing payload");
        let block_proof = self.l1.get_tx_out_proof(&ctx.mining_txid).await?;
        let funding_tx_hex = self.l1.get_raw_transaction_hex(&funding_utxo.txid).await?;
        let request = compose_request(
            Some(&mining_utxo),
            Some(&funding_utxo),
            ctx,
            &self.change_address,
            &block_proof,
            self.fee_rate,
        )?;
        validate_request(&request)?;
        self.store.update_record(
            index,
            RecordPatch::default().with_payload(serde_json::to_value(&request)?),
        )?;

        // Sub-step 2: call the prover.
        self.set_sub_step(index, SubStep::CallProver)?;
        let proved = self.prover.prove(&request).await?;

        // Sub-step 3: sign commit, then spell.
        self.set_sub_step(index, SubStep::SignTxs)?;
        let commit = sign_commit_tx(&self.ring, &proved.commit_tx_hex, &funding_tx_hex)?;
        let spell = sign_spell_tx(
            &self.ring,
            &proved.spell_tx_hex,
            &commit.hex,
            &ctx.mining_tx_hex,
        )?;

        // Sub-step 4: broadcast the package atomically.
        self.set_sub_step(index, SubStep::Broadcast)?;
        let txids = broadcast_package(self.l1.as_ref(), &commit.hex, &spell.hex).await?;

        // Txids and completion land in one write.
        self.store.complete(index, txids.commit_txid, txids.spell_txid)?;
        Ok(txids)
    }

    fn set_sub_step(&self, index: u32, sub_step: SubStep) -> Result<(), ProcessError> {
        self.store
            .update_record(index, RecordPatch::default().with_sub_step(Some(sub_step)))?;
        Ok(())
    }
}

/// Guard rejections describe why the attempt never started; only errors
/// from a started attempt (or an unresolvable mining UTXO) mark the
/// record `Failed`.
fn should_mark_failed(err: &ProcessError) -> bool {
    use batchmint_storage::StorageError;
    !matches!(
        err,
        ProcessError::Storage(
            StorageError::AlreadyProcessing { .. }
                | StorageError::Unfunded(_)
                | StorageError::NotProcessable { .. }
                | StorageError::NoRun
                | StorageError::NoSuchOutput(_)
        )
    )
}
