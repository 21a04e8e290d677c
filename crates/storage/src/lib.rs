//! Manager over the run database.
//!
//! All mutation of the persisted aggregate goes through [`ProgressStore`],
//! which enforces the transition rules the raw database does not know
//! about: one `Processing` record at a time, funding before processing,
//! and txids recorded only together with completion.

use batchmint_db::{
    DbError, MintingRun, MintingRunDatabase, OutputStatus, RecordPatch, SubStep,
};
use batchmint_primitives::FundingAnalysis;
use bitcoin::Txid;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("no run has been initialized")]
    NoRun,

    #[error("output index {0} out of range")]
    NoSuchOutput(u32),

    #[error("output {index} cannot enter processing while output {busy} is processing")]
    AlreadyProcessing { index: u32, busy: u32 },

    #[error("output {0} has no funding UTXO assigned")]
    Unfunded(u32),

    #[error("output {index} cannot enter processing from {status:?}")]
    NotProcessable { index: u32, status: OutputStatus },
}

/// The run store the pipeline works against.
pub struct ProgressStore<D> {
    db: D,
}

impl<D: MintingRunDatabase> ProgressStore<D> {
    pub fn new(db: D) -> Self {
        Self { db }
    }

    /// Loads the persisted run, if one exists.
    ///
    /// A corrupt aggregate surfaces as [`DbError::Corrupt`]; callers must
    /// re-initialize rather than resume.
    pub fn load(&self) -> Result<Option<MintingRun>, StorageError> {
        Ok(self.db.get_run()?)
    }

    /// Creates a fresh run of `total_outputs` records.
    ///
    /// Funding assignments are consumed strictly by position: output `i`
    /// gets the analyzer's entry `i` and starts `Ready`; outputs past the
    /// affordable bound start `Pending`, unfunded.
    pub fn initialize(
        &self,
        total_outputs: u32,
        analysis: &FundingAnalysis,
    ) -> Result<MintingRun, StorageError> {
        let mut run = MintingRun::new(total_outputs, batchmint_db::now_millis());
        for record in &mut run.outputs {
            if let Some(utxo) = analysis.assignment(record.index as usize) {
                record.funding_utxo = Some(utxo.clone());
                record.status = OutputStatus::Ready;
            }
        }
        self.db.put_run(&run)?;
        info!(
            total_outputs,
            funded = analysis.affordable_outputs(),
            "initialized minting run"
        );
        Ok(run)
    }

    /// Re-populates missing funding assignments from the analyzer's last
    /// result, by position, and persists the repair.
    ///
    /// Records already carrying funding are left alone. Repaired records
    /// go back to `Ready` so the controller picks them up again.
    pub fn repair_funding(
        &self,
        analysis: &FundingAnalysis,
    ) -> Result<MintingRun, StorageError> {
        let mut run = self.require_run()?;
        let mut repaired = 0u32;
        for record in &mut run.outputs {
            if record.status == OutputStatus::Completed || record.has_usable_funding() {
                continue;
            }
            if let Some(utxo) = analysis.assignment(record.index as usize) {
                warn!(index = record.index, utxo = %utxo, "repairing missing funding assignment");
                record.funding_utxo = Some(utxo.clone());
                record.status = OutputStatus::Ready;
                record.error = None;
                record.updated_at = batchmint_db::now_millis();
                repaired += 1;
            }
        }
        if repaired > 0 {
            self.db.put_run(&run)?;
            info!(repaired, "persisted funding repair");
        }
        Ok(run)
    }

    /// Merges a patch into one record and persists the whole aggregate.
    pub fn update_record(&self, index: u32, patch: RecordPatch) -> Result<MintingRun, StorageError> {
        let mut run = self.require_run()?;
        if !run.patch_record(index, patch) {
            return Err(StorageError::NoSuchOutput(index));
        }
        self.db.put_run(&run)?;
        Ok(run)
    }

    /// Moves a record into `Processing`, enforcing the entry invariants.
    pub fn begin_processing(&self, index: u32) -> Result<MintingRun, StorageError> {
        let run = self.require_run()?;
        let record = run
            .record(index)
            .ok_or(StorageError::NoSuchOutput(index))?;

        if let Some(busy) = run.processing_index() {
            if busy != index {
                return Err(StorageError::AlreadyProcessing { index, busy });
            }
        }
        if !record.has_usable_funding() {
            return Err(StorageError::Unfunded(index));
        }
        match record.status {
            // Failed re-enters on retry; Processing re-enters on resume
            // after an interrupted attempt.
            OutputStatus::Pending
            | OutputStatus::Ready
            | OutputStatus::Failed
            | OutputStatus::Processing => {}
            status @ OutputStatus::Completed => {
                return Err(StorageError::NotProcessable { index, status })
            }
        }

        self.update_record(
            index,
            RecordPatch::status(OutputStatus::Processing)
                .with_sub_step(Some(SubStep::ComposePayload))
                .with_error(None),
        )
    }

    /// Records a finished attempt: `Completed` with both txids, sub-step
    /// cleared.
    pub fn complete(
        &self,
        index: u32,
        commit_txid: Txid,
        spell_txid: Txid,
    ) -> Result<MintingRun, StorageError> {
        self.update_record(
            index,
            RecordPatch::status(OutputStatus::Completed)
                .with_sub_step(None)
                .with_txids(commit_txid, spell_txid)
                .with_error(None),
        )
    }

    /// Records a failed attempt, freezing the sub-step where it broke.
    pub fn fail(&self, index: u32, error: String) -> Result<MintingRun, StorageError> {
        self.update_record(
            index,
            RecordPatch::status(OutputStatus::Failed).with_error(Some(error)),
        )
    }

    /// Wipes the aggregate for a fresh run.
    pub fn reset(&self) -> Result<(), StorageError> {
        self.db.delete_run()?;
        info!("reset minting run");
        Ok(())
    }

    fn require_run(&self) -> Result<MintingRun, StorageError> {
        self.db.get_run()?.ok_or(StorageError::NoRun)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use batchmint_db::MemRunDatabase;
    use batchmint_primitives::{FundingStrategy, Utxo};

    use super::*;

    fn utxo(fill: &str, vout: u32) -> Utxo {
        Utxo {
            txid: Txid::from_str(&fill.repeat(64)).unwrap(),
            vout,
            value: 5_000,
        }
    }

    fn analysis(utxos: Vec<Utxo>) -> FundingAnalysis {
        let current_outputs = utxos.len();
        FundingAnalysis {
            strategy: FundingStrategy::SufficientUtxos,
            resulting_utxos: utxos,
            current_outputs,
        }
    }

    fn store() -> ProgressStore<MemRunDatabase> {
        ProgressStore::new(MemRunDatabase::new())
    }

    #[test]
    fn initialize_assigns_funding_by_position() {
        let store = store();
        let run = store
            .initialize(3, &analysis(vec![utxo("a", 0), utxo("b", 1)]))
            .unwrap();

        assert_eq!(run.record(0).unwrap().status, OutputStatus::Ready);
        assert_eq!(run.record(0).unwrap().funding_utxo.as_ref().unwrap().vout, 0);
        assert_eq!(run.record(1).unwrap().status, OutputStatus::Ready);
        // Past the affordable bound: unfunded and pending.
        assert_eq!(run.record(2).unwrap().status, OutputStatus::Pending);
        assert!(run.record(2).unwrap().funding_utxo.is_none());
    }

    #[test]
    fn only_one_record_processes_at_a_time() {
        let store = store();
        store
            .initialize(2, &analysis(vec![utxo("a", 0), utxo("b", 1)]))
            .unwrap();

        store.begin_processing(0).unwrap();
        let err = store.begin_processing(1).unwrap_err();
        assert!(matches!(
            err,
            StorageError::AlreadyProcessing { index: 1, busy: 0 }
        ));

        // Re-entering the same index is a resume, not a violation.
        store.begin_processing(0).unwrap();
    }

    #[test]
    fn unfunded_record_cannot_process() {
        let store = store();
        store.initialize(2, &analysis(vec![utxo("a", 0)])).unwrap();
        let err = store.begin_processing(1).unwrap_err();
        assert!(matches!(err, StorageError::Unfunded(1)));
    }

    #[test]
    fn completed_record_cannot_reenter_processing() {
        let store = store();
        store.initialize(1, &analysis(vec![utxo("a", 0)])).unwrap();
        store.begin_processing(0).unwrap();
        let commit = Txid::from_str(&"c".repeat(64)).unwrap();
        let spell = Txid::from_str(&"d".repeat(64)).unwrap();
        store.complete(0, commit, spell).unwrap();

        let err = store.begin_processing(0).unwrap_err();
        assert!(matches!(err, StorageError::NotProcessable { index: 0, .. }));
    }

    #[test]
    fn failed_record_can_retry() {
        let store = store();
        store.initialize(1, &analysis(vec![utxo("a", 0)])).unwrap();
        store.begin_processing(0).unwrap();
        store.fail(0, "prover returned status 500".to_owned()).unwrap();

        let run = store.begin_processing(0).unwrap();
        let record = run.record(0).unwrap();
        assert_eq!(record.status, OutputStatus::Processing);
        // Retry starts over from payload composition with a clean error.
        assert_eq!(record.current_sub_step, Some(SubStep::ComposePayload));
        assert!(record.error.is_none());
    }

    #[test]
    fn failure_freezes_breaking_sub_step() {
        let store = store();
        store.initialize(1, &analysis(vec![utxo("a", 0)])).unwrap();
        store.begin_processing(0).unwrap();
        store
            .update_record(
                0,
                RecordPatch::default().with_sub_step(Some(SubStep::Broadcast)),
            )
            .unwrap();
        let run = store.fail(0, "node unreachable".to_owned()).unwrap();

        let record = run.record(0).unwrap();
        assert_eq!(record.status, OutputStatus::Failed);
        assert_eq!(record.current_sub_step, Some(SubStep::Broadcast));
        assert_eq!(record.error.as_deref(), Some("node unreachable"));
    }

    #[test]
    fn repairs_missing_funding_by_position() {
        let store = store();
        // Only output 0 funded at first.
        store.initialize(2, &analysis(vec![utxo("a", 0)])).unwrap();
        store.begin_processing(0).unwrap();
        let commit = Txid::from_str(&"c".repeat(64)).unwrap();
        let spell = Txid::from_str(&"d".repeat(64)).unwrap();
        store.complete(0, commit, spell).unwrap();

        // Analyzer re-ran and can now fund both positions.
        let run = store
            .repair_funding(&analysis(vec![utxo("a", 0), utxo("b", 1)]))
            .unwrap();

        // Completed output untouched, missing assignment filled in.
        assert_eq!(run.record(0).unwrap().status, OutputStatus::Completed);
        let repaired = run.record(1).unwrap();
        assert_eq!(repaired.status, OutputStatus::Ready);
        assert_eq!(repaired.funding_utxo.as_ref().unwrap().vout, 1);

        // And the repair was persisted, not just returned.
        let reloaded = store.load().unwrap().unwrap();
        assert!(reloaded.record(1).unwrap().has_usable_funding());
    }

    #[test]
    fn reset_wipes_the_run() {
        let store = store();
        store.initialize(1, &analysis(vec![utxo("a", 0)])).unwrap();
        store.reset().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(matches!(
            store.begin_processing(0).unwrap_err(),
            StorageError::NoRun
        ));
    }
}
