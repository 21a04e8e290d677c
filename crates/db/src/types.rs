use std::time::{SystemTime, UNIX_EPOCH};

use batchmint_primitives::Utxo;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

/// Lifecycle of one run output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatus {
    /// Created, funding not yet confirmed usable.
    Pending,

    /// Funded and waiting its turn.
    Ready,

    /// The single output currently being worked on.
    Processing,

    /// Minted; both txids recorded.
    Completed,

    /// Attempt failed; error and breaking sub-step recorded.
    Failed,
}

/// Where inside an attempt an output currently is (or broke).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStep {
    ComposePayload,
    CallProver,
    SignTxs,
    Broadcast,
}

/// Persisted state of one output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub index: u32,

    pub status: OutputStatus,

    /// Sub-step in flight, or the one that broke for a `Failed` record.
    pub current_sub_step: Option<SubStep>,

    /// Mining tx output this record will consume.
    pub mining_utxo: Option<Utxo>,

    /// Fee-paying coin assigned by the funding analyzer.
    pub funding_utxo: Option<Utxo>,

    pub commit_txid: Option<Txid>,

    pub spell_txid: Option<Txid>,

    pub error: Option<String>,

    /// Last composed prover payload, kept for inspection and retries.
    pub payload: Option<serde_json::Value>,

    /// Unix millis.
    pub created_at: u64,

    pub updated_at: u64,
}

impl OutputRecord {
    pub fn new(index: u32, now: u64) -> Self {
        Self {
            index,
            status: OutputStatus::Pending,
            current_sub_step: None,
            mining_utxo: None,
            funding_utxo: None,
            commit_txid: None,
            spell_txid: None,
            error: None,
            payload: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the funding assignment is usable for processing.
    pub fn has_usable_funding(&self) -> bool {
        self.funding_utxo.is_some()
    }
}

/// Partial update merged into an [`OutputRecord`].
///
/// `txids` carries commit and spell together; there is deliberately no way
/// to record one without the other.
#[derive(Debug, Default, Clone)]
pub struct RecordPatch {
    pub status: Option<OutputStatus>,

    /// `Some(None)` clears the sub-step.
    pub sub_step: Option<Option<SubStep>>,

    pub mining_utxo: Option<Utxo>,

    pub funding_utxo: Option<Utxo>,

    pub txids: Option<(Txid, Txid)>,

    /// `Some(None)` clears a stale error.
    pub error: Option<Option<String>>,

    pub payload: Option<serde_json::Value>,
}

impl RecordPatch {
    pub fn status(status: OutputStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_sub_step(mut self, sub_step: Option<SubStep>) -> Self {
        self.sub_step = Some(sub_step);
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_txids(mut self, commit: Txid, spell: Txid) -> Self {
        self.txids = Some((commit, spell));
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub(crate) fn apply(self, record: &mut OutputRecord, now: u64) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(sub_step) = self.sub_step {
            record.current_sub_step = sub_step;
        }
        if let Some(utxo) = self.mining_utxo {
            record.mining_utxo = Some(utxo);
        }
        if let Some(utxo) = self.funding_utxo {
            record.funding_utxo = Some(utxo);
        }
        if let Some((commit, spell)) = self.txids {
            record.commit_txid = Some(commit);
            record.spell_txid = Some(spell);
        }
        if let Some(error) = self.error {
            record.error = error;
        }
        if let Some(payload) = self.payload {
            record.payload = Some(payload);
        }
        record.updated_at = now;
    }
}

/// The persisted aggregate: every output of the current run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintingRun {
    /// Fixed at initialization, never changes afterwards.
    pub total_outputs: u32,

    pub outputs: Vec<OutputRecord>,
}

impl MintingRun {
    pub fn new(total_outputs: u32, now: u64) -> Self {
        let outputs = (0..total_outputs)
            .map(|index| OutputRecord::new(index, now))
            .collect();
        Self {
            total_outputs,
            outputs,
        }
    }

    /// Completed outputs, always recounted from the records.
    pub fn completed_count(&self) -> usize {
        self.outputs
            .iter()
            .filter(|record| record.status == OutputStatus::Completed)
            .count()
    }

    pub fn record(&self, index: u32) -> Option<&OutputRecord> {
        self.outputs.get(index as usize)
    }

    /// Applies a patch to one record, stamping `updated_at`.
    pub fn patch_record(&mut self, index: u32, patch: RecordPatch) -> bool {
        match self.outputs.get_mut(index as usize) {
            Some(record) => {
                patch.apply(record, now_millis());
                true
            }
            None => false,
        }
    }

    /// The index currently marked `Processing`, if any.
    pub fn processing_index(&self) -> Option<u32> {
        self.outputs
            .iter()
            .find(|record| record.status == OutputStatus::Processing)
            .map(|record| record.index)
    }
}

/// Current wall-clock time as unix millis.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
