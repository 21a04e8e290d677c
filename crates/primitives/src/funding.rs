use serde::{Deserialize, Serialize};

use crate::Utxo;

/// How the external funding analyzer decided to cover the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingStrategy {
    /// The wallet already held one suitable coin per output.
    SufficientUtxos,

    /// A funding transaction reorganized wallet coins into per-output
    /// denominations.
    Reorganize,

    /// Fewer coins than outputs; the run can only partially complete.
    Partial,
}

/// Last result of the external funding analyzer.
///
/// The pipeline never computes assignments itself; it consumes
/// `resulting_utxos` strictly by position (output `i` is funded by entry
/// `i`) and treats `resulting_utxos.len()` as the affordable bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingAnalysis {
    pub strategy: FundingStrategy,

    /// One funding coin per affordable output, index-aligned with the run.
    pub resulting_utxos: Vec<Utxo>,

    /// How many outputs the analyzer judged affordable. Usually equals
    /// `resulting_utxos.len()`; kept separately because the analyzer reports
    /// both.
    pub current_outputs: usize,
}

impl FundingAnalysis {
    /// Funding assignment for output `index`, if affordable.
    pub fn assignment(&self, index: usize) -> Option<&Utxo> {
        self.resulting_utxos.get(index)
    }

    /// Highest output index (exclusive) this analysis can pay for.
    pub fn affordable_outputs(&self) -> usize {
        self.resulting_utxos.len()
    }
}
