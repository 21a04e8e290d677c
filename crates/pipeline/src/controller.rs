use std::time::Duration;

use batchmint_config::PipelineConfig;
use batchmint_db::{MintingRun, MintingRunDatabase, OutputStatus};
use batchmint_primitives::{FundingAnalysis, ProofContext};
use batchmint_storage::ProgressStore;
use tracing::{info, warn};

use crate::{errors::ProcessError, processor::OutputProcessor};

/// Sequential run driver.
///
/// Outputs are attempted strictly in index order. A failed output never
/// blocks the rest of the run; it is recorded and the controller moves on
/// after a slightly longer delay. Before every attempt the authoritative
/// record is re-read from the store, so a restart resumes exactly where
/// the persisted state says.
pub struct PipelineController<D> {
    processor: OutputProcessor<D>,
    store: std::sync::Arc<ProgressStore<D>>,
    success_delay: Duration,
    failure_delay: Duration,
}

/// Outcome of a whole run pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub attempted: u32,
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl<D: MintingRunDatabase> PipelineController<D> {
    pub fn new(
        processor: OutputProcessor<D>,
        store: std::sync::Arc<ProgressStore<D>>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            processor,
            store,
            success_delay: Duration::from_millis(config.success_advance_delay_ms),
            failure_delay: Duration::from_millis(config.failure_advance_delay_ms),
        }
    }

    /// Loads (or creates) the run, repairs funding assignments, then works
    /// through every output in order.
    pub async fn run(
        &self,
        ctx: &ProofContext,
        analysis: &FundingAnalysis,
    ) -> Result<RunSummary, ProcessError> {
        let run = self.load_or_initialize(ctx, analysis)?;
        let total = run.total_outputs;
        let affordable = analysis.affordable_outputs() as u32;
        info!(total, affordable, "starting minting run");

        let mut summary = RunSummary::default();
        for index in 0..total {
            // Outputs past what the analyzer can pay for stay untouched.
            if index >= affordable {
                info!(index, affordable, "stopping at the affordable bound");
                break;
            }

            // Authoritative state, re-read every iteration.
            let run = self.store.load()?.ok_or(batchmint_storage::StorageError::NoRun)?;
            let status = run
                .record(index)
                .ok_or(batchmint_storage::StorageError::NoSuchOutput(index))?
                .status;
            match status {
                OutputStatus::Completed => {
                    summary.skipped += 1;
                    continue;
                }
                OutputStatus::Failed => {
                    // Needs an explicit retry; do not loop on a known-bad
                    // output forever.
                    warn!(index, "skipping failed output, retry it explicitly");
                    summary.skipped += 1;
                    continue;
                }
                // Processing means the previous process died mid-attempt;
                // re-entering from the top is safe, broadcast tolerates a
                // resubmission.
                OutputStatus::Pending | OutputStatus::Ready | OutputStatus::Processing => {}
            }

            summary.attempted += 1;
            let delay = match self.processor.process_output(index, ctx, analysis).await {
                Ok(_) => {
                    summary.completed += 1;
                    self.success_delay
                }
                Err(_) => {
                    // Already recorded against the output.
                    summary.failed += 1;
                    self.failure_delay
                }
            };
            if index + 1 < affordable.min(total) {
                tokio::time::sleep(delay).await;
            }
        }

        info!(?summary, "minting run pass finished");
        Ok(summary)
    }

    /// Re-attempts one output, regardless of its position in the run.
    /// The attempt starts over from payload composition.
    pub async fn retry_output(
        &self,
        index: u32,
        ctx: &ProofContext,
        analysis: &FundingAnalysis,
    ) -> Result<(), ProcessError> {
        info!(index, "retrying output");
        self.processor.process_output(index, ctx, analysis).await?;
        Ok(())
    }

    fn load_or_initialize(
        &self,
        ctx: &ProofContext,
        analysis: &FundingAnalysis,
    ) -> Result<MintingRun, ProcessError> {
        match self.store.load()? {
            Some(_) => Ok(self.store.repair_funding(analysis)?),
            None => {
                let total = ctx.spendable_outputs.len() as u32;
                Ok(self.store.initialize(total, analysis)?)
            }
        }
    }
}
