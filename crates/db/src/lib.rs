//! Persistence for minting run progress.
//!
//! The whole [`MintingRun`] aggregate lives under a single key, written
//! back in full on every record update. Databases are synchronous; writes
//! complete before the pipeline advances.

mod sled_db;
mod types;

use thiserror::Error;

pub use sled_db::{open_run_database, SledRunDatabase, RUN_KEY, RUN_TREE};
pub use types::{now_millis, MintingRun, OutputRecord, OutputStatus, RecordPatch, SubStep};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Storage(#[from] sled::Error),

    /// The stored aggregate no longer decodes. The run cannot be resumed
    /// and must be re-initialized.
    #[error("stored run is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Storage interface for the run aggregate.
pub trait MintingRunDatabase: Send + Sync + 'static {
    fn get_run(&self) -> DbResult<Option<MintingRun>>;

    fn put_run(&self, run: &MintingRun) -> DbResult<()>;

    fn delete_run(&self) -> DbResult<()>;
}

/// In-memory database for tests.
#[derive(Debug, Default)]
pub struct MemRunDatabase {
    run: std::sync::Mutex<Option<MintingRun>>,
}

impl MemRunDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MintingRunDatabase for MemRunDatabase {
    fn get_run(&self) -> DbResult<Option<MintingRun>> {
        Ok(self.run.lock().expect("poisoned").clone())
    }

    fn put_run(&self, run: &MintingRun) -> DbResult<()> {
        *self.run.lock().expect("poisoned") = Some(run.clone());
        Ok(())
    }

    fn delete_run(&self) -> DbResult<()> {
        *self.run.lock().expect("poisoned") = None;
        Ok(())
    }
}
