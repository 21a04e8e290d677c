use std::{fs, path::Path};

use tracing::debug;

use crate::{DbResult, MintingRun, MintingRunDatabase};

/// Tree holding minting pipeline state.
pub const RUN_TREE: &str = "batchmint";

/// Key of the run aggregate inside [`RUN_TREE`].
pub const RUN_KEY: &str = "minting_run";

/// Opens the sled database under `datadir/sled`.
pub fn open_run_database(datadir: &Path) -> DbResult<SledRunDatabase> {
    let mut database_dir = datadir.to_path_buf();
    database_dir.push("sled");
    if !database_dir.exists() {
        fs::create_dir_all(&database_dir).map_err(sled::Error::Io)?;
    }
    let db = sled::open(&database_dir)?;
    SledRunDatabase::new(&db)
}

/// Sled-backed run store. The aggregate is stored as one JSON value.
#[derive(Debug, Clone)]
pub struct SledRunDatabase {
    tree: sled::Tree,
}

impl SledRunDatabase {
    pub fn new(db: &sled::Db) -> DbResult<Self> {
        let tree = db.open_tree(RUN_TREE)?;
        Ok(Self { tree })
    }
}

impl MintingRunDatabase for SledRunDatabase {
    fn get_run(&self) -> DbResult<Option<MintingRun>> {
        match self.tree.get(RUN_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn put_run(&self, run: &MintingRun) -> DbResult<()> {
        let raw = serde_json::to_vec(run)?;
        self.tree.insert(RUN_KEY, raw)?;
        self.tree.flush()?;
        debug!(total_outputs = run.total_outputs, "persisted run aggregate");
        Ok(())
    }

    fn delete_run(&self) -> DbResult<()> {
        self.tree.remove(RUN_KEY)?;
        self.tree.flush()?;
        Ok(())
    }
}
