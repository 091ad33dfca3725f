//! RegistryStore — redb-backed persistence for the cluster job registry.
//!
//! Provides typed CRUD operations over job records, deployed resources,
//! submitted graphs and final accumulator snapshots. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use gridjob_core::{Accumulators, Dag, DeploymentResource};

use crate::error::{Stage, StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Tag a redb failure with the stage it happened in.
macro_rules! map_err {
    ($stage:ident) => {
        |e| StateError::storage(Stage::$stage, e)
    };
}

/// Thread-safe registry store backed by redb.
#[derive(Clone)]
pub struct RegistryStore {
    db: Arc<Database>,
}

impl RegistryStore {
    /// Open (or create) a persistent registry at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "registry store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory registry.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory registry store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(JOBS).map_err(map_err!(Table))?;
        txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        txn.open_table(GRAPHS).map_err(map_err!(Table))?;
        txn.open_table(ACCUMULATORS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Jobs ───────────────────────────────────────────────────────

    /// Insert or update a job record.
    pub fn put_job(&self, record: &JobRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            table
                .insert(record.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(job = %record.name, status = %record.status, "job record stored");
        Ok(())
    }

    /// Get a job record by name.
    pub fn get_job(&self, job: &str) -> StateResult<Option<JobRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        match table.get(job).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: JobRecord =
                    serde_json::from_slice(guard.value())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all job records.
    pub fn list_jobs(&self) -> StateResult<Vec<JobRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: JobRecord =
                serde_json::from_slice(value.value())?;
            results.push(record);
        }
        Ok(results)
    }

    // ── Resources ──────────────────────────────────────────────────

    /// Get one deployed resource of a job.
    pub fn get_resource(&self, job: &str, name: &str) -> StateResult<Option<DeploymentResource>> {
        let key = resource_key(job, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let res: DeploymentResource =
                    serde_json::from_slice(guard.value())?;
                Ok(Some(res))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace a batch of resources for a job in one transaction.
    pub fn put_resources(&self, job: &str, resources: &[DeploymentResource]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            for res in resources {
                let key = resource_key(job, res.name());
                let value = serde_json::to_vec(res)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%job, count = resources.len(), "resources stored");
        Ok(())
    }

    /// List all deployed resources of a job.
    pub fn list_resources_for_job(&self, job: &str) -> StateResult<Vec<DeploymentResource>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if resource_owner(key.value()) == Some(job) {
                let res: DeploymentResource =
                    serde_json::from_slice(value.value())?;
                results.push(res);
            }
        }
        Ok(results)
    }

    // ── Graphs ─────────────────────────────────────────────────────

    /// Store the submitted graph of a job.
    pub fn put_graph(&self, job: &str, graph: &Dag) -> StateResult<()> {
        let value = serde_json::to_vec(graph)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(GRAPHS).map_err(map_err!(Table))?;
            table
                .insert(job, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get the submitted graph of a job.
    pub fn get_graph(&self, job: &str) -> StateResult<Option<Dag>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GRAPHS).map_err(map_err!(Table))?;
        match table.get(job).map_err(map_err!(Read))? {
            Some(guard) => {
                let graph: Dag =
                    serde_json::from_slice(guard.value())?;
                Ok(Some(graph))
            }
            None => Ok(None),
        }
    }

    // ── Accumulators ───────────────────────────────────────────────

    /// Store the final accumulator snapshot of a job.
    pub fn put_accumulators(&self, job: &str, snapshot: &Accumulators) -> StateResult<()> {
        let value = serde_json::to_vec(snapshot)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ACCUMULATORS).map_err(map_err!(Table))?;
            table
                .insert(job, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get the stored accumulator snapshot of a job.
    pub fn get_accumulators(&self, job: &str) -> StateResult<Option<Accumulators>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACCUMULATORS).map_err(map_err!(Table))?;
        match table.get(job).map_err(map_err!(Read))? {
            Some(guard) => {
                let snapshot: Accumulators =
                    serde_json::from_slice(guard.value())?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    // ── Teardown ───────────────────────────────────────────────────

    /// Remove a job and everything stored under it in one transaction.
    /// Returns true if the job record existed.
    pub fn purge_job(&self, job: &str) -> StateResult<bool> {
        // Collect resource keys in a read transaction first.
        let resource_keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                if resource_owner(key.value()) == Some(job) {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut jobs = txn.open_table(JOBS).map_err(map_err!(Table))?;
            existed = jobs.remove(job).map_err(map_err!(Write))?.is_some();

            let mut resources = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            for key in &resource_keys {
                resources.remove(key.as_str()).map_err(map_err!(Write))?;
            }

            let mut graphs = txn.open_table(GRAPHS).map_err(map_err!(Table))?;
            graphs.remove(job).map_err(map_err!(Write))?;

            let mut accumulators = txn.open_table(ACCUMULATORS).map_err(map_err!(Table))?;
            accumulators.remove(job).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%job, existed, resources = resource_keys.len(), "job purged");
        Ok(existed)
    }
}
