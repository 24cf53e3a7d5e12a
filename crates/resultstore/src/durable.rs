//! Durable record table: one engine bucket per run, keyed by URL, JSON
//! values.
use chrono::NaiveDateTime;
use config::StoreConfig;
use engine::Engine;

use crate::error::{Result, StoreError};
use crate::record::Record;
use crate::run_id::{beginning_of_time, RunId};

/// Persistence layer for every record, eligible or not.
pub struct RecordTable {
    engine: Engine,
}

impl RecordTable {
    pub fn open(cfg: &StoreConfig) -> Result<Self> {
        Ok(Self::from_engine(Engine::open(cfg)?))
    }

    pub fn from_engine(engine: Engine) -> Self {
        Self { engine }
    }

    /// `Ok(None)` when the run or the URL is unknown.
    pub fn get(&self, run_id: &str, url: &str) -> Result<Option<Record>> {
        match self.engine.get(run_id.as_bytes(), url.as_bytes())? {
            Some((_, bytes)) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Eligible records of `run_id` in URL byte order. Empty for an unknown
    /// run.
    pub fn get_all(&self, run_id: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for (_, bytes) in self.engine.scan_bucket(run_id.as_bytes())? {
            let record = Record::from_bytes(&bytes)?;
            if record.is_eligible() {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Overwrites the record at `(run_id, url)`, creating the run if needed.
    ///
    /// # Errors
    ///
    /// [`StoreError::MalformedRunId`] for a run id that would later break
    /// the run listing, [`StoreError::RecordMismatch`] when the record names
    /// a different key, and storage errors.
    ///
    /// A run dated outside `(beginning_of_time(), now)` is stored, but the
    /// startup rebuild does not list it, so it is not cached after a restart.
    pub fn put(&mut self, run_id: &str, url: &str, record: &Record) -> Result<()> {
        let id = RunId::parse(run_id)?;
        if record.run_id != run_id || record.url != url {
            return Err(StoreError::RecordMismatch {
                run_id: run_id.to_string(),
                url: url.to_string(),
                record_run: record.run_id.clone(),
                record_url: record.url.clone(),
            });
        }

        if !id.is_between(beginning_of_time(), crate::now()) {
            tracing::warn!(
                run = %run_id,
                timestamp = %id.timestamp(),
                "run dated outside the listed range; it will not be cached after a restart"
            );
        }

        let value = record.to_bytes()?;
        self.engine
            .put(run_id.as_bytes().to_vec(), url.as_bytes().to_vec(), value)?;
        Ok(())
    }

    /// Deletes the run and all of its records.
    pub fn remove_run(&mut self, run_id: &str) -> Result<()> {
        if run_id.is_empty() || !self.engine.drop_bucket(run_id.as_bytes())? {
            return Err(StoreError::RunNotFound(run_id.to_string()));
        }
        Ok(())
    }

    /// Runs whose timestamp lies strictly between `start` and `end`, in
    /// name order.
    ///
    /// # Errors
    ///
    /// A bucket name that is not a valid run id is reported, not skipped.
    pub fn get_run_ids(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for name in self.engine.buckets()? {
            let name = String::from_utf8(name).map_err(|e| StoreError::MalformedRunId {
                run_id: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                reason: "not UTF-8".into(),
            })?;
            if RunId::parse(&name)?.is_between(start, end) {
                ids.push(name);
            }
        }
        Ok(ids)
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.engine.force_flush()?)
    }

    pub fn compact(&mut self) -> Result<()> {
        Ok(self.engine.compact()?)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl std::fmt::Debug for RecordTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordTable")
            .field("engine", &self.engine)
            .finish()
    }
}
