use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{
    log_debug, log_info,
    models::AnnotationRecord,
    table::{read_records, write_records},
};

const ENABLE_LOGS: bool = true;

/// Human annotations of one pool, keyed by task id.
///
/// The table is bounded by the sample size, so it lives fully in memory and
/// every mutation rewrites the file. Last successful write wins.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    path: PathBuf,
    records: BTreeMap<String, AnnotationRecord>,
}

impl AnnotationStore {
    /// Opens the store; a missing file is an empty store, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut records = BTreeMap::new();
        if path.exists() {
            let rows: Vec<AnnotationRecord> = read_records(path)
                .with_context(|| format!("Failed to load annotations from {}", path.display()))?;
            for record in rows {
                records.insert(record.task_id.clone(), record);
            }
            log_info!("Loaded {} annotations from {}", records.len(), path.display());
        } else {
            log_debug!("No annotations yet at {}", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, task_id: &str) -> Option<&AnnotationRecord> {
        self.records.get(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.records.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &AnnotationRecord> {
        self.records.values()
    }

    /// Replaces any record with the same task id, then rewrites the table.
    /// When the write fails the in-memory state is rolled back.
    pub fn upsert(&mut self, record: AnnotationRecord) -> Result<()> {
        let task_id = record.task_id.clone();
        let previous = self.records.insert(task_id.clone(), record);
        if let Err(err) = self.persist() {
            match previous {
                Some(previous) => self.records.insert(task_id, previous),
                None => self.records.remove(&task_id),
            };
            return Err(err);
        }
        log_debug!(
            "{} annotation for {task_id}",
            if previous.is_some() { "Replaced" } else { "Saved" }
        );
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let rows: Vec<&AnnotationRecord> = self.records.values().collect();
        write_records(&self.path, &rows)
            .with_context(|| format!("Failed to save annotations to {}", self.path.display()))
    }
}
