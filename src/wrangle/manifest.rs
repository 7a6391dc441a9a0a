use std::{collections::HashMap, path::Path};

use anyhow::Result;

use crate::{
    log_debug, log_info,
    models::{CanonicalRecord, Slot},
    table::{parse_flag, RawTable},
};

const ENABLE_LOGS: bool = true;

/// One download attempt from `uploaded_files_manifest.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub ok: bool,
    pub http_status: Option<u16>,
    pub saved_path: Option<String>,
}

impl ManifestEntry {
    fn local_path(&self) -> Option<&str> {
        if self.ok {
            self.saved_path.as_deref()
        } else {
            None
        }
    }
}

/// Download outcomes keyed by (response id, file id).
#[derive(Debug, Clone, Default)]
pub struct FileManifest {
    entries: HashMap<(String, String), ManifestEntry>,
}

impl FileManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let table = RawTable::read(path)?;
        Self::from_table(&table)
    }

    pub fn from_table(table: &RawTable) -> Result<Self> {
        for column in ["response_id", "file_id", "ok"] {
            table.require_column(column)?;
        }

        let mut manifest = Self::default();
        for row in table.rows() {
            let (Some(response_id), Some(file_id)) = (row.get("response_id"), row.get("file_id"))
            else {
                continue;
            };
            let entry = ManifestEntry {
                ok: parse_flag(row.get("ok")).unwrap_or(false),
                http_status: row
                    .get("http_status")
                    .and_then(|raw| raw.parse::<f64>().ok())
                    .map(|code| code as u16),
                saved_path: row.get("saved_path").map(str::to_string),
            };
            manifest.insert(response_id, file_id, entry);
        }

        log_info!(
            "Loaded {} manifest entries from {}",
            manifest.entries.len(),
            table.name()
        );
        Ok(manifest)
    }

    /// Retries produce several attempts per file; a successful one is kept
    /// over any failure.
    pub fn insert(&mut self, response_id: &str, file_id: &str, entry: ManifestEntry) {
        let key = (response_id.to_string(), file_id.to_string());
        match self.entries.get(&key) {
            Some(existing) if existing.local_path().is_some() && entry.local_path().is_none() => {}
            _ => {
                self.entries.insert(key, entry);
            }
        }
    }

    /// Local path of a successful download, if any.
    pub fn resolve(&self, response_id: &str, file_id: &str) -> Option<&str> {
        self.entries
            .get(&(response_id.to_string(), file_id.to_string()))
            .and_then(ManifestEntry::local_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fills each screenshot slot's path from the manifest, slot by slot.
/// Returns how many referenced files could not be resolved.
pub fn attach_screenshot_paths(records: &mut [CanonicalRecord], manifest: &FileManifest) -> usize {
    let mut unresolved = 0;
    for record in records.iter_mut() {
        for slot in Slot::ALL {
            let Some(reference) = record.screenshots.get_mut(&slot) else {
                continue;
            };
            let Some(file_id) = reference.file_id.as_deref() else {
                reference.path = None;
                continue;
            };
            reference.path = manifest
                .resolve(&record.respondent_id, file_id)
                .map(str::to_string);
            if reference.path.is_none() {
                unresolved += 1;
                log_debug!(
                    "No downloaded file for {} slot {} (file {file_id})",
                    record.respondent_id,
                    slot.column_stem()
                );
            }
        }
    }
    unresolved
}
