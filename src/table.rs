//! Header-indexed CSV tables.
//!
//! Survey exports have a wide schema that shifts between waves, so raw inputs
//! and the tables exchanged with external producers are read into `RawTable`
//! (string cells addressed by column name). Tables with a fixed schema that
//! this crate owns go through serde with `read_records` / `write_records`.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::PipelineError;

/// Cell values that mean "no data" in exports written by R or pandas.
const NULL_MARKERS: [&str; 3] = ["NA", "NaN", "nan"];

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    name: String,
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(position, header)| (header.clone(), position))
            .collect();
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut cells| {
                cells.resize(width, String::new());
                cells
            })
            .collect();

        Self {
            name: name.into(),
            headers,
            index,
            rows,
        }
    }

    /// Reads a CSV file. A missing file is a configuration error.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::missing_input(path).into());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("failed to read header of {}", path.display()))?
            .iter()
            .enumerate()
            .map(|(position, header)| {
                let header = if position == 0 {
                    header.trim_start_matches('\u{feff}')
                } else {
                    header
                };
                header.trim().to_string()
            })
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.with_context(|| format!("malformed row in {}", path.display()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::new(path.display().to_string(), headers, rows))
    }

    /// Reads a CSV file if it exists.
    pub fn read_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::read(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.index
            .get(column)
            .copied()
            .ok_or_else(|| PipelineError::missing_column(&self.name, column).into())
    }

    /// Trimmed cell value; `None` for absent columns, empty cells and null markers.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let position = *self.index.get(column)?;
        let cell = self.rows.get(row)?.get(position)?.trim();
        if cell.is_empty() || NULL_MARKERS.contains(&cell) {
            None
        } else {
            Some(cell)
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows.len()).map(move |position| Row {
            table: self,
            position,
        })
    }

    pub fn row(&self, position: usize) -> Row<'_> {
        Row {
            table: self,
            position,
        }
    }

    /// New table holding the given rows, in the given order.
    pub fn select(&self, positions: &[usize]) -> RawTable {
        let rows = positions
            .iter()
            .filter_map(|&position| self.rows.get(position).cloned())
            .collect();
        RawTable::new(self.name.clone(), self.headers.clone(), rows)
    }

    pub fn push_column(&mut self, header: impl Into<String>, values: Vec<String>) {
        let header = header.into();
        self.index.insert(header.clone(), self.headers.len());
        self.headers.push(header);
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or_default());
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomically(path, |writer| {
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a RawTable,
    position: usize,
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.table.value(self.position, column)
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(PipelineError::missing_input(path).into());
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// A fixed-schema row type written with `write_records`.
///
/// `HEADERS` must list the serialized field names in declaration order; it is
/// what an empty table is written with.
pub trait TableRow: Serialize {
    const HEADERS: &'static [&'static str];
}

impl<T: TableRow> TableRow for &T {
    const HEADERS: &'static [&'static str] = T::HEADERS;
}

pub fn write_records<T: TableRow>(path: &Path, records: &[T]) -> Result<()> {
    write_atomically(path, |writer| {
        if records.is_empty() {
            return writer.write_record(T::HEADERS);
        }
        for record in records {
            writer.serialize(record)?;
        }
        Ok(())
    })
}

/// Writes to a sibling temp file and renames it over `path`, so a failed run
/// leaves the previous table intact.
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut csv::Writer<fs::File>) -> csv::Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let staging = staging_path(path);
    {
        let mut writer = csv::Writer::from_path(&staging)
            .with_context(|| format!("failed to create {}", staging.display()))?;
        write(&mut writer).with_context(|| format!("failed to write {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", staging.display()))?;
    }

    fs::rename(&staging, path)
        .with_context(|| format!("failed to move {} into place", path.display()))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Parses a numeric cell, tolerating the "12.0" form R and pandas emit.
pub fn parse_count(raw: Option<&str>) -> Option<u32> {
    let value: f64 = raw?.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

pub fn parse_seconds(raw: Option<&str>) -> Option<f64> {
    let value: f64 = raw?.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Parses the boolean spellings found in Python and R exports.
pub fn parse_flag(raw: Option<&str>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "1.0" | "yes" => Some(true),
        "false" | "f" | "0" | "0.0" | "no" => Some(false),
        _ => None,
    }
}
