//! Error taxonomy for the pipeline.
//!
//! Library functions return `anyhow::Result` and raise these variants through
//! it, so callers can `downcast_ref::<PipelineError>()` to tell configuration
//! mistakes apart from pool exhaustion.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{Pool, Wave};

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required input file does not exist
    #[error("Missing input file: {}", path.display())]
    MissingInput { path: PathBuf },

    /// A required column is absent from an input table
    #[error("Missing required column '{column}' in {table}")]
    MissingColumn { table: String, column: String },

    /// Settings or wave configuration could not be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No candidate has a screenshot on disk for this pool
    #[error(
        "No eligible candidates for the {pool} pool of the {wave} wave: \
         none of [{}] points to an existing file (re-run wrangle after downloading uploads)",
        fields.join(", ")
    )]
    EmptyPool {
        wave: Wave,
        pool: Pool,
        fields: Vec<String>,
    },

    /// Annotation submitted for a task outside the persisted sample
    #[error("Task '{task_id}' is not part of the {pool} sample")]
    UnknownTask { task_id: String, pool: Pool },
}

impl PipelineError {
    pub fn missing_input(path: impl Into<PathBuf>) -> Self {
        PipelineError::MissingInput { path: path.into() }
    }

    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        PipelineError::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}
