//! Per-wave field-group configuration.
//!
//! Upstream column names change between survey deployments, so every column
//! the builder reads comes from a JSON file per wave. Each field is a list of
//! candidate templates; in the Android group the branch token (default
//! `{day}`) is replaced by the branch index. Every candidate present in the
//! export header is kept, and rows read the first one holding a value.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    log_debug, log_info, log_warn,
    models::{Metric, Slot, Wave},
    table::{RawTable, Row},
};

const ENABLE_LOGS: bool = true;

pub const MAX_BRANCHES: u8 = 7;

fn default_branch_count() -> u8 {
    MAX_BRANCHES
}

fn default_branch_token() -> String {
    "{day}".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DurationColumns {
    #[serde(default)]
    pub hours: Vec<String>,
    #[serde(default)]
    pub minutes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldGroup {
    #[serde(default)]
    pub metrics: BTreeMap<Metric, DurationColumns>,
    #[serde(default)]
    pub screenshots: BTreeMap<Slot, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingFields {
    pub avg_upload_field: Option<String>,
    pub app_upload_field: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaFields {
    pub os_field: Option<String>,
    pub browser_field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveConfig {
    pub wave: Wave,
    pub response_id_field: String,
    pub completion_field: String,
    pub device_field: String,
    #[serde(default)]
    pub participant_id_field: Option<String>,
    #[serde(default)]
    pub timing: TimingFields,
    #[serde(default)]
    pub meta: MetaFields,
    #[serde(default = "default_branch_count")]
    pub branch_count: u8,
    #[serde(default = "default_branch_token")]
    pub branch_token: String,
    pub ios: FieldGroup,
    pub android: FieldGroup,
}

/// Header columns resolved for one metric, in candidate order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDuration {
    pub hours: Vec<String>,
    pub minutes: Vec<String>,
}

/// A field group after matching its templates against the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub metrics: BTreeMap<Metric, ResolvedDuration>,
    pub screenshots: BTreeMap<Slot, Vec<String>>,
}

impl ResolvedGroup {
    /// Candidate columns of each field that has at least one in the header.
    pub fn fields(&self) -> impl Iterator<Item = &[String]> {
        self.metrics
            .values()
            .flat_map(|duration| [duration.hours.as_slice(), duration.minutes.as_slice()])
            .chain(self.screenshots.values().map(Vec::as_slice))
            .filter(|candidates| !candidates.is_empty())
    }

    /// Every column of the group that exists in the header.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields().flatten().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.columns().next().is_none()
    }
}

/// First non-null value among a field's candidate columns.
pub fn first_value<'a>(row: &Row<'a>, candidates: &[String]) -> Option<&'a str> {
    candidates.iter().find_map(|column| row.get(column))
}

/// Where the participant identity comes from for one wave load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    Column(String),
    /// Row-order identifiers; only meaningful inside a single fixture load.
    Synthetic,
}

/// The wave configuration bound to a concrete export header.
#[derive(Debug, Clone)]
pub struct ResolvedLayout {
    pub wave: Wave,
    pub response_id: String,
    pub completion: String,
    pub device: String,
    pub identity: IdentitySource,
    pub avg_upload: Option<String>,
    pub app_upload: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub ios: ResolvedGroup,
    /// Android field group per branch index, ascending.
    pub branches: Vec<(u8, ResolvedGroup)>,
}

impl WaveConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::missing_input(path).into());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read wave config from {}", path.display()))?;
        let config: WaveConfig = serde_json::from_str(&contents).map_err(|err| {
            PipelineError::InvalidConfig(format!("{}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.branch_count == 0 || self.branch_count > MAX_BRANCHES {
            return Err(PipelineError::InvalidConfig(format!(
                "{} wave: branch_count must be between 1 and {MAX_BRANCHES}, got {}",
                self.wave, self.branch_count
            ))
            .into());
        }
        if self.branch_token.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "{} wave: branch_token must not be empty",
                self.wave
            ))
            .into());
        }

        let untokenized = android_templates(&self.android)
            .filter(|template| !template.contains(self.branch_token.as_str()))
            .count();
        if untokenized > 0 {
            log_warn!(
                "{} wave: {untokenized} android template(s) lack the branch token '{}' and read the same column for every branch",
                self.wave,
                self.branch_token
            );
        }
        Ok(())
    }

    /// Binds the configuration to an export header.
    ///
    /// Structural columns are required. Field-group columns are optional
    /// because their presence varies by survey version.
    pub fn resolve(
        &self,
        table: &RawTable,
        identity_override: Option<&str>,
        allow_synthetic_ids: bool,
    ) -> Result<ResolvedLayout> {
        for column in [
            &self.response_id_field,
            &self.completion_field,
            &self.device_field,
        ] {
            table.require_column(column)?;
        }

        let identity_field = identity_override.or(self.participant_id_field.as_deref());
        let identity = match identity_field {
            Some(column) if table.has_column(column) => IdentitySource::Column(column.to_string()),
            Some(column) if !allow_synthetic_ids => {
                return Err(PipelineError::missing_column(table.name(), column).into());
            }
            None if !allow_synthetic_ids => {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} wave: no participant identity column configured",
                    self.wave
                ))
                .into());
            }
            _ => IdentitySource::Synthetic,
        };

        let optional = |column: &Option<String>| -> Option<String> {
            let column = column.as_ref()?;
            if table.has_column(column) {
                Some(column.clone())
            } else {
                log_debug!("{} wave: optional column '{column}' not in export", self.wave);
                None
            }
        };

        let ios = resolve_group(&self.ios, table, None, &self.branch_token);
        let branches: Vec<(u8, ResolvedGroup)> = (1..=self.branch_count)
            .map(|branch| {
                (
                    branch,
                    resolve_group(&self.android, table, Some(branch), &self.branch_token),
                )
            })
            .collect();

        let resolved_columns = ios.columns().count()
            + branches
                .iter()
                .map(|(_, group)| group.columns().count())
                .sum::<usize>();
        log_info!(
            "{} wave: resolved {resolved_columns} field-group columns ({} iOS) across {} android branches",
            self.wave,
            ios.columns().count(),
            branches.len()
        );
        if ios.is_empty() && branches.iter().all(|(_, group)| group.is_empty()) {
            log_warn!(
                "{} wave: no configured field-group column matched the export header",
                self.wave
            );
        }

        Ok(ResolvedLayout {
            wave: self.wave,
            response_id: self.response_id_field.clone(),
            completion: self.completion_field.clone(),
            device: self.device_field.clone(),
            identity,
            avg_upload: optional(&self.timing.avg_upload_field),
            app_upload: optional(&self.timing.app_upload_field),
            os: optional(&self.meta.os_field),
            browser: optional(&self.meta.browser_field),
            ios,
            branches,
        })
    }
}

fn android_templates(group: &FieldGroup) -> impl Iterator<Item = &String> {
    group
        .metrics
        .values()
        .flat_map(|duration| duration.hours.iter().chain(duration.minutes.iter()))
        .chain(group.screenshots.values().flatten())
}

fn resolve_group(
    group: &FieldGroup,
    table: &RawTable,
    branch: Option<u8>,
    token: &str,
) -> ResolvedGroup {
    let present = |candidates: &[String]| -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for template in candidates {
            let column = match branch {
                Some(index) => template.replace(token, &index.to_string()),
                None => template.clone(),
            };
            if table.has_column(&column) && !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    };

    let metrics = group
        .metrics
        .iter()
        .map(|(metric, columns)| {
            (
                *metric,
                ResolvedDuration {
                    hours: present(columns.hours.as_slice()),
                    minutes: present(columns.minutes.as_slice()),
                },
            )
        })
        .collect();

    let screenshots = group
        .screenshots
        .iter()
        .map(|(slot, candidates)| (*slot, present(candidates.as_slice())))
        .filter(|(_, columns)| !columns.is_empty())
        .collect();

    ResolvedGroup {
        metrics,
        screenshots,
    }
}
