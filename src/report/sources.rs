//! Loaders for every input of the combined report.
//!
//! Each loader returns values keyed by `respondent_id` within one wave and
//! pool. A missing file is logged and loads as an empty map, so the report
//! keeps the source's columns and fills them with nulls.

use std::{collections::HashMap, path::Path};

use anyhow::Result;

use crate::{
    log_debug, log_warn,
    models::{judgment_score, Device, Pool},
    sampling::TASK_ID_COLUMN,
    table::{parse_flag, parse_seconds, RawTable, Row},
};

const ENABLE_LOGS: bool = true;

/// Per-image checks produced outside the review flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageCheck {
    Tamper,
    WebMatch,
    AiGenerated,
    Duplicate,
}

impl ImageCheck {
    pub const ALL: [ImageCheck; 4] = [
        ImageCheck::Tamper,
        ImageCheck::WebMatch,
        ImageCheck::AiGenerated,
        ImageCheck::Duplicate,
    ];

    pub fn file_stem(&self) -> &'static str {
        match self {
            ImageCheck::Tamper => "trufor",
            ImageCheck::WebMatch => "web_detection",
            ImageCheck::AiGenerated => "ai_generated",
            ImageCheck::Duplicate => "fingerprints",
        }
    }

    /// Report column suffix after the `{wave}_{pool}_` prefix.
    pub fn column_suffix(&self) -> &'static str {
        match self {
            ImageCheck::Tamper => "trufor_flagged",
            ImageCheck::WebMatch => "web_match",
            ImageCheck::AiGenerated => "aigen_flagged",
            ImageCheck::Duplicate => "dup_flagged",
        }
    }

    /// Verdict for one image. Error rows and unrecognised values are unknown.
    pub fn image_flag(&self, row: &Row<'_>, ai_threshold: f64) -> Option<bool> {
        let status = row.get("status").map(str::to_ascii_lowercase);
        if status.as_deref() == Some("error") {
            return None;
        }

        match self {
            ImageCheck::Tamper => match status.as_deref() {
                Some("flagged") => Some(true),
                Some("ok") => Some(false),
                _ => parse_flag(row.get("flagged")),
            },
            ImageCheck::WebMatch => match status.as_deref() {
                Some("match") => Some(true),
                Some("no_match") => Some(false),
                _ => None,
            },
            ImageCheck::AiGenerated => parse_flag(row.get("flagged"))
                .or_else(|| match row.get("predicted_generation") {
                    Some("ai_generated") => Some(true),
                    Some("not_ai_generated") => Some(false),
                    _ => None,
                })
                .or_else(|| {
                    parse_seconds(row.get("ai_generated_score")).map(|score| score >= ai_threshold)
                }),
            ImageCheck::Duplicate => parse_flag(row.get("flagged")),
        }
    }
}

/// Logical OR over unknown-able flags: any true wins, then any false,
/// otherwise unknown.
pub fn any_flag(lhs: Option<bool>, rhs: Option<bool>) -> Option<bool> {
    match (lhs, rhs) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), _) | (_, Some(false)) => Some(false),
        _ => None,
    }
}

/// Maps task ids of a pool's sample back to respondents.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    respondents: HashMap<String, String>,
}

impl TaskIndex {
    pub fn from_sample(sample: &RawTable) -> Self {
        let respondents = sample
            .rows()
            .filter_map(|row| {
                Some((
                    row.get(TASK_ID_COLUMN)?.to_string(),
                    row.get("respondent_id")?.to_string(),
                ))
            })
            .collect();
        Self { respondents }
    }

    /// A row's own `respondent_id` wins; otherwise its task id is looked up.
    pub fn respondent_of(&self, row: &Row<'_>) -> Option<String> {
        if let Some(respondent) = row.get("respondent_id") {
            return Some(respondent.to_string());
        }
        self.respondents
            .get(row.get(TASK_ID_COLUMN)?)
            .cloned()
    }
}

/// Who a sample row is, as far as the report is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub respondent_id: String,
    pub participant_id: Option<String>,
    pub device: Device,
}

pub fn identities(sample: &RawTable) -> Vec<Identity> {
    sample
        .rows()
        .filter_map(|row| {
            Some(Identity {
                respondent_id: row.get("respondent_id")?.to_string(),
                participant_id: row.get("participant_id").map(str::to_string),
                device: row.get("device").map(Device::from_label).unwrap_or_default(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JudgmentScores {
    pub correct: Option<u8>,
    pub matches: Option<u8>,
}

fn read_source(path: &Path, what: &str) -> Result<Option<RawTable>> {
    let table = RawTable::read_optional(path)?;
    if table.is_none() {
        log_warn!("No {what} at {}; its report columns stay empty", path.display());
    }
    Ok(table)
}

/// Human or automated annotations scored to 1/0/null.
pub fn load_judgments(
    path: &Path,
    what: &str,
    tasks: &TaskIndex,
) -> Result<HashMap<String, JudgmentScores>> {
    let Some(table) = read_source(path, what)? else {
        return Ok(HashMap::new());
    };

    let mut scores = HashMap::new();
    for row in table.rows() {
        let Some(respondent) = tasks.respondent_of(&row) else {
            log_debug!("{what}: row {} matches no sampled respondent", row.position() + 1);
            continue;
        };
        scores.insert(
            respondent,
            JudgmentScores {
                correct: judgment_score(row.get("screenshot_correct")),
                matches: judgment_score(row.get("numbers_match")),
            },
        );
    }
    Ok(scores)
}

/// Upload-page seconds of the given pool per respondent.
pub fn load_upload_seconds(path: &Path, pool: Pool) -> Result<HashMap<String, f64>> {
    let Some(table) = read_source(path, "timing table")? else {
        return Ok(HashMap::new());
    };

    let column = match pool {
        Pool::Average => "avg_upload_sec",
        Pool::App => "app_upload_sec",
    };
    Ok(table
        .rows()
        .filter_map(|row| {
            Some((
                row.get("respondent_id")?.to_string(),
                parse_seconds(row.get(column))?,
            ))
        })
        .collect())
}

/// One flag per respondent, OR-ed over all of their images.
pub fn load_image_flags(
    path: &Path,
    check: ImageCheck,
    tasks: &TaskIndex,
    ai_threshold: f64,
) -> Result<HashMap<String, Option<bool>>> {
    let Some(table) = read_source(path, check.file_stem())? else {
        return Ok(HashMap::new());
    };

    let mut flags: HashMap<String, Option<bool>> = HashMap::new();
    for row in table.rows() {
        let Some(respondent) = tasks.respondent_of(&row) else {
            log_debug!(
                "{}: row {} matches no sampled respondent",
                check.file_stem(),
                row.position() + 1
            );
            continue;
        };
        let flag = check.image_flag(&row, ai_threshold);
        let entry = flags.entry(respondent).or_insert(None);
        *entry = any_flag(*entry, flag);
    }
    Ok(flags)
}
