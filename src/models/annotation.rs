//! Review outcome models.
//!
//! `Judgment` is the closed form of the Yes/No/Unsure strings found in
//! annotation files; the strings only exist at the CSV edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::table::TableRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Judgment {
    Yes,
    No,
    Unsure,
}

impl Judgment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Judgment::Yes => "Yes",
            Judgment::No => "No",
            Judgment::Unsure => "Unsure",
        }
    }

    /// Case-insensitive parse; `None` for anything outside the three values.
    pub fn parse(raw: &str) -> Option<Judgment> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" => Some(Judgment::Yes),
            "no" => Some(Judgment::No),
            "unsure" => Some(Judgment::Unsure),
            _ => None,
        }
    }

    /// Numeric form used in aggregation: Yes = 1, No = 0, Unsure = null.
    pub fn score(&self) -> Option<u8> {
        match self {
            Judgment::Yes => Some(1),
            Judgment::No => Some(0),
            Judgment::Unsure => None,
        }
    }
}

/// Scores a raw annotation cell. Malformed values are unknown, same as Unsure.
pub fn judgment_score(raw: Option<&str>) -> Option<u8> {
    raw.and_then(Judgment::parse).and_then(|judgment| judgment.score())
}

impl fmt::Display for Judgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Judgment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Judgment::parse(value).ok_or_else(|| format!("'{value}' is not one of Yes, No, Unsure"))
    }
}

/// One review of one task, as stored in `annotations_{avg,app}.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotationRecord {
    pub task_id: String,
    pub respondent_id: String,
    pub reviewer: String,
    pub screenshot_correct: Judgment,
    pub numbers_match: Judgment,
    pub notes: String,
    pub annotated_at: DateTime<Utc>,
}

impl TableRow for AnnotationRecord {
    const HEADERS: &'static [&'static str] = &[
        "task_id",
        "respondent_id",
        "reviewer",
        "screenshot_correct",
        "numbers_match",
        "notes",
        "annotated_at",
    ];
}
