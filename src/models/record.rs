use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use super::survey::{Device, Metric, Slot};
use crate::{table::TableRow, wrangle::dates::weekday_name};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenTime {
    pub hours: Option<u32>,
    pub minutes: Option<u32>,
}

impl ScreenTime {
    pub fn is_empty(&self) -> bool {
        self.hours.is_none() && self.minutes.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenshotRef {
    pub file_id: Option<String>,
    /// Local path of a successful download, filled in by the manifest join.
    pub path: Option<String>,
}

/// One respondent of one wave after wrangling.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub respondent_id: String,
    pub participant_id: Option<String>,
    pub device: Device,
    pub completion_timestamp: Option<NaiveDateTime>,
    /// Day-of-week question block (1 = Monday), Android only.
    pub active_branch: Option<u8>,
    pub branch_label: Option<Weekday>,
    pub target_date: Option<NaiveDate>,
    pub usage: BTreeMap<Metric, ScreenTime>,
    pub screenshots: BTreeMap<Slot, ScreenshotRef>,
}

impl CanonicalRecord {
    pub fn new(respondent_id: String, device: Device) -> Self {
        Self {
            respondent_id,
            participant_id: None,
            device,
            completion_timestamp: None,
            active_branch: None,
            branch_label: None,
            target_date: None,
            usage: BTreeMap::new(),
            screenshots: BTreeMap::new(),
        }
    }

    pub fn usage(&self, metric: Metric) -> ScreenTime {
        self.usage.get(&metric).copied().unwrap_or_default()
    }

    pub fn screenshot(&self, slot: Slot) -> ScreenshotRef {
        self.screenshots.get(&slot).cloned().unwrap_or_default()
    }
}

/// Row of `average_screentime_for_annotation.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AverageRow {
    pub respondent_id: String,
    pub participant_id: Option<String>,
    pub device: Device,
    pub completion_timestamp: Option<NaiveDateTime>,
    pub active_branch: Option<u8>,
    pub branch_label: Option<String>,
    pub target_date: Option<NaiveDate>,
    pub total_hours: Option<u32>,
    pub total_minutes: Option<u32>,
    pub total_screenshot_file_id: Option<String>,
    pub total_screenshot_path: Option<String>,
}

impl TableRow for AverageRow {
    const HEADERS: &'static [&'static str] = &[
        "respondent_id",
        "participant_id",
        "device",
        "completion_timestamp",
        "active_branch",
        "branch_label",
        "target_date",
        "total_hours",
        "total_minutes",
        "total_screenshot_file_id",
        "total_screenshot_path",
    ];
}

impl From<&CanonicalRecord> for AverageRow {
    fn from(record: &CanonicalRecord) -> Self {
        let total = record.usage(Metric::Total);
        let shot = record.screenshot(Slot::Total);
        Self {
            respondent_id: record.respondent_id.clone(),
            participant_id: record.participant_id.clone(),
            device: record.device,
            completion_timestamp: record.completion_timestamp,
            active_branch: record.active_branch,
            branch_label: record.branch_label.map(|day| weekday_name(day).to_string()),
            target_date: record.target_date,
            total_hours: total.hours,
            total_minutes: total.minutes,
            total_screenshot_file_id: shot.file_id,
            total_screenshot_path: shot.path,
        }
    }
}

/// Row of `app_screentime_for_annotation.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppRow {
    pub respondent_id: String,
    pub participant_id: Option<String>,
    pub device: Device,
    pub completion_timestamp: Option<NaiveDateTime>,
    pub active_branch: Option<u8>,
    pub branch_label: Option<String>,
    pub target_date: Option<NaiveDate>,
    pub instagram_hours: Option<u32>,
    pub instagram_minutes: Option<u32>,
    pub facebook_hours: Option<u32>,
    pub facebook_minutes: Option<u32>,
    pub tiktok_hours: Option<u32>,
    pub tiktok_minutes: Option<u32>,
    pub twitter_hours: Option<u32>,
    pub twitter_minutes: Option<u32>,
    pub app_screenshot1_file_id: Option<String>,
    pub app_screenshot2_file_id: Option<String>,
    pub app_screenshot3_file_id: Option<String>,
    pub app_screenshot1_path: Option<String>,
    pub app_screenshot2_path: Option<String>,
    pub app_screenshot3_path: Option<String>,
}

impl TableRow for AppRow {
    const HEADERS: &'static [&'static str] = &[
        "respondent_id",
        "participant_id",
        "device",
        "completion_timestamp",
        "active_branch",
        "branch_label",
        "target_date",
        "instagram_hours",
        "instagram_minutes",
        "facebook_hours",
        "facebook_minutes",
        "tiktok_hours",
        "tiktok_minutes",
        "twitter_hours",
        "twitter_minutes",
        "app_screenshot1_file_id",
        "app_screenshot2_file_id",
        "app_screenshot3_file_id",
        "app_screenshot1_path",
        "app_screenshot2_path",
        "app_screenshot3_path",
    ];
}

impl From<&CanonicalRecord> for AppRow {
    fn from(record: &CanonicalRecord) -> Self {
        let instagram = record.usage(Metric::Instagram);
        let facebook = record.usage(Metric::Facebook);
        let tiktok = record.usage(Metric::Tiktok);
        let twitter = record.usage(Metric::Twitter);
        let [shot1, shot2, shot3] = Slot::APPS.map(|slot| record.screenshot(slot));

        Self {
            respondent_id: record.respondent_id.clone(),
            participant_id: record.participant_id.clone(),
            device: record.device,
            completion_timestamp: record.completion_timestamp,
            active_branch: record.active_branch,
            branch_label: record.branch_label.map(|day| weekday_name(day).to_string()),
            target_date: record.target_date,
            instagram_hours: instagram.hours,
            instagram_minutes: instagram.minutes,
            facebook_hours: facebook.hours,
            facebook_minutes: facebook.minutes,
            tiktok_hours: tiktok.hours,
            tiktok_minutes: tiktok.minutes,
            twitter_hours: twitter.hours,
            twitter_minutes: twitter.minutes,
            app_screenshot1_file_id: shot1.file_id,
            app_screenshot2_file_id: shot2.file_id,
            app_screenshot3_file_id: shot3.file_id,
            app_screenshot1_path: shot1.path,
            app_screenshot2_path: shot2.path,
            app_screenshot3_path: shot3.path,
        }
    }
}

/// Row of `timing.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingRow {
    pub respondent_id: String,
    pub avg_upload_sec: Option<f64>,
    pub app_upload_sec: Option<f64>,
}

impl TableRow for TimingRow {
    const HEADERS: &'static [&'static str] =
        &["respondent_id", "avg_upload_sec", "app_upload_sec"];
}
