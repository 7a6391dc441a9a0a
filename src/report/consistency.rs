//! Cross-wave device, OS and browser consistency per participant.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    log_info, log_warn,
    models::{Device, Wave},
    settings::PipelineSettings,
    table::{write_records, RawTable, TableRow},
    wrangle::{
        builder::{participant_id, respondent_rows},
        config::{ResolvedLayout, WaveConfig},
        device::classify_device,
    },
};

const ENABLE_LOGS: bool = true;

/// What one wave recorded about a participant's setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveProfile {
    pub device: Device,
    pub os: Option<String>,
    pub browser: Option<String>,
}

/// Row of `device_consistency.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyRow {
    pub participant_id: String,
    pub bl_device: Option<Device>,
    pub el_device: Option<Device>,
    pub bl_os: Option<String>,
    pub el_os: Option<String>,
    pub bl_browser: Option<String>,
    pub el_browser: Option<String>,
    pub device_match: Option<bool>,
    pub os_match: Option<bool>,
    pub browser_match: Option<bool>,
}

impl TableRow for ConsistencyRow {
    const HEADERS: &'static [&'static str] = &[
        "participant_id",
        "bl_device",
        "el_device",
        "bl_os",
        "el_os",
        "bl_browser",
        "el_browser",
        "device_match",
        "os_match",
        "browser_match",
    ];
}

/// Profiles keyed by participant id. Respondents without one cannot be
/// compared across waves and are left out; a repeated participant keeps the
/// first row.
pub fn wave_profiles(table: &RawTable, layout: &ResolvedLayout) -> BTreeMap<String, WaveProfile> {
    let (rows, _) = respondent_rows(table, layout);
    let mut profiles = BTreeMap::new();

    for (offset, (row, response_id)) in rows.iter().enumerate() {
        let Some(participant) = participant_id(row, layout, offset + 1) else {
            continue;
        };
        if profiles.contains_key(&participant) {
            log_warn!(
                "{} wave: participant {participant} answered more than once; keeping the first response (ignoring {response_id})",
                layout.wave
            );
            continue;
        }
        let cell = |column: &Option<String>| {
            column
                .as_deref()
                .and_then(|column| row.get(column))
                .map(str::to_string)
        };
        profiles.insert(
            participant,
            WaveProfile {
                device: classify_device(row.get(&layout.device)),
                os: cell(&layout.os),
                browser: cell(&layout.browser),
            },
        );
    }
    profiles
}

fn text_match(lhs: Option<&str>, rhs: Option<&str>) -> Option<bool> {
    Some(lhs?.trim().eq_ignore_ascii_case(rhs?.trim()))
}

/// One row per participant present in either wave.
pub fn compare_waves(
    baseline: &BTreeMap<String, WaveProfile>,
    endline: &BTreeMap<String, WaveProfile>,
) -> Vec<ConsistencyRow> {
    let mut participants: Vec<&String> = baseline.keys().chain(endline.keys()).collect();
    participants.sort();
    participants.dedup();

    participants
        .into_iter()
        .map(|participant| {
            let bl = baseline.get(participant);
            let el = endline.get(participant);
            let device_match = match (bl.map(|p| p.device), el.map(|p| p.device)) {
                (Some(lhs), Some(rhs)) if lhs.is_known() && rhs.is_known() => Some(lhs == rhs),
                _ => None,
            };
            ConsistencyRow {
                participant_id: participant.clone(),
                bl_device: bl.map(|p| p.device),
                el_device: el.map(|p| p.device),
                bl_os: bl.and_then(|p| p.os.clone()),
                el_os: el.and_then(|p| p.os.clone()),
                bl_browser: bl.and_then(|p| p.browser.clone()),
                el_browser: el.and_then(|p| p.browser.clone()),
                device_match,
                os_match: text_match(
                    bl.and_then(|p| p.os.as_deref()),
                    el.and_then(|p| p.os.as_deref()),
                ),
                browser_match: text_match(
                    bl.and_then(|p| p.browser.as_deref()),
                    el.and_then(|p| p.browser.as_deref()),
                ),
            }
        })
        .collect()
}

fn load_profiles(settings: &PipelineSettings, wave: Wave) -> Result<BTreeMap<String, WaveProfile>> {
    let config = WaveConfig::load(settings.wave_config_path(wave))?;
    if config.wave != wave {
        return Err(PipelineError::InvalidConfig(format!(
            "{} is a {} config but was given for the {wave} wave",
            settings.wave_config_path(wave).display(),
            config.wave
        ))
        .into());
    }
    let responses = RawTable::read(&settings.wave_paths(wave).responses())?;
    let layout = config.resolve(
        &responses,
        settings.participant_id_field.as_deref(),
        settings.synthetic_participant_ids,
    )?;
    Ok(wave_profiles(&responses, &layout))
}

/// Builds and writes `device_consistency.csv` from both waves' raw exports.
pub fn build_consistency(settings: &PipelineSettings) -> Result<Vec<ConsistencyRow>> {
    let baseline = load_profiles(settings, Wave::Baseline)?;
    let endline = load_profiles(settings, Wave::Endline)?;
    let rows = compare_waves(&baseline, &endline);

    let path = settings.device_consistency_path();
    write_records(&path, &rows)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let changed = rows
        .iter()
        .filter(|row| row.device_match == Some(false))
        .count();
    log_info!(
        "Device consistency: {} participants, {changed} changed device, written to {}",
        rows.len(),
        path.display()
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrangle::config::tests::config;

    fn profile(device: Device, os: Option<&str>) -> WaveProfile {
        WaveProfile {
            device,
            os: os.map(str::to_string),
            browser: None,
        }
    }

    #[test]
    fn participants_from_either_wave_are_compared() {
        let baseline = BTreeMap::from([
            ("P1".to_string(), profile(Device::Ios, Some("iOS 17"))),
            ("P2".to_string(), profile(Device::Android, None)),
        ]);
        let endline = BTreeMap::from([
            ("P1".to_string(), profile(Device::Android, Some("ios 17"))),
            ("P3".to_string(), profile(Device::Ios, None)),
        ]);

        let rows = compare_waves(&baseline, &endline);
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].participant_id, "P1");
        assert_eq!(rows[0].device_match, Some(false));
        assert_eq!(rows[0].os_match, Some(true));
        assert_eq!(rows[0].browser_match, None);

        assert_eq!(rows[1].participant_id, "P2");
        assert_eq!(rows[1].el_device, None);
        assert_eq!(rows[1].device_match, None);
    }

    #[test]
    fn unknown_device_is_not_compared() {
        let baseline = BTreeMap::from([("P1".to_string(), profile(Device::Unknown, None))]);
        let endline = BTreeMap::from([("P1".to_string(), profile(Device::Ios, None))]);
        assert_eq!(compare_waves(&baseline, &endline)[0].device_match, None);
    }

    #[test]
    fn profiles_skip_blank_identities_and_keep_first_response() {
        let table = RawTable::new(
            "responses.csv",
            ["ResponseId", "EndDate", "device", "pid"]
                .map(String::from)
                .to_vec(),
            vec![
                vec!["R1".into(), "".into(), "iPhone".into(), "P1".into()],
                vec!["R2".into(), "".into(), "Android".into(), "P1".into()],
                vec!["R3".into(), "".into(), "2".into(), "".into()],
            ],
        );
        let layout = config().resolve(&table, None, false).unwrap();
        let profiles = wave_profiles(&table, &layout);

        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles["P1"].device, Device::Ios);
    }
}
