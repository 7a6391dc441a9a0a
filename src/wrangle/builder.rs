use std::collections::HashSet;

use crate::{
    log_debug, log_info, log_warn,
    models::{CanonicalRecord, Device, ScreenTime, ScreenshotRef, TimingRow, Wave},
    table::{parse_count, parse_seconds, RawTable, Row},
    wrangle::{
        branch::resolve_branch,
        config::{first_value, IdentitySource, ResolvedGroup, ResolvedLayout},
        dates::{branch_weekday, derive_target_date, parse_timestamp},
        device::classify_device,
    },
};

const ENABLE_LOGS: bool = true;

/// Counters reported after a wave is wrangled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub respondents: usize,
    pub ios: usize,
    pub android: usize,
    pub unknown_device: usize,
    pub unresolved_branches: usize,
    pub missing_participant_ids: usize,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub records: Vec<CanonicalRecord>,
    pub timing: Vec<TimingRow>,
    pub stats: BuildStats,
}

pub fn synthetic_participant_id(wave: Wave, ordinal: usize) -> String {
    format!("SYN-{}-{ordinal:05}", wave.as_str())
}

/// Survey exports carry the question text and an import-id JSON row under the
/// header; neither is a respondent.
fn is_export_metadata(response_id: &str) -> bool {
    response_id.eq_ignore_ascii_case("response id") || response_id.starts_with("{\"ImportId\"")
}

/// Respondent rows of an export in file order, plus the count of rows
/// skipped for lacking a response id. Export metadata rows are dropped;
/// duplicate ids are kept and warned about.
pub fn respondent_rows<'a>(
    table: &'a RawTable,
    layout: &ResolvedLayout,
) -> (Vec<(Row<'a>, &'a str)>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0;
    let mut seen = HashSet::new();

    for row in table.rows() {
        let Some(response_id) = row.get(&layout.response_id) else {
            log_warn!(
                "{} wave: row {} has no response id; skipped",
                layout.wave,
                row.position() + 1
            );
            skipped += 1;
            continue;
        };
        if is_export_metadata(response_id) {
            log_debug!("{} wave: skipping export metadata row", layout.wave);
            continue;
        }
        if !seen.insert(response_id) {
            log_warn!("{} wave: duplicate response id {response_id}", layout.wave);
        }
        rows.push((row, response_id));
    }
    (rows, skipped)
}

/// Stable identity of the respondent at `ordinal`, per the layout's source.
pub fn participant_id(row: &Row<'_>, layout: &ResolvedLayout, ordinal: usize) -> Option<String> {
    match &layout.identity {
        IdentitySource::Column(column) => row.get(column).map(str::to_string),
        IdentitySource::Synthetic => Some(synthetic_participant_id(layout.wave, ordinal)),
    }
}

/// Builds one record per respondent row. Rows are never dropped for data
/// quality; only export metadata and rows without a response id are skipped.
pub fn build_records(table: &RawTable, layout: &ResolvedLayout) -> BuildOutput {
    let (rows, skipped_rows) = respondent_rows(table, layout);
    let mut output = BuildOutput {
        stats: BuildStats {
            skipped_rows,
            ..BuildStats::default()
        },
        ..BuildOutput::default()
    };

    for (offset, (row, response_id)) in rows.iter().enumerate() {
        let record = build_record(row, response_id, layout, offset + 1, &mut output.stats);
        output.timing.push(TimingRow {
            respondent_id: record.respondent_id.clone(),
            avg_upload_sec: parse_seconds(layout.avg_upload.as_deref().and_then(|c| row.get(c))),
            app_upload_sec: parse_seconds(layout.app_upload.as_deref().and_then(|c| row.get(c))),
        });
        output.records.push(record);
    }

    output.stats.respondents = output.records.len();
    log_info!(
        "{} wave: built {} records ({} iOS, {} Android, {} unknown device, {} unresolved branches)",
        layout.wave,
        output.stats.respondents,
        output.stats.ios,
        output.stats.android,
        output.stats.unknown_device,
        output.stats.unresolved_branches
    );
    if output.stats.missing_participant_ids > 0 {
        log_warn!(
            "{} wave: {} respondents have no participant id and will not link across waves",
            layout.wave,
            output.stats.missing_participant_ids
        );
    }
    output
}

fn build_record(
    row: &Row<'_>,
    response_id: &str,
    layout: &ResolvedLayout,
    ordinal: usize,
    stats: &mut BuildStats,
) -> CanonicalRecord {
    let device = classify_device(row.get(&layout.device));
    let mut record = CanonicalRecord::new(response_id.to_string(), device);

    record.participant_id = participant_id(row, layout, ordinal);
    if record.participant_id.is_none() {
        stats.missing_participant_ids += 1;
    }
    record.completion_timestamp = parse_timestamp(row.get(&layout.completion));

    let group = match device {
        Device::Ios => {
            stats.ios += 1;
            Some(&layout.ios)
        }
        Device::Android => {
            stats.android += 1;
            record.active_branch = resolve_branch(row, &layout.branches);
            record.branch_label = record.active_branch.and_then(branch_weekday);
            record.target_date =
                derive_target_date(record.completion_timestamp, record.branch_label);
            match record.active_branch {
                Some(branch) => layout
                    .branches
                    .iter()
                    .find(|(index, _)| *index == branch)
                    .map(|(_, group)| group),
                None => {
                    stats.unresolved_branches += 1;
                    log_debug!("{} wave: no branch resolved for {response_id}", layout.wave);
                    None
                }
            }
        }
        Device::Unknown => {
            stats.unknown_device += 1;
            log_debug!("{} wave: unknown device for {response_id}", layout.wave);
            None
        }
    };

    if let Some(group) = group {
        fill_fields(&mut record, row, group);
    }
    record
}

fn fill_fields(record: &mut CanonicalRecord, row: &Row<'_>, group: &ResolvedGroup) {
    for (metric, columns) in &group.metrics {
        let usage = ScreenTime {
            hours: parse_count(first_value(row, &columns.hours)),
            minutes: parse_count(first_value(row, &columns.minutes)),
        };
        if !usage.is_empty() {
            record.usage.insert(*metric, usage);
        }
    }
    for (slot, candidates) in &group.screenshots {
        if let Some(file_id) = first_value(row, candidates) {
            record.screenshots.insert(
                *slot,
                ScreenshotRef {
                    file_id: Some(file_id.to_string()),
                    path: None,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Weekday};

    use super::*;
    use crate::{
        models::{Metric, Slot},
        wrangle::config::tests::config,
    };

    const HEADER: [&str; 13] = [
        "ResponseId",
        "EndDate",
        "device",
        "pid",
        "avg_timer_Page Submit",
        "ios_total_h",
        "ios_total_m",
        "ios_total_ss_Id",
        "and3_total_h",
        "and3_total_m",
        "and3_ss_Id",
        "and5_total_h",
        "and_6_ss_Id",
    ];

    fn table(rows: &[[&str; 13]]) -> RawTable {
        RawTable::new(
            "responses.csv",
            HEADER.map(String::from).to_vec(),
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    fn build(rows: &[[&str; 13]], synthetic: bool) -> BuildOutput {
        let table = table(rows);
        let layout = config().resolve(&table, None, synthetic).unwrap();
        build_records(&table, &layout)
    }

    #[test]
    fn android_respondent_reads_the_populated_branch() {
        let output = build(
            &[[
                "R_1", "2024-12-18 10:00:00", "Android", "P1", "41.5", "", "", "", "2", "15",
                "F_3", "", "",
            ]],
            false,
        );

        let record = &output.records[0];
        assert_eq!(record.device, Device::Android);
        assert_eq!(record.active_branch, Some(3));
        assert_eq!(record.branch_label, Some(Weekday::Wed));
        assert_eq!(record.target_date, NaiveDate::from_ymd_opt(2024, 12, 11));
        assert_eq!(record.usage(Metric::Total).hours, Some(2));
        assert_eq!(record.usage(Metric::Total).minutes, Some(15));
        assert_eq!(record.screenshot(Slot::Total).file_id.as_deref(), Some("F_3"));
        assert_eq!(output.timing[0].avg_upload_sec, Some(41.5));
    }

    #[test]
    fn irregular_alternate_column_name_is_read() {
        let output = build(
            &[[
                "R_1", "2024-12-20 10:00:00", "2", "P1", "", "", "", "", "", "", "", "", "F_6",
            ]],
            false,
        );
        let record = &output.records[0];
        assert_eq!(record.active_branch, Some(6));
        assert_eq!(record.screenshot(Slot::Total).file_id.as_deref(), Some("F_6"));
    }

    #[test]
    fn alternate_column_is_read_when_regular_column_is_blank() {
        let table = RawTable::new(
            "responses.csv",
            ["ResponseId", "EndDate", "device", "pid", "and5_ss_Id", "and_5_ss_Id"]
                .map(String::from)
                .to_vec(),
            vec![["R_5", "2024-12-20 10:00:00", "Android", "P5", "", "F_5"]
                .map(String::from)
                .to_vec()],
        );
        let layout = config().resolve(&table, None, false).unwrap();
        let output = build_records(&table, &layout);

        let record = &output.records[0];
        assert_eq!(record.active_branch, Some(5));
        assert_eq!(record.screenshot(Slot::Total).file_id.as_deref(), Some("F_5"));
        assert_eq!(output.stats.unresolved_branches, 0);
    }

    #[test]
    fn respondent_without_branch_data_is_kept_with_nulls() {
        let output = build(
            &[[
                "R_2", "2024-12-18 10:00:00", "android", "P2", "", "", "", "", "", "", "", "",
                "",
            ]],
            false,
        );

        assert_eq!(output.records.len(), 1);
        let record = &output.records[0];
        assert_eq!(record.active_branch, None);
        assert_eq!(record.branch_label, None);
        assert_eq!(record.target_date, None);
        assert!(record.usage(Metric::Total).is_empty());
        assert_eq!(output.stats.unresolved_branches, 1);
    }

    #[test]
    fn ios_respondent_reads_fixed_columns_and_ignores_branches() {
        let output = build(
            &[[
                "R_3", "2024-12-18 10:00:00", "iPhone", "P3", "", "4", "abc", "F_ios", "9", "9",
                "F_and", "", "",
            ]],
            false,
        );

        let record = &output.records[0];
        assert_eq!(record.device, Device::Ios);
        assert_eq!(record.active_branch, None);
        assert_eq!(record.usage(Metric::Total).hours, Some(4));
        // unparseable stays null, never zero
        assert_eq!(record.usage(Metric::Total).minutes, None);
        assert_eq!(record.screenshot(Slot::Total).file_id.as_deref(), Some("F_ios"));
    }

    #[test]
    fn unknown_device_is_emitted_without_screen_time() {
        let output = build(
            &[[
                "R_4", "2024-12-18 10:00:00", "Windows", "P4", "", "4", "10", "F_ios", "", "",
                "", "", "",
            ]],
            false,
        );
        let record = &output.records[0];
        assert_eq!(record.device, Device::Unknown);
        assert!(record.usage.is_empty());
        assert!(record.screenshots.is_empty());
        assert_eq!(output.stats.unknown_device, 1);
    }

    #[test]
    fn export_metadata_rows_are_skipped_and_blank_identity_stays_null() {
        let output = build(
            &[
                [
                    "Response ID", "End Date", "Device", "PID", "", "", "", "", "", "", "", "",
                    "",
                ],
                [
                    "{\"ImportId\":\"_recordId\"}", "", "", "", "", "", "", "", "", "", "", "",
                    "",
                ],
                [
                    "R_5", "2024-12-18 10:00:00", "1", "", "", "1", "0", "", "", "", "", "", "",
                ],
            ],
            false,
        );

        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].respondent_id, "R_5");
        assert_eq!(output.records[0].participant_id, None);
        assert_eq!(output.stats.missing_participant_ids, 1);
    }

    #[test]
    fn synthetic_ids_follow_row_order() {
        let table = RawTable::new(
            "responses.csv",
            vec!["ResponseId".into(), "EndDate".into(), "device".into()],
            vec![
                vec!["R_a".into(), "".into(), "1".into()],
                vec!["R_b".into(), "".into(), "2".into()],
            ],
        );
        let layout = config().resolve(&table, None, true).unwrap();
        let output = build_records(&table, &layout);

        let ids: Vec<_> = output
            .records
            .iter()
            .map(|record| record.participant_id.clone())
            .collect();
        assert_eq!(
            ids,
            vec![
                Some("SYN-baseline-00001".to_string()),
                Some("SYN-baseline-00002".to_string())
            ]
        );
    }
}
