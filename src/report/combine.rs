use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use anyhow::{Context, Result};

use crate::{
    log_info, log_warn,
    models::{Pool, Wave},
    settings::PipelineSettings,
    table::{parse_flag, RawTable},
};

use super::sources::{
    identities, load_image_flags, load_judgments, load_upload_seconds, Identity, ImageCheck,
    JudgmentScores, TaskIndex,
};

const ENABLE_LOGS: bool = true;

/// Per-wave, per-pool measures in report column order.
const POOL_MEASURES: [&str; 5] = ["h_correct", "h_match", "ai_correct", "ai_match", "upload_sec"];

/// Every report column, always in this order.
pub fn report_headers() -> Vec<String> {
    let mut headers: Vec<String> = [
        "participant_id",
        "device",
        "bl_respondent_id",
        "el_respondent_id",
        "bl_device",
        "el_device",
    ]
    .map(String::from)
    .to_vec();

    for wave in Wave::ALL {
        for pool in Pool::ALL {
            let prefix = format!("{}_{}", wave.prefix(), pool.prefix());
            headers.extend(POOL_MEASURES.iter().map(|measure| format!("{prefix}_{measure}")));
            headers.extend(
                ImageCheck::ALL
                    .iter()
                    .map(|check| format!("{prefix}_{}", check.column_suffix())),
            );
        }
    }
    headers.push("device_changed".into());
    headers
}

/// Everything known about one pool of one wave, keyed by respondent.
#[derive(Debug, Clone, Default)]
pub struct PoolSources {
    pub human: HashMap<String, JudgmentScores>,
    pub automated: HashMap<String, JudgmentScores>,
    pub upload_sec: HashMap<String, f64>,
    pub images: HashMap<ImageCheck, HashMap<String, Option<bool>>>,
}

impl PoolSources {
    pub fn load(
        settings: &PipelineSettings,
        wave: Wave,
        pool: Pool,
        tasks: &TaskIndex,
    ) -> Result<Self> {
        let paths = settings.wave_paths(wave);
        let mut images = HashMap::new();
        for check in ImageCheck::ALL {
            images.insert(
                check,
                load_image_flags(
                    &paths.image_report(check, pool),
                    check,
                    tasks,
                    settings.ai_generated_threshold,
                )?,
            );
        }

        Ok(Self {
            human: load_judgments(&paths.annotations(pool), "human annotations", tasks)?,
            automated: load_judgments(
                &paths.auto_annotations(pool),
                "automated annotations",
                tasks,
            )?,
            upload_sec: load_upload_seconds(&paths.timing(), pool)?,
            images,
        })
    }

    fn cells(&self, respondent: Option<&str>) -> Vec<String> {
        let human = respondent.and_then(|r| self.human.get(r)).copied().unwrap_or_default();
        let automated = respondent
            .and_then(|r| self.automated.get(r))
            .copied()
            .unwrap_or_default();

        let mut cells = vec![
            score_cell(human.correct),
            score_cell(human.matches),
            score_cell(automated.correct),
            score_cell(automated.matches),
            respondent
                .and_then(|r| self.upload_sec.get(r))
                .map(|seconds| seconds.to_string())
                .unwrap_or_default(),
        ];
        cells.extend(ImageCheck::ALL.iter().map(|check| {
            let flag = respondent.and_then(|r| self.images.get(check)?.get(r).copied().flatten());
            flag_cell(flag)
        }));
        cells
    }
}

/// Sampled identities and pool sources of one wave.
#[derive(Debug, Clone, Default)]
pub struct WaveSources {
    pub identities: Vec<Identity>,
    pub pools: BTreeMap<Pool, PoolSources>,
}

impl WaveSources {
    /// Sample files define who was reviewed; a wave without any sample
    /// contributes no rows.
    pub fn load(settings: &PipelineSettings, wave: Wave) -> Result<Self> {
        let paths = settings.wave_paths(wave);
        let mut sources = WaveSources::default();

        for pool in Pool::ALL {
            let tasks = match RawTable::read_optional(&paths.sample(pool))? {
                Some(sample) => {
                    for identity in identities(&sample) {
                        if !sources
                            .identities
                            .iter()
                            .any(|known| known.respondent_id == identity.respondent_id)
                        {
                            sources.identities.push(identity);
                        }
                    }
                    TaskIndex::from_sample(&sample)
                }
                None => {
                    log_warn!("{wave} {pool}: no sample file; nobody from this pool is reported");
                    TaskIndex::default()
                }
            };
            sources
                .pools
                .insert(pool, PoolSources::load(settings, wave, pool, &tasks)?);
        }
        Ok(sources)
    }
}

/// Report row key. Participants link across waves; respondents without a
/// participant id stay on their own row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportKey {
    Linked(String),
    Unlinked(Wave, String),
}

/// `device_match` per participant from `device_consistency.csv`.
pub fn load_device_matches(path: &Path) -> Result<HashMap<String, Option<bool>>> {
    let Some(table) = RawTable::read_optional(path)? else {
        log_warn!(
            "No device consistency table at {}; device_changed falls back to sampled devices",
            path.display()
        );
        return Ok(HashMap::new());
    };
    Ok(table
        .rows()
        .filter_map(|row| {
            Some((
                row.get("participant_id")?.to_string(),
                parse_flag(row.get("device_match")),
            ))
        })
        .collect())
}

fn score_cell(score: Option<u8>) -> String {
    score.map(|value| value.to_string()).unwrap_or_default()
}

fn flag_cell(flag: Option<bool>) -> String {
    flag.map(|value| u8::from(value).to_string()).unwrap_or_default()
}

/// Outer-joins both waves on participant id.
pub fn combine(
    baseline: &WaveSources,
    endline: &WaveSources,
    device_matches: &HashMap<String, Option<bool>>,
) -> RawTable {
    let waves = [(Wave::Baseline, baseline), (Wave::Endline, endline)];

    let mut entries: BTreeMap<ReportKey, [Option<&Identity>; 2]> = BTreeMap::new();
    for (side, (wave, sources)) in waves.iter().enumerate() {
        for identity in &sources.identities {
            let key = match &identity.participant_id {
                Some(participant) => ReportKey::Linked(participant.clone()),
                None => ReportKey::Unlinked(*wave, identity.respondent_id.clone()),
            };
            let sides = entries.entry(key).or_default();
            if let Some(kept) = sides[side] {
                log_warn!(
                    "{wave}: respondents {} and {} share a participant id; reporting {}",
                    kept.respondent_id,
                    identity.respondent_id,
                    kept.respondent_id
                );
                continue;
            }
            sides[side] = Some(identity);
        }
    }

    let mut rows = Vec::with_capacity(entries.len());
    let mut linked_both = 0;
    for (key, sides) in &entries {
        let [bl, el] = *sides;
        if bl.is_some() && el.is_some() {
            linked_both += 1;
        }

        let mut cells = vec![
            match key {
                ReportKey::Linked(participant) => participant.clone(),
                ReportKey::Unlinked(..) => String::new(),
            },
            bl.or(el).map(|id| id.device.to_string()).unwrap_or_default(),
            bl.map(|id| id.respondent_id.clone()).unwrap_or_default(),
            el.map(|id| id.respondent_id.clone()).unwrap_or_default(),
            bl.map(|id| id.device.to_string()).unwrap_or_default(),
            el.map(|id| id.device.to_string()).unwrap_or_default(),
        ];

        for (side, (_, sources)) in waves.iter().enumerate() {
            let respondent = sides[side].map(|id| id.respondent_id.as_str());
            for pool in Pool::ALL {
                match sources.pools.get(&pool) {
                    Some(pool_sources) => cells.extend(pool_sources.cells(respondent)),
                    None => cells.extend(
                        std::iter::repeat(String::new())
                            .take(POOL_MEASURES.len() + ImageCheck::ALL.len()),
                    ),
                }
            }
        }

        let recorded = match key {
            ReportKey::Linked(participant) => device_matches.get(participant).copied().flatten(),
            ReportKey::Unlinked(..) => None,
        };
        let changed = recorded.map(|matched| !matched).or_else(|| match (bl, el) {
            (Some(bl), Some(el)) if bl.device.is_known() && el.device.is_known() => {
                Some(bl.device != el.device)
            }
            _ => None,
        });
        cells.push(flag_cell(changed));

        rows.push(cells);
    }

    log_info!(
        "Combined report: {} rows, {linked_both} participants present in both waves",
        rows.len()
    );
    RawTable::new("combined_compliance_report.csv", report_headers(), rows)
}

/// Loads every source and writes `combined_compliance_report.csv`.
pub fn build_report(settings: &PipelineSettings) -> Result<RawTable> {
    let baseline = WaveSources::load(settings, Wave::Baseline)?;
    let endline = WaveSources::load(settings, Wave::Endline)?;
    let device_matches = load_device_matches(&settings.device_consistency_path())?;

    let report = combine(&baseline, &endline, &device_matches);
    let path = settings.report_path();
    report
        .write(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log_info!("Wrote {}", path.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Device;

    fn identity(respondent: &str, participant: Option<&str>, device: Device) -> Identity {
        Identity {
            respondent_id: respondent.into(),
            participant_id: participant.map(str::to_string),
            device,
        }
    }

    fn wave(identities: Vec<Identity>, human: &[(&str, JudgmentScores)]) -> WaveSources {
        let avg = PoolSources {
            human: human
                .iter()
                .map(|(respondent, scores)| (respondent.to_string(), *scores))
                .collect(),
            ..PoolSources::default()
        };
        WaveSources {
            identities,
            pools: BTreeMap::from([(Pool::Average, avg), (Pool::App, PoolSources::default())]),
        }
    }

    fn cell<'a>(report: &'a RawTable, row: usize, column: &str) -> Option<&'a str> {
        assert!(report.has_column(column), "missing column {column}");
        report.value(row, column)
    }

    #[test]
    fn waves_join_on_participant_not_respondent() {
        let yes_no = JudgmentScores {
            correct: Some(1),
            matches: Some(0),
        };
        let baseline = wave(vec![identity("R_bl", Some("P1"), Device::Ios)], &[("R_bl", yes_no)]);
        let endline = wave(vec![identity("R_el", Some("P1"), Device::Ios)], &[]);

        let report = combine(&baseline, &endline, &HashMap::new());
        assert_eq!(report.len(), 1);
        assert_eq!(cell(&report, 0, "participant_id"), Some("P1"));
        assert_eq!(cell(&report, 0, "bl_respondent_id"), Some("R_bl"));
        assert_eq!(cell(&report, 0, "el_respondent_id"), Some("R_el"));
        assert_eq!(cell(&report, 0, "bl_avg_h_correct"), Some("1"));
        assert_eq!(cell(&report, 0, "bl_avg_h_match"), Some("0"));
        assert_eq!(cell(&report, 0, "device_changed"), Some("0"));
    }

    #[test]
    fn absent_sources_keep_their_columns_as_nulls() {
        let baseline = wave(
            vec![identity("R1", Some("P1"), Device::Android)],
            &[(
                "R1",
                JudgmentScores {
                    correct: Some(1),
                    matches: None,
                },
            )],
        );
        let report = combine(&baseline, &WaveSources::default(), &HashMap::new());

        assert_eq!(report.headers(), report_headers().as_slice());
        for column in [
            "bl_avg_ai_correct",
            "bl_avg_upload_sec",
            "bl_avg_trufor_flagged",
            "bl_avg_web_match",
            "bl_app_aigen_flagged",
            "el_app_dup_flagged",
            "el_respondent_id",
            "device_changed",
        ] {
            assert_eq!(cell(&report, 0, column), None, "{column}");
        }
        assert_eq!(cell(&report, 0, "bl_avg_h_correct"), Some("1"));
        assert_eq!(cell(&report, 0, "device"), Some("Android"));
    }

    #[test]
    fn or_aggregated_flags_reach_the_report() {
        let mut baseline = wave(vec![identity("R1", Some("P1"), Device::Ios)], &[]);
        let app = baseline.pools.get_mut(&Pool::App).unwrap();
        app.images.insert(
            ImageCheck::Tamper,
            HashMap::from([("R1".to_string(), Some(true))]),
        );
        app.upload_sec.insert("R1".into(), 12.5);

        let report = combine(&baseline, &WaveSources::default(), &HashMap::new());
        assert_eq!(cell(&report, 0, "bl_app_trufor_flagged"), Some("1"));
        assert_eq!(cell(&report, 0, "bl_app_upload_sec"), Some("12.5"));
        assert_eq!(cell(&report, 0, "bl_avg_trufor_flagged"), None);
    }

    #[test]
    fn device_change_prefers_the_consistency_table() {
        let baseline = wave(
            vec![
                identity("R1", Some("P1"), Device::Ios),
                identity("R2", Some("P2"), Device::Ios),
            ],
            &[],
        );
        let endline = wave(
            vec![
                identity("R8", Some("P1"), Device::Android),
                identity("R9", Some("P2"), Device::Android),
            ],
            &[],
        );
        let matches = HashMap::from([("P1".to_string(), Some(true))]);

        let report = combine(&baseline, &endline, &matches);
        assert_eq!(cell(&report, 0, "device_changed"), Some("0"));
        assert_eq!(cell(&report, 1, "device_changed"), Some("1"));
        assert_eq!(cell(&report, 1, "device"), Some("iOS"));
    }

    #[test]
    fn respondents_without_participant_id_stay_unlinked() {
        let baseline = wave(vec![identity("R1", None, Device::Ios)], &[]);
        let endline = wave(vec![identity("R2", None, Device::Ios)], &[]);

        let report = combine(&baseline, &endline, &HashMap::new());
        assert_eq!(report.len(), 2);
        assert_eq!(cell(&report, 0, "participant_id"), None);
        assert_eq!(cell(&report, 0, "bl_respondent_id"), Some("R1"));
        assert_eq!(cell(&report, 1, "el_respondent_id"), Some("R2"));
        assert_eq!(cell(&report, 1, "device_changed"), None);
    }
}
