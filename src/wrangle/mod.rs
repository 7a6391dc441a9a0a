//! Raw survey export to canonical per-respondent tables.

pub mod branch;
pub mod builder;
pub mod config;
pub mod dates;
pub mod device;
pub mod manifest;

use anyhow::{Context, Result};

use crate::{
    error::PipelineError,
    log_info, log_warn,
    models::{AppRow, AverageRow, Wave},
    settings::PipelineSettings,
    table::{write_records, RawTable},
};

use builder::{build_records, BuildStats};
use config::{IdentitySource, WaveConfig};
use manifest::{attach_screenshot_paths, FileManifest};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone)]
pub struct WrangleSummary {
    pub wave: Wave,
    pub stats: BuildStats,
    pub unresolved_screenshots: usize,
}

/// Reads one wave's raw export and manifest, then writes the average, app and
/// timing tables under `derived/`.
pub fn wrangle_wave(settings: &PipelineSettings, wave: Wave) -> Result<WrangleSummary> {
    let config = WaveConfig::load(settings.wave_config_path(wave))?;
    if config.wave != wave {
        return Err(PipelineError::InvalidConfig(format!(
            "{} is a {} config but was given for the {wave} wave",
            settings.wave_config_path(wave).display(),
            config.wave
        ))
        .into());
    }

    let paths = settings.wave_paths(wave);
    let responses = RawTable::read(&paths.responses())?;
    log_info!(
        "{wave} wave: read {} rows from {}",
        responses.len(),
        paths.responses().display()
    );

    let layout = config.resolve(
        &responses,
        settings.participant_id_field.as_deref(),
        settings.synthetic_participant_ids,
    )?;
    if layout.identity == IdentitySource::Synthetic {
        log_warn!(
            "{wave} wave: using synthetic participant ids (SYN-{wave}-NNNNN). They are row-order fixtures and never link respondents across waves"
        );
    }

    let manifest = FileManifest::load(&paths.manifest())?;
    let mut output = build_records(&responses, &layout);
    let unresolved_screenshots = attach_screenshot_paths(&mut output.records, &manifest);
    if unresolved_screenshots > 0 {
        log_warn!(
            "{wave} wave: {unresolved_screenshots} screenshot references have no downloaded file"
        );
    }

    let average: Vec<AverageRow> = output.records.iter().map(AverageRow::from).collect();
    let app: Vec<AppRow> = output.records.iter().map(AppRow::from).collect();
    write_records(&paths.average_table(), &average)
        .with_context(|| format!("Failed to write {wave} average table"))?;
    write_records(&paths.app_table(), &app)
        .with_context(|| format!("Failed to write {wave} app table"))?;
    write_records(&paths.timing(), &output.timing)
        .with_context(|| format!("Failed to write {wave} timing table"))?;

    log_info!(
        "{wave} wave: wrote {} and {}",
        paths.average_table().display(),
        paths.app_table().display()
    );

    Ok(WrangleSummary {
        wave,
        stats: output.stats,
        unresolved_screenshots,
    })
}
