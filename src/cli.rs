//! Command-line surface.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use crate::{
    annotations::{Review, ReviewSession},
    fingerprint::fingerprint_wave,
    models::{Judgment, Pool, Wave},
    report::{build_consistency, build_report},
    sampling::sample_pool,
    settings::PipelineSettings,
    wrangle::wrangle_wave,
};

/// Screen-time survey compliance pipeline
#[derive(Parser, Debug)]
#[command(name = "screentime-compliance", version)]
#[command(about = "Wrangle survey exports, sample review tasks and build the compliance report")]
pub struct Cli {
    /// Pipeline settings file (JSON); defaults apply when it does not exist
    #[arg(long, global = true, env = "SCREENTIME_SETTINGS", default_value = "compliance.json")]
    pub settings: PathBuf,

    /// Overrides the data root from the settings file
    #[arg(long, global = true, env = "SCREENTIME_DATA_ROOT")]
    pub data_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the default settings file if none exists
    Init,

    /// Build the canonical average, app and timing tables of a wave
    Wrangle {
        #[arg(long)]
        wave: Wave,
    },

    /// Draw (or reuse) the review sample of a wave
    Sample {
        #[arg(long)]
        wave: Wave,

        /// Only this pool; both when omitted
        #[arg(long)]
        pool: Option<Pool>,
    },

    /// Record a review for one task
    Annotate {
        #[arg(long)]
        wave: Wave,

        #[arg(long)]
        pool: Pool,

        /// Task to annotate; the next unannotated task when omitted
        #[arg(long)]
        task_id: Option<String>,

        #[arg(long)]
        reviewer: String,

        /// Yes, No or Unsure
        #[arg(long)]
        screenshot_correct: Judgment,

        /// Yes, No or Unsure
        #[arg(long)]
        numbers_match: Judgment,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Show review progress and the next open task
    ReviewStatus {
        #[arg(long)]
        wave: Wave,

        #[arg(long)]
        pool: Pool,
    },

    /// Hash sampled screenshots and flag reuse across respondents
    Fingerprint {
        #[arg(long)]
        wave: Wave,

        /// Only report this pool; both when omitted
        #[arg(long)]
        pool: Option<Pool>,
    },

    /// Compare device, OS and browser across waves
    Consistency,

    /// Build the combined compliance report
    Report,
}

fn pools(selected: Option<Pool>) -> Vec<Pool> {
    selected.map_or_else(|| Pool::ALL.to_vec(), |pool| vec![pool])
}

impl Cli {
    pub fn load_settings(&self) -> Result<PipelineSettings> {
        let mut settings = PipelineSettings::load(&self.settings)?;
        if let Some(data_root) = &self.data_root {
            settings.data_root = data_root.clone();
        }
        Ok(settings)
    }

    pub fn execute(self) -> Result<()> {
        if let Command::Init = self.command {
            if self.settings.exists() {
                info!("{} already exists; leaving it untouched", self.settings.display());
                return Ok(());
            }
            PipelineSettings::default().save(&self.settings)?;
            println!("Wrote default settings to {}", self.settings.display());
            return Ok(());
        }

        let settings = self.load_settings()?;
        match self.command {
            Command::Init => {}
            Command::Wrangle { wave } => {
                let summary = wrangle_wave(&settings, wave)?;
                println!(
                    "{wave}: {} respondents ({} iOS, {} Android, {} unknown), {} unresolved branches, {} unresolved screenshots",
                    summary.stats.respondents,
                    summary.stats.ios,
                    summary.stats.android,
                    summary.stats.unknown_device,
                    summary.stats.unresolved_branches,
                    summary.unresolved_screenshots
                );
            }
            Command::Sample { wave, pool } => {
                for pool in pools(pool) {
                    let outcome = sample_pool(&settings, wave, pool)?;
                    let verb = if outcome.reused { "kept" } else { "drew" };
                    println!("{wave} {pool}: {verb} {} tasks", outcome.table.len());
                }
            }
            Command::Annotate {
                wave,
                pool,
                task_id,
                reviewer,
                screenshot_correct,
                numbers_match,
                notes,
            } => {
                let mut session = ReviewSession::open(&settings, wave, pool)?;
                let task_id = match task_id {
                    Some(task_id) => task_id,
                    None => session
                        .current()
                        .filter(|task| !session.store().contains(&task.task_id))
                        .map(|task| task.task_id.clone())
                        .with_context(|| format!("Every {wave} {pool} task is already annotated"))?,
                };
                session.submit(
                    &task_id,
                    Review {
                        reviewer,
                        screenshot_correct,
                        numbers_match,
                        notes,
                    },
                )?;
                let progress = session.progress();
                println!(
                    "Saved {task_id} ({}/{} annotated)",
                    progress.annotated, progress.total
                );
            }
            Command::ReviewStatus { wave, pool } => {
                let session = ReviewSession::open(&settings, wave, pool)?;
                let progress = session.progress();
                println!(
                    "{wave} {pool}: {}/{} annotated, {} remaining",
                    progress.annotated, progress.total, progress.remaining
                );
                match session.current() {
                    Some(task) if progress.remaining > 0 => {
                        println!("Next task: {} (respondent {})", task.task_id, task.respondent_id)
                    }
                    _ => println!("Nothing left to review"),
                }
            }
            Command::Fingerprint { wave, pool } => {
                for (pool, flagged) in fingerprint_wave(&settings, wave, &pools(pool))? {
                    println!("{wave} {pool}: {flagged} images flagged as reused");
                }
            }
            Command::Consistency => {
                let rows = build_consistency(&settings)?;
                println!(
                    "{} participants written to {}",
                    rows.len(),
                    settings.device_consistency_path().display()
                );
            }
            Command::Report => {
                let report = build_report(&settings)?;
                if report.is_empty() {
                    warn!("The report has no rows; run `sample` for at least one wave first");
                }
                println!(
                    "{} rows written to {}",
                    report.len(),
                    settings.report_path().display()
                );
            }
        }
        Ok(())
    }
}
