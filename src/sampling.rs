//! Review-task sampling.
//!
//! A draw filters the builder table down to rows with at least one screenshot
//! on disk, picks rows without replacement from an injected random source and
//! tags each with a `task_id`. The persisted sample is sticky: once
//! `results/sample_<pool>.csv` exists it is returned as-is until an operator
//! deletes it.

use std::path::Path;

use anyhow::{Context, Result};
use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};

use crate::{
    error::PipelineError,
    log_info,
    models::{Pool, Wave},
    settings::PipelineSettings,
    table::RawTable,
};

const ENABLE_LOGS: bool = true;

pub const TASK_ID_COLUMN: &str = "task_id";

#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub table: RawTable,
    /// True when an existing persisted sample was returned.
    pub reused: bool,
}

pub fn task_id(pool: Pool, respondent_id: &str, ordinal: usize) -> String {
    format!("{}_{respondent_id}_{ordinal:04}", pool.prefix())
}

/// Row positions with at least one of the pool's path fields pointing to an
/// existing file.
pub fn eligible_positions(candidates: &RawTable, pool: Pool) -> Vec<usize> {
    candidates
        .rows()
        .filter(|row| {
            pool.path_fields()
                .iter()
                .filter_map(|field| row.get(field))
                .any(|path| Path::new(path).is_file())
        })
        .map(|row| row.position())
        .collect()
}

/// Draws up to `n` eligible rows. `n` is clamped to the eligible count; an
/// empty pool is an error rather than an empty sample.
pub fn draw<R>(
    wave: Wave,
    pool: Pool,
    candidates: &RawTable,
    n: usize,
    rng: &mut R,
) -> Result<RawTable>
where
    R: Rng + ?Sized,
{
    let eligible = eligible_positions(candidates, pool);
    if eligible.is_empty() {
        return Err(PipelineError::EmptyPool {
            wave,
            pool,
            fields: pool.path_fields().iter().map(|f| f.to_string()).collect(),
        }
        .into());
    }
    candidates.require_column("respondent_id")?;

    let amount = n.min(eligible.len());
    let positions: Vec<usize> = index::sample(rng, eligible.len(), amount)
        .into_iter()
        .map(|picked| eligible[picked])
        .collect();

    let mut sample = candidates.select(&positions);
    let task_ids = sample
        .rows()
        .enumerate()
        .map(|(offset, row)| {
            let respondent = row.get("respondent_id").unwrap_or_default();
            task_id(pool, respondent, offset + 1)
        })
        .collect();
    sample.push_column(TASK_ID_COLUMN, task_ids);

    log_info!(
        "{wave} {pool}: drew {amount} of {} eligible candidates ({} requested, {} total)",
        eligible.len(),
        n,
        candidates.len()
    );
    Ok(sample)
}

pub fn draw_seeded(
    wave: Wave,
    pool: Pool,
    candidates: &RawTable,
    n: usize,
    seed: u64,
) -> Result<RawTable> {
    let mut rng = StdRng::seed_from_u64(seed);
    draw(wave, pool, candidates, n, &mut rng)
}

/// Returns the persisted sample when present, else draws and persists one.
pub fn sample_pool(settings: &PipelineSettings, wave: Wave, pool: Pool) -> Result<SampleOutcome> {
    let paths = settings.wave_paths(wave);
    let sample_path = paths.sample(pool);

    if sample_path.exists() {
        let table = RawTable::read(&sample_path)?;
        log_info!(
            "{wave} {pool}: keeping existing sample of {} tasks at {} (delete it to redraw)",
            table.len(),
            sample_path.display()
        );
        return Ok(SampleOutcome {
            table,
            reused: true,
        });
    }

    let candidates = RawTable::read(&paths.candidates(pool))?;
    let table = draw_seeded(wave, pool, &candidates, settings.sample_size(pool), settings.seed)?;
    table
        .write(&sample_path)
        .with_context(|| format!("Failed to persist {wave} {pool} sample"))?;
    log_info!("{wave} {pool}: wrote {}", sample_path.display());

    Ok(SampleOutcome {
        table,
        reused: false,
    })
}

/// Loads the persisted sample of a pool; absent samples are a setup error.
pub fn load_sample(settings: &PipelineSettings, wave: Wave, pool: Pool) -> Result<RawTable> {
    RawTable::read(&settings.wave_paths(wave).sample(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, fs};
    use tempfile::{tempdir, TempDir};

    /// Builder-shaped app table with `with_files` rows whose screenshots exist.
    fn candidates(dir: &TempDir, with_files: usize, without_files: usize) -> RawTable {
        let headers = vec![
            "respondent_id".to_string(),
            "app_screenshot1_path".to_string(),
            "app_screenshot2_path".to_string(),
            "app_screenshot3_path".to_string(),
        ];
        let mut rows = Vec::new();
        for i in 0..with_files {
            let shot = dir.path().join(format!("R{i}_app2.png"));
            fs::write(&shot, b"png").unwrap();
            rows.push(vec![
                format!("R{i}"),
                String::new(),
                shot.display().to_string(),
                String::new(),
            ]);
        }
        for i in 0..without_files {
            rows.push(vec![
                format!("X{i}"),
                dir.path().join("gone.png").display().to_string(),
                String::new(),
                String::new(),
            ]);
        }
        RawTable::new("app_screentime_for_annotation.csv", headers, rows)
    }

    #[test]
    fn clamps_to_eligible_count_without_duplicates() {
        let dir = tempdir().unwrap();
        let table = candidates(&dir, 12, 5);
        let sample = draw_seeded(Wave::Baseline, Pool::App, &table, 1000, 42).unwrap();

        assert_eq!(sample.len(), 12);
        let drawn: HashSet<_> = sample
            .rows()
            .filter_map(|row| row.get("respondent_id"))
            .collect();
        assert_eq!(drawn.len(), 12);
        assert!(drawn.iter().all(|id| id.starts_with('R')));
    }

    #[test]
    fn same_seed_gives_the_same_draw_in_the_same_order() {
        let dir = tempdir().unwrap();
        let table = candidates(&dir, 30, 0);
        let first = draw_seeded(Wave::Baseline, Pool::App, &table, 10, 42).unwrap();
        let second = draw_seeded(Wave::Baseline, Pool::App, &table, 10, 42).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn task_ids_follow_draw_order() {
        let dir = tempdir().unwrap();
        let table = candidates(&dir, 3, 0);
        let sample = draw_seeded(Wave::Baseline, Pool::App, &table, 3, 7).unwrap();

        for (offset, row) in sample.rows().enumerate() {
            let respondent = row.get("respondent_id").unwrap();
            assert_eq!(
                row.get(TASK_ID_COLUMN),
                Some(format!("app_{respondent}_{:04}", offset + 1).as_str())
            );
        }
    }

    #[test]
    fn empty_pool_is_an_error_naming_the_pool() {
        let dir = tempdir().unwrap();
        let table = candidates(&dir, 0, 4);
        let err = draw_seeded(Wave::Endline, Pool::App, &table, 5, 42).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyPool { pool: Pool::App, wave: Wave::Endline, .. })
        ));
        assert!(err.to_string().contains("app"));
    }

    #[test]
    fn persisted_sample_is_sticky() {
        let dir = tempdir().unwrap();
        let mut settings = PipelineSettings {
            data_root: dir.path().join("data"),
            ..PipelineSettings::default()
        };
        let paths = settings.wave_paths(Wave::Baseline);
        candidates(&dir, 20, 0).write(&paths.app_table()).unwrap();

        settings.sample_size_app = 5;
        let first = sample_pool(&settings, Wave::Baseline, Pool::App).unwrap();
        assert!(!first.reused);
        let bytes = fs::read(paths.sample(Pool::App)).unwrap();

        settings.sample_size_app = 15;
        settings.seed = 99;
        let second = sample_pool(&settings, Wave::Baseline, Pool::App).unwrap();
        assert!(second.reused);
        assert_eq!(second.table.len(), 5);
        assert_eq!(fs::read(paths.sample(Pool::App)).unwrap(), bytes);
        assert_eq!(first.table.headers(), second.table.headers());
    }
}
