//! Perceptual-hash check for screenshots reused across respondents.
//!
//! Every sampled screenshot of a wave is hashed; an image is flagged when a
//! different respondent of the same wave submitted an image within
//! `duplicate_max_distance` bits of it.

use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    log_info, log_warn,
    models::{Pool, Wave},
    report::sources::ImageCheck,
    sampling::TASK_ID_COLUMN,
    settings::PipelineSettings,
    table::{write_records, RawTable, TableRow},
};

const ENABLE_LOGS: bool = true;

/// Row of `fingerprints_{avg,app}.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FingerprintRow {
    pub task_id: String,
    pub respondent_id: String,
    pub image_col: String,
    pub image_path: String,
    pub status: String,
    pub phash: Option<String>,
    pub duplicate_of: Option<String>,
    pub flagged: Option<bool>,
}

impl TableRow for FingerprintRow {
    const HEADERS: &'static [&'static str] = &[
        "task_id",
        "respondent_id",
        "image_col",
        "image_path",
        "status",
        "phash",
        "duplicate_of",
        "flagged",
    ];
}

pub fn compute_phash(img: &DynamicImage) -> String {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    hasher.hash_image(img).to_base64()
}

pub fn phash_file(path: &Path) -> Result<String> {
    let img = image::open(path).with_context(|| format!("Failed to decode {}", path.display()))?;
    Ok(compute_phash(&img))
}

/// `u32::MAX` when either hash does not decode.
pub fn compute_hamming_distance(lhs: &str, rhs: &str) -> u32 {
    let Ok(h1) = ImageHash::<Vec<u8>>::from_base64(lhs) else {
        return u32::MAX;
    };
    let Ok(h2) = ImageHash::<Vec<u8>>::from_base64(rhs) else {
        return u32::MAX;
    };
    h1.dist(&h2)
}

/// Hashes every screenshot referenced by a pool's sample.
pub fn hash_sample(sample: &RawTable, pool: Pool) -> Result<Vec<FingerprintRow>> {
    sample.require_column(TASK_ID_COLUMN)?;
    sample.require_column("respondent_id")?;

    let mut rows = Vec::new();
    for row in sample.rows() {
        let (Some(task_id), Some(respondent_id)) =
            (row.get(TASK_ID_COLUMN), row.get("respondent_id"))
        else {
            continue;
        };
        for column in pool.path_fields() {
            let Some(image_path) = row.get(column) else {
                continue;
            };
            let (status, phash) = match phash_file(Path::new(image_path)) {
                Ok(hash) => ("ok", Some(hash)),
                Err(err) => {
                    log_warn!("{task_id} {column}: {err:#}");
                    ("error", None)
                }
            };
            rows.push(FingerprintRow {
                task_id: task_id.to_string(),
                respondent_id: respondent_id.to_string(),
                image_col: column.to_string(),
                image_path: image_path.to_string(),
                status: status.to_string(),
                phash,
                duplicate_of: None,
                flagged: None,
            });
        }
    }
    Ok(rows)
}

/// Sets `flagged` and `duplicate_of` by comparing each hashed image with the
/// images of other respondents. Unhashed images keep a null flag.
pub fn flag_duplicates(rows: &mut [FingerprintRow], max_distance: u32) {
    let matches: Vec<Option<Option<String>>> = rows
        .iter()
        .map(|row| {
            let hash = row.phash.as_deref()?;
            let closest = rows
                .iter()
                .filter(|other| other.respondent_id != row.respondent_id)
                .filter_map(|other| {
                    let distance = compute_hamming_distance(hash, other.phash.as_deref()?);
                    (distance <= max_distance).then_some((distance, other))
                })
                .min_by_key(|(distance, _)| *distance);
            Some(closest.map(|(_, other)| other.task_id.clone()))
        })
        .collect();

    for (row, found) in rows.iter_mut().zip(matches) {
        match found {
            Some(duplicate_of) => {
                row.flagged = Some(duplicate_of.is_some());
                row.duplicate_of = duplicate_of;
            }
            None => {
                row.flagged = None;
                row.duplicate_of = None;
            }
        }
    }
}

/// Hashes both pools' samples of a wave and writes a fingerprint report for
/// each requested pool. Returns the number of flagged images per pool.
pub fn fingerprint_wave(
    settings: &PipelineSettings,
    wave: Wave,
    pools: &[Pool],
) -> Result<Vec<(Pool, usize)>> {
    let paths = settings.wave_paths(wave);

    let mut hashed: Vec<(Pool, FingerprintRow)> = Vec::new();
    for pool in Pool::ALL {
        let Some(sample) = RawTable::read_optional(&paths.sample(pool))? else {
            if pools.contains(&pool) {
                return Err(PipelineError::missing_input(paths.sample(pool)).into());
            }
            log_warn!("{wave} {pool}: no sample yet; not part of the duplicate comparison");
            continue;
        };
        hashed.extend(hash_sample(&sample, pool)?.into_iter().map(|row| (pool, row)));
    }

    let (owners, mut rows): (Vec<Pool>, Vec<FingerprintRow>) = hashed.into_iter().unzip();
    flag_duplicates(&mut rows, settings.duplicate_max_distance);

    let mut summary = Vec::new();
    for &pool in pools {
        let report: Vec<&FingerprintRow> = owners
            .iter()
            .zip(&rows)
            .filter(|(owner, _)| **owner == pool)
            .map(|(_, row)| row)
            .collect();
        let flagged = report.iter().filter(|row| row.flagged == Some(true)).count();
        let path = paths.image_report(ImageCheck::Duplicate, pool);
        write_records(&path, &report)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log_info!(
            "{wave} {pool}: fingerprinted {} images, {flagged} flagged as reused",
            report.len()
        );
        summary.push((pool, flagged));
    }
    Ok(summary)
}
