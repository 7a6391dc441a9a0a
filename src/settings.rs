use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::PipelineError,
    models::{Pool, Wave},
    report::sources::ImageCheck,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub data_root: PathBuf,
    pub baseline_config: PathBuf,
    pub endline_config: PathBuf,
    pub sample_size_avg: usize,
    pub sample_size_app: usize,
    pub seed: u64,
    /// Overrides the wave configs' stable identity column when set.
    pub participant_id_field: Option<String>,
    /// Row-order participant ids when the identity column is missing.
    /// Fixture use only: these ids never link the same person across waves.
    pub synthetic_participant_ids: bool,
    pub ai_generated_threshold: f64,
    pub duplicate_max_distance: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            baseline_config: PathBuf::from("config/baseline.json"),
            endline_config: PathBuf::from("config/endline.json"),
            sample_size_avg: 50,
            sample_size_app: 50,
            seed: 42,
            participant_id_field: None,
            synthetic_participant_ids: false,
            ai_generated_threshold: 0.5,
            duplicate_max_distance: 4,
        }
    }
}

impl PipelineSettings {
    /// Missing file means defaults; a file that does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).map_err(|err| {
                PipelineError::InvalidConfig(format!("{}: {err}", path.display()))
            })?
        } else {
            info!("No settings at {}; using defaults", path.display());
            Self::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.ai_generated_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "ai_generated_threshold must be within [0, 1], got {}",
                self.ai_generated_threshold
            ))
            .into());
        }
        if self.duplicate_max_distance > 64 {
            return Err(PipelineError::InvalidConfig(format!(
                "duplicate_max_distance must be at most 64 bits, got {}",
                self.duplicate_max_distance
            ))
            .into());
        }
        Ok(())
    }

    pub fn wave_config_path(&self, wave: Wave) -> &Path {
        match wave {
            Wave::Baseline => &self.baseline_config,
            Wave::Endline => &self.endline_config,
        }
    }

    pub fn sample_size(&self, pool: Pool) -> usize {
        match pool {
            Pool::Average => self.sample_size_avg,
            Pool::App => self.sample_size_app,
        }
    }

    pub fn wave_paths(&self, wave: Wave) -> WavePaths {
        WavePaths::new(&self.data_root, wave)
    }

    pub fn device_consistency_path(&self) -> PathBuf {
        self.data_root.join("device_consistency.csv")
    }

    pub fn report_path(&self) -> PathBuf {
        self.data_root.join("combined_compliance_report.csv")
    }
}

/// File layout of one wave under the data root.
#[derive(Debug, Clone)]
pub struct WavePaths {
    root: PathBuf,
}

impl WavePaths {
    pub fn new(data_root: &Path, wave: Wave) -> Self {
        Self {
            root: data_root.join(wave.as_str()),
        }
    }

    pub fn responses(&self) -> PathBuf {
        self.root.join("raw").join("responses.csv")
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join("raw").join("uploaded_files_manifest.csv")
    }

    pub fn average_table(&self) -> PathBuf {
        self.root
            .join("derived")
            .join("average_screentime_for_annotation.csv")
    }

    pub fn app_table(&self) -> PathBuf {
        self.root
            .join("derived")
            .join("app_screentime_for_annotation.csv")
    }

    /// Builder output the pool samples from.
    pub fn candidates(&self, pool: Pool) -> PathBuf {
        match pool {
            Pool::Average => self.average_table(),
            Pool::App => self.app_table(),
        }
    }

    pub fn timing(&self) -> PathBuf {
        self.root.join("derived").join("timing.csv")
    }

    pub fn sample(&self, pool: Pool) -> PathBuf {
        self.results(format!("sample_{}.csv", pool.prefix()))
    }

    pub fn annotations(&self, pool: Pool) -> PathBuf {
        self.results(format!("annotations_{}.csv", pool.prefix()))
    }

    pub fn auto_annotations(&self, pool: Pool) -> PathBuf {
        self.results(format!("auto_annotations_{}.csv", pool.prefix()))
    }

    pub fn image_report(&self, check: ImageCheck, pool: Pool) -> PathBuf {
        self.results(format!("{}_{}.csv", check.file_stem(), pool.prefix()))
    }

    fn results(&self, file_name: String) -> PathBuf {
        self.root.join("results").join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = PipelineSettings::load(&dir.path().join("compliance.json")).unwrap();
        assert_eq!(settings.seed, 42);
        assert!(!settings.synthetic_participant_ids);
    }

    #[test]
    fn partial_settings_fill_in_defaults_and_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("compliance.json");
        fs::write(&path, r#"{ "seed": 7, "sample_size_app": 12 }"#).unwrap();

        let settings = PipelineSettings::load(&path).unwrap();
        assert_eq!(settings.seed, 7);
        assert_eq!(settings.sample_size(Pool::App), 12);
        assert_eq!(settings.sample_size(Pool::Average), 50);

        settings.save(&path).unwrap();
        assert_eq!(PipelineSettings::load(&path).unwrap().seed, 7);
    }

    #[test]
    fn malformed_settings_are_a_configuration_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("compliance.json");
        fs::write(&path, "{ seed: ").unwrap();
        let err = PipelineSettings::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn wave_paths_follow_the_results_layout() {
        let paths = WavePaths::new(Path::new("data"), Wave::Endline);
        assert_eq!(
            paths.sample(Pool::App),
            Path::new("data/endline/results/sample_app.csv")
        );
        assert_eq!(
            paths.image_report(ImageCheck::Tamper, Pool::Average),
            Path::new("data/endline/results/trufor_avg.csv")
        );
    }
}
