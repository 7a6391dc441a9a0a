use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::{
    error::PipelineError,
    log_info,
    models::{AnnotationRecord, Judgment, Pool, Wave},
    sampling::{load_sample, TASK_ID_COLUMN},
    settings::PipelineSettings,
    table::RawTable,
};

use super::store::AnnotationStore;

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTask {
    pub task_id: String,
    pub respondent_id: String,
}

/// What a reviewer enters for one task.
#[derive(Debug, Clone)]
pub struct Review {
    pub reviewer: String,
    pub screenshot_correct: Judgment,
    pub numbers_match: Judgment,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub annotated: usize,
    pub remaining: usize,
}

/// Single-reviewer cursor over one pool's sampled tasks.
pub struct ReviewSession {
    settings: PipelineSettings,
    wave: Wave,
    pool: Pool,
    tasks: Vec<ReviewTask>,
    cursor: usize,
    store: AnnotationStore,
}

pub fn tasks_from_sample(sample: &RawTable) -> Result<Vec<ReviewTask>> {
    sample.require_column(TASK_ID_COLUMN)?;
    sample.require_column("respondent_id")?;
    Ok(sample
        .rows()
        .filter_map(|row| {
            Some(ReviewTask {
                task_id: row.get(TASK_ID_COLUMN)?.to_string(),
                respondent_id: row.get("respondent_id")?.to_string(),
            })
        })
        .collect())
}

impl ReviewSession {
    /// Opens a pool and places the cursor on the first task still to review.
    pub fn open(settings: &PipelineSettings, wave: Wave, pool: Pool) -> Result<Self> {
        let (tasks, store) = load_pool(settings, wave, pool)?;
        let mut session = Self {
            settings: settings.clone(),
            wave,
            pool,
            tasks,
            cursor: 0,
            store,
        };
        session.seek_next_unannotated();
        Ok(session)
    }

    pub fn wave(&self) -> Wave {
        self.wave
    }

    pub fn pool(&self) -> Pool {
        self.pool
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn current(&self) -> Option<&ReviewTask> {
        self.tasks.get(self.cursor)
    }

    /// Moves forward one task; stays on the last task at the end.
    pub fn advance(&mut self) -> Option<&ReviewTask> {
        if self.cursor + 1 < self.tasks.len() {
            self.cursor += 1;
        }
        self.current()
    }

    pub fn back(&mut self) -> Option<&ReviewTask> {
        self.cursor = self.cursor.saturating_sub(1);
        self.current()
    }

    /// Moves to the next task without an annotation, searching forward from
    /// the cursor and wrapping. Returns `None` once every task is annotated.
    pub fn seek_next_unannotated(&mut self) -> Option<&ReviewTask> {
        let count = self.tasks.len();
        let next = (0..count)
            .map(|step| (self.cursor + step) % count)
            .find(|&index| !self.store.contains(&self.tasks[index].task_id))?;
        self.cursor = next;
        self.current()
    }

    /// Swaps to the other pool of the same wave.
    pub fn switch_pool(&mut self, pool: Pool) -> Result<()> {
        if pool == self.pool {
            return Ok(());
        }
        let (tasks, store) = load_pool(&self.settings, self.wave, pool)?;
        self.pool = pool;
        self.tasks = tasks;
        self.store = store;
        self.cursor = 0;
        self.seek_next_unannotated();
        Ok(())
    }

    /// Saves a review for `task_id` and moves on to the next open task.
    pub fn submit(&mut self, task_id: &str, review: Review) -> Result<()> {
        let Some(index) = self.tasks.iter().position(|task| task.task_id == task_id) else {
            return Err(PipelineError::UnknownTask {
                task_id: task_id.to_string(),
                pool: self.pool,
            }
            .into());
        };

        let task = &self.tasks[index];
        self.store.upsert(AnnotationRecord {
            task_id: task.task_id.clone(),
            respondent_id: task.respondent_id.clone(),
            reviewer: review.reviewer,
            screenshot_correct: review.screenshot_correct,
            numbers_match: review.numbers_match,
            notes: review.notes,
            annotated_at: Utc::now(),
        })?;

        self.cursor = index;
        if self.seek_next_unannotated().is_none() {
            log_info!("{} {}: every task is annotated", self.wave, self.pool);
        }
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        let annotated = self
            .tasks
            .iter()
            .filter(|task| self.store.contains(&task.task_id))
            .count();
        Progress {
            total: self.tasks.len(),
            annotated,
            remaining: self.tasks.len() - annotated,
        }
    }
}

fn load_pool(
    settings: &PipelineSettings,
    wave: Wave,
    pool: Pool,
) -> Result<(Vec<ReviewTask>, AnnotationStore)> {
    let sample = load_sample(settings, wave, pool)?;
    let tasks = tasks_from_sample(&sample)?;
    let store = AnnotationStore::load(&settings.wave_paths(wave).annotations(pool))?;
    log_info!(
        "{wave} {pool}: {} tasks, {} annotated",
        tasks.len(),
        store.len()
    );
    Ok((tasks, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn write_sample(settings: &PipelineSettings, pool: Pool, respondents: &[&str]) {
        let rows = respondents
            .iter()
            .enumerate()
            .map(|(offset, respondent)| {
                vec![
                    respondent.to_string(),
                    crate::sampling::task_id(pool, respondent, offset + 1),
                ]
            })
            .collect();
        RawTable::new(
            "sample",
            vec!["respondent_id".into(), TASK_ID_COLUMN.into()],
            rows,
        )
        .write(&settings.wave_paths(Wave::Baseline).sample(pool))
        .unwrap();
    }

    fn setup() -> (TempDir, PipelineSettings) {
        let dir = tempdir().unwrap();
        let settings = PipelineSettings {
            data_root: dir.path().to_path_buf(),
            ..PipelineSettings::default()
        };
        write_sample(&settings, Pool::Average, &["R1", "R2", "R3"]);
        write_sample(&settings, Pool::App, &["R9"]);
        (dir, settings)
    }

    fn review(notes: &str) -> Review {
        Review {
            reviewer: "ana".into(),
            screenshot_correct: Judgment::Yes,
            numbers_match: Judgment::No,
            notes: notes.into(),
        }
    }

    #[test]
    fn submit_moves_to_the_next_open_task_and_tracks_progress() {
        let (_dir, settings) = setup();
        let mut session = ReviewSession::open(&settings, Wave::Baseline, Pool::Average).unwrap();
        assert_eq!(session.current().unwrap().task_id, "avg_R1_0001");

        session.submit("avg_R1_0001", review("")).unwrap();
        assert_eq!(session.current().unwrap().task_id, "avg_R2_0002");
        assert_eq!(
            session.progress(),
            Progress {
                total: 3,
                annotated: 1,
                remaining: 2
            }
        );

        // reopening resumes at the first task still to review
        let reopened = ReviewSession::open(&settings, Wave::Baseline, Pool::Average).unwrap();
        assert_eq!(reopened.current().unwrap().task_id, "avg_R2_0002");
    }

    #[test]
    fn cursor_stays_within_the_task_list() {
        let (_dir, settings) = setup();
        let mut session = ReviewSession::open(&settings, Wave::Baseline, Pool::Average).unwrap();
        assert_eq!(session.back().unwrap().task_id, "avg_R1_0001");
        session.advance();
        session.advance();
        assert_eq!(session.advance().unwrap().task_id, "avg_R3_0003");
    }

    #[test]
    fn seek_wraps_and_reports_completion() {
        let (_dir, settings) = setup();
        let mut session = ReviewSession::open(&settings, Wave::Baseline, Pool::Average).unwrap();
        session.submit("avg_R3_0003", review("")).unwrap();
        assert_eq!(session.current().unwrap().task_id, "avg_R1_0001");

        session.submit("avg_R1_0001", review("")).unwrap();
        session.submit("avg_R2_0002", review("")).unwrap();
        assert!(session.seek_next_unannotated().is_none());
        assert_eq!(session.progress().remaining, 0);
    }

    #[test]
    fn unknown_task_is_rejected() {
        let (_dir, settings) = setup();
        let mut session = ReviewSession::open(&settings, Wave::Baseline, Pool::Average).unwrap();
        let err = session.submit("avg_R7_0009", review("")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::UnknownTask { .. })
        ));
        assert!(session.store().is_empty());
    }

    #[test]
    fn switching_pool_loads_that_pool_tasks() {
        let (_dir, settings) = setup();
        let mut session = ReviewSession::open(&settings, Wave::Baseline, Pool::Average).unwrap();
        session.switch_pool(Pool::App).unwrap();
        assert_eq!(session.pool(), Pool::App);
        assert_eq!(session.current().unwrap().task_id, "app_R9_0001");
        assert_eq!(session.progress().total, 1);
    }
}
