pub mod annotation;
pub mod record;
pub mod survey;

pub use annotation::{judgment_score, AnnotationRecord, Judgment};
pub use record::{AppRow, AverageRow, CanonicalRecord, ScreenTime, ScreenshotRef, TimingRow};
pub use survey::{Device, Metric, Pool, Slot, Wave};
