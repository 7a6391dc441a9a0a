//! Manual review: the persisted annotation table and the reviewer's cursor.

pub mod session;
pub mod store;

pub use session::{Progress, Review, ReviewSession, ReviewTask};
pub use store::AnnotationStore;
