//! Cross-source aggregation into the combined compliance report.

pub mod combine;
pub mod consistency;
pub mod sources;

pub use combine::build_report;
pub use consistency::build_consistency;
