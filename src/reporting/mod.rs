//! Risk reports: merging classifier and forecast verdicts, per-city
//! summaries and file export.

pub mod export;
pub mod reporter;

pub use export::{ExportFormat, ReportExporter};
pub use reporter::{risk_score, Reporter};
