#![forbid(unsafe_code)]

//! Database administration utilities.
//!
//! Read-only reports over an open [`Db`](crate::db::Db): statistics about
//! the tree, freelist and file, and a structural verification pass.

mod stats;
mod verify;

/// Statistics collection and reporting.
pub use stats::{
    stats, FilesystemStats, FreelistStatsSection, PagerStatsSection, StatsReport,
    TreeStatsSection,
};

/// Database integrity verification.
///
/// Verifies the structural integrity of the database and reports any issues found.
pub use verify::{verify, VerifyCounts, VerifyFinding, VerifyReport, VerifySeverity};
