//! Archive layout:
//!
//! - `manifest.json`: producer, export request, file index (always first)
//! - `discovery.json`: the discovery document the run was generated from
//! - `report.json`: the export report
//! - `results/NNNN-<id>.json`: one per test case, in run order

mod error;
mod limits;
mod manifest;
mod reader;
mod writer;

pub use error::EvidenceError;
pub use limits::ArchiveLimits;
pub use manifest::{FileMeta, Manifest, ProducerMeta};
pub use reader::EvidenceArchive;
pub use writer::EvidenceWriter;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DISCOVERY_FILE: &str = "discovery.json";
pub const REPORT_FILE: &str = "report.json";
pub(crate) const RESULTS_DIR: &str = "results/";
