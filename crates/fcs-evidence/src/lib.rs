//! Evidence archives for conformance runs.
//!
//! An archive is a deterministic ZIP holding the validated discovery
//! document, the exported run report and one evidence file per test case,
//! indexed by a `manifest.json` carrying a SHA-256 for every other entry.
//! Export writes it with [`EvidenceWriter`]; import reads and verifies it
//! with [`EvidenceArchive`].

pub mod archive;

pub use archive::{
    ArchiveLimits, EvidenceArchive, EvidenceError, EvidenceWriter, FileMeta, Manifest,
    ProducerMeta, DISCOVERY_FILE, MANIFEST_FILE, REPORT_FILE,
};
