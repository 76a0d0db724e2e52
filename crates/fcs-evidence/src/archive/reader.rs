//! Archive reader for imports.
//!
//! The whole archive is verified on open: manifest first, no unlisted,
//! duplicate or missing entries, every digest matching. The upload is
//! buffered under [`ArchiveLimits::max_archive_bytes`] before the ZIP
//! central directory is read.

use super::limits::LimitReader;
use super::manifest::{FileMeta, Manifest};
use super::{ArchiveLimits, EvidenceError, DISCOVERY_FILE, MANIFEST_FILE, REPORT_FILE};
use fcs_core::engine::TestCaseResult;
use fcs_core::report::ExportReport;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Component;
use tracing::debug;
use zip::ZipArchive;

#[derive(Debug, Clone)]
pub struct EvidenceArchive {
    manifest: Manifest,
    discovery: Value,
    report: ExportReport,
    results: Vec<TestCaseResult>,
}

impl EvidenceArchive {
    pub fn open<R: Read>(reader: R) -> Result<Self, EvidenceError> {
        Self::open_with_limits(reader, ArchiveLimits::default())
    }

    pub fn open_with_limits<R: Read>(reader: R, limits: ArchiveLimits) -> Result<Self, EvidenceError> {
        let entries = read_entries(reader, limits)?;
        let mut entries = entries.into_iter();

        let (first, manifest_bytes) = entries
            .next()
            .ok_or_else(|| EvidenceError::MissingEntry(MANIFEST_FILE.to_string()))?;
        if first != MANIFEST_FILE {
            return Err(EvidenceError::ManifestNotFirst(first));
        }
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| EvidenceError::json(MANIFEST_FILE, e))?;

        let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for (path, data) in entries {
            let Some(expected) = manifest.files.get(&path) else {
                return Err(EvidenceError::UnexpectedEntry(path));
            };
            if &FileMeta::of(&data) != expected {
                return Err(EvidenceError::DigestMismatch { path });
            }
            files.insert(path, data);
        }
        if let Some(missing) = manifest.files.keys().find(|p| !files.contains_key(*p)) {
            return Err(EvidenceError::MissingEntry(missing.clone()));
        }

        let discovery = parse(&files, DISCOVERY_FILE)?;
        let report: ExportReport = parse(&files, REPORT_FILE)?;
        // BTreeMap order equals run order thanks to the index prefix
        let results = files
            .iter()
            .filter(|(p, _)| p.starts_with(super::RESULTS_DIR))
            .map(|(p, data)| serde_json::from_slice(data).map_err(|e| EvidenceError::json(p.as_str(), e)))
            .collect::<Result<Vec<TestCaseResult>, _>>()?;

        debug!(results = results.len(), has_passed = manifest.has_passed, "evidence archive verified");
        Ok(Self {
            manifest,
            discovery,
            report,
            results,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Raw discovery document, to be re-validated before use.
    pub fn discovery(&self) -> &Value {
        &self.discovery
    }

    pub fn report(&self) -> &ExportReport {
        &self.report
    }

    pub fn results(&self) -> &[TestCaseResult] {
        &self.results
    }

    pub fn into_parts(self) -> (Manifest, Value, ExportReport) {
        (self.manifest, self.discovery, self.report)
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    files: &BTreeMap<String, Vec<u8>>,
    path: &str,
) -> Result<T, EvidenceError> {
    let data = files
        .get(path)
        .ok_or_else(|| EvidenceError::MissingEntry(path.to_string()))?;
    serde_json::from_slice(data).map_err(|e| EvidenceError::json(path, e))
}

fn read_entries<R: Read>(reader: R, limits: ArchiveLimits) -> Result<Vec<(String, Vec<u8>)>, EvidenceError> {
    let mut upload = Vec::new();
    LimitReader::new(reader, limits.max_archive_bytes, "LimitArchiveBytes")
        .read_to_end(&mut upload)
        .map_err(limit_aware)?;
    let mut archive = ZipArchive::new(Cursor::new(upload))?;
    if archive.len() > limits.max_entries {
        return Err(EvidenceError::LimitExceeded(format!(
            "{} entries, limit {}",
            archive.len(),
            limits.max_entries
        )));
    }

    let mut decoded: u64 = 0;
    let mut out: Vec<(String, Vec<u8>)> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        let path = entry.name().to_string();
        if path.len() > limits.max_path_len {
            return Err(EvidenceError::LimitExceeded(format!(
                "path length {} exceeds {}",
                path.len(),
                limits.max_path_len
            )));
        }
        let enclosed = entry.enclosed_name().is_some_and(|p| {
            p.components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        });
        if !enclosed || path.contains('\\') {
            return Err(EvidenceError::UnsafePath(path));
        }
        if !entry.is_file() {
            return Err(EvidenceError::UnexpectedEntry(path));
        }
        let size = entry.size();
        if size > limits.max_entry_bytes {
            return Err(EvidenceError::LimitExceeded(format!(
                "'{path}' declares {size} bytes, limit {}",
                limits.max_entry_bytes
            )));
        }
        if out.iter().any(|(p, _)| *p == path) {
            return Err(EvidenceError::DuplicateEntry(path));
        }

        // declared sizes are untrusted; the budget bounds what is inflated
        let budget = limits
            .max_entry_bytes
            .min(limits.max_decode_bytes.saturating_sub(decoded));
        let mut data = Vec::with_capacity(size.min(budget) as usize);
        LimitReader::new(entry, budget, "LimitDecodeBytes")
            .read_to_end(&mut data)
            .map_err(limit_aware)?;
        decoded += data.len() as u64;
        out.push((path, data));
    }
    Ok(out)
}

fn limit_aware(e: std::io::Error) -> EvidenceError {
    let message = e.to_string();
    if message.contains("LimitArchiveBytes") || message.contains("LimitDecodeBytes") {
        EvidenceError::LimitExceeded(message)
    } else {
        EvidenceError::Io(e)
    }
}
