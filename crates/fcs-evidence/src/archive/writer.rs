//! Deterministic archive writer.
//!
//! Same discovery and report in, same bytes out: entries are written in a
//! fixed order with the DOS epoch as modification time and fixed
//! permissions.

use super::manifest::{FileMeta, Manifest, ProducerMeta};
use super::{EvidenceError, DISCOVERY_FILE, MANIFEST_FILE, REPORT_FILE, RESULTS_DIR};
use fcs_core::discovery::Discovery;
use fcs_core::report::ExportReport;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// # Example
///
/// ```no_run
/// use fcs_evidence::EvidenceWriter;
/// # fn demo(discovery: &fcs_core::Discovery, report: &fcs_core::report::ExportReport) -> Result<(), fcs_evidence::EvidenceError> {
/// let mut buffer = Vec::new();
/// EvidenceWriter::new(&mut buffer).finish(discovery, report)?;
/// # Ok(())
/// # }
/// ```
pub struct EvidenceWriter<W: Write> {
    writer: W,
    producer: ProducerMeta,
}

impl<W: Write> EvidenceWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            producer: ProducerMeta::default(),
        }
    }

    pub fn with_producer(mut self, producer: ProducerMeta) -> Self {
        self.producer = producer;
        self
    }

    pub fn finish(
        self,
        discovery: &Discovery,
        report: &ExportReport,
    ) -> Result<Manifest, EvidenceError> {
        let mut entries: Vec<(String, Vec<u8>)> = Vec::with_capacity(report.results.len() + 2);
        entries.push((
            DISCOVERY_FILE.to_string(),
            to_json(DISCOVERY_FILE, discovery)?,
        ));
        entries.push((REPORT_FILE.to_string(), to_json(REPORT_FILE, report)?));
        for (i, result) in report.results.iter().enumerate() {
            let path = result_path(i, &result.id);
            let bytes = to_json(&path, result)?;
            entries.push((path, bytes));
        }

        let files: BTreeMap<String, FileMeta> = entries
            .iter()
            .map(|(path, data)| (path.clone(), FileMeta::of(data)))
            .collect();
        let manifest = Manifest {
            schema_version: 1,
            producer: self.producer,
            request: report.request.clone(),
            has_passed: report.has_passed,
            result_count: report.results.len(),
            files,
        };
        let manifest_bytes = to_json(MANIFEST_FILE, &manifest)?;

        // the central directory needs Seek; callers only provide Write
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        write_entry(&mut zip, MANIFEST_FILE, &manifest_bytes)?;
        for (path, data) in &entries {
            write_entry(&mut zip, path, data)?;
        }
        let bytes = zip.finish()?.into_inner();
        let mut writer = self.writer;
        writer.write_all(&bytes)?;
        writer.flush()?;

        debug!(entries = entries.len() + 1, "evidence archive written");
        Ok(manifest)
    }
}

/// `results/0001-t1001.json`; the index keeps run order and uniqueness.
pub(crate) fn result_path(index: usize, id: &str) -> String {
    let slug: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    format!("{RESULTS_DIR}{:04}-{slug}.json", index + 1)
}

fn to_json<T: serde::Serialize>(path: &str, value: &T) -> Result<Vec<u8>, EvidenceError> {
    serde_json::to_vec_pretty(value).map_err(|e| EvidenceError::json(path, e))
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

fn write_entry(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    path: &str,
    data: &[u8],
) -> Result<(), EvidenceError> {
    zip.start_file(path, entry_options())?;
    zip.write_all(data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_paths_are_ordered_and_safe() {
        assert_eq!(result_path(0, "#t1001"), "results/0001-t1001.json");
        assert_eq!(result_path(11, "../#t2002"), "results/0012-t2002.json");
    }
}
