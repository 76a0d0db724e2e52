use fcs_core::report::ExportRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Always 1 for this layout.
    pub schema_version: u32,
    pub producer: ProducerMeta,
    pub request: ExportRequest,
    pub has_passed: bool,
    pub result_count: usize,
    /// Every entry except the manifest, keyed by archive path.
    pub files: BTreeMap<String, FileMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProducerMeta {
    pub name: String,
    pub version: String,
}

impl Default for ProducerMeta {
    fn default() -> Self {
        Self {
            name: "fcs".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMeta {
    /// `sha256:<hex>`
    pub sha256: String,
    pub bytes: u64,
}

impl FileMeta {
    pub(crate) fn of(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        Self {
            sha256: format!("sha256:{}", hex::encode(Sha256::digest(data))),
            bytes: data.len() as u64,
        }
    }
}
