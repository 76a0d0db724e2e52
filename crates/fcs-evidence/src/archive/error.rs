use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("archive I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Not a readable ZIP container, or the writer rejected an entry.
    #[error("zip container: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An entry is not valid JSON of the expected shape.
    #[error("invalid JSON in '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("archive is missing '{0}'")]
    MissingEntry(String),

    #[error("first entry must be 'manifest.json', found '{0}'")]
    ManifestNotFirst(String),

    #[error("unexpected entry '{0}'")]
    UnexpectedEntry(String),

    #[error("duplicate entry '{0}'")]
    DuplicateEntry(String),

    /// Absolute path or `..` component.
    #[error("unsafe entry path '{0}'")]
    UnsafePath(String),

    #[error("'{path}' does not match its manifest digest")]
    DigestMismatch { path: String },

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

impl EvidenceError {
    pub(crate) fn json(path: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
