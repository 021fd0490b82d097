//! Error taxonomy for the GDSII codec.

use thiserror::Error;

/// Import aborted; no partial tree is ever returned.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("malformed GDSII stream: {0}")]
    Malformed(String),
    #[error("structure `{0}` references unknown structure `{1}` (SREF/AREF with no matching BGNSTR)")]
    UnknownStructure(String, String),
    #[error("structure `{name}` uses an unsupported transform (rotation/mirroring/magnification) on a child reference")]
    UnsupportedGeometry { name: String },
    #[error("failed to read GDSII stream from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    InvalidState(#[from] cellforge_core::error::InvalidState),
}

/// Export aborted before the output file is opened.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cell `{name}` has no solved position; solve() must succeed before export_gds()")]
    Unsolved { name: String },
    #[error("failed to write GDSII stream to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
