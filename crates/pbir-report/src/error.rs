use std::io;
use std::path::{Path, PathBuf};

use pbir_fs::JsonFileError;

use crate::mapping::MappingError;

#[derive(Debug, thiserror::Error)]
pub enum PbirError {
    #[error("`{path}` is not a PBIR report folder (no `definition` directory)")]
    NotAReport { path: PathBuf },
    #[error(transparent)]
    Json(#[from] JsonFileError),
    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("unknown filter sort order `{0}` (expected Ascending, Descending, SelectedFilterTop or Custom)")]
    InvalidSortOrder(String),
    #[error("unknown {kind} `{value}` (expected one of: {expected})")]
    UnknownValue {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("invalid configuration `{path}`: {message}")]
    Config { path: PathBuf, message: String },
}

pub type Result<T, E = PbirError> = std::result::Result<T, E>;

impl PbirError {
    pub(crate) fn io(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> PbirError {
        let path = path.as_ref().to_path_buf();
        move |source| PbirError::Io { path, source }
    }
}
