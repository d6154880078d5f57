use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed dataset: bad header, truncated stream, mismatched counts.
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// A vector does not match the dimensions of the model.
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    /// A persisted model is missing a field, has the wrong arity or holds non-finite values.
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("image error: {0}")]
    Image(String),
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
