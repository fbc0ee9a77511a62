use std::path::PathBuf;

use thiserror::Error;

use crate::ids::IdentifierKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid {kind}: {value:?}")]
    Validation { kind: IdentifierKind, value: String },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Failed to extract {}: {source}", path.display())]
    Extraction {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn extraction(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Extraction {
            path: path.into(),
            source,
        }
    }

    /// Whether the error was caused by caller input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation { .. } | Error::Archive(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
