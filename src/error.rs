use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum LinaError {
    #[error("private key must be 97 bytes (raw X9.63 ECDSA-P256), got {actual} bytes")]
    InvalidKeySize { actual: usize },
    #[error("invalid ECDSA-P256 key format (needs raw X9.63 ECDSA-P256): {0}")]
    InvalidKeyFormat(String),
    #[error("failed to sign archive")]
    SigningFailed,
    #[error("invalid archive: {0}")]
    InvalidArchive(String),
    #[error("unsupported AEA profile: {0}")]
    UnsupportedProfile(u32),
    #[error("failed to extract archive: {0}")]
    ExtractionFailed(String),
    #[error("could not read {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("wrong key or corrupted archive")]
    AuthenticationFailed,
    #[error("invalid input: {0}")]
    InvalidFormat(String),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, LinaError>;

impl LinaError {
    pub fn title(&self) -> &'static str {
        match self {
            LinaError::InvalidKeySize { .. } | LinaError::InvalidKeyFormat(_) => "Invalid Key",
            _ => "Error",
        }
    }

    pub(crate) fn read_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LinaError::ReadFailed {
            path: path.into(),
            source,
        }
    }
}
