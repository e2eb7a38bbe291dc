use std::env::VarError;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unsupported account {0}")]
    UnsupportedAccountType(String),

    #[error("failed to read credentials file {path}: {source}")]
    CredentialsIOError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    VarError(#[from] VarError),

    #[error("user home directory not found")]
    NoHomeDirectoryFound,

    #[error("Private Key is required")]
    NoPrivateKeyFound,

    #[error("Client Email is required")]
    NoClientEmailFound,

    #[error("private key can not be used for signing: {0}")]
    InvalidPrivateKey(String),
}

impl Error {
    /// Returns `true` if the credentials file itself could not be read.
    pub fn is_file_access(&self) -> bool {
        matches!(self, Error::CredentialsIOError { .. })
    }

    /// Returns `true` if the credentials file was read but its content was not a service account key.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::JsonError(_))
    }
}
