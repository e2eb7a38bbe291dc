use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub mod transfer;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The local file could not be opened, created or written.
    #[error("failed to access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An error from the underlying HTTP client.
    #[error(transparent)]
    HttpClient(#[from] reqwest::Error),

    /// An error from one of the middleware used.
    #[error(transparent)]
    HttpMiddleware(anyhow::Error),

    /// The signed URL was refused or the object could not be served.
    #[error("unexpected status code {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The number of bytes received differs from the declared content length.
    #[error("downloaded {actual} bytes but the response declared {expected} bytes")]
    Integrity { expected: u64, actual: u64 },
}

impl From<reqwest_middleware::Error> for Error {
    fn from(error: reqwest_middleware::Error) -> Self {
        match error {
            reqwest_middleware::Error::Middleware(err) => Error::HttpMiddleware(err),
            reqwest_middleware::Error::Reqwest(err) => Error::HttpClient(err),
        }
    }
}

impl Error {
    pub(crate) fn file_access(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
        move |source| Error::FileAccess {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub(crate) trait Escape {
    fn escape(&self) -> String;
}

impl Escape for str {
    fn escape(&self) -> String {
        utf8_percent_encode(self, PATH_ENCODE_SET).to_string()
    }
}

// Everything but the RFC 3986 unreserved characters and the path separator.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Strips the query of a signed URL so that it can be logged without its signature.
pub(crate) fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut url) => {
            url.set_query(None);
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
