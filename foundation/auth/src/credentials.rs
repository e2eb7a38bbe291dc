use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

use base64::prelude::*;
use serde::Deserialize;
use tokio::fs;

use crate::error::Error;
use crate::SERVICE_ACCOUNT_KEY;

const CREDENTIALS_FILE: &str = "application_default_credentials.json";

/// A service account key file as downloaded from the Google Cloud console.
///
/// Only the service account fields are kept, every other field in the document is ignored.
#[derive(Deserialize, Clone, PartialEq)]
pub struct CredentialsFile {
    #[serde(rename(deserialize = "type"), default)]
    pub tp: Option<String>,

    pub client_email: String,
    pub private_key: String,
    pub project_id: String,

    pub private_key_id: Option<String>,
    pub client_id: Option<String>,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
}

impl Debug for CredentialsFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsFile")
            .field("tp", &self.tp)
            .field("client_email", &self.client_email)
            .field("private_key", &"[redacted]")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl CredentialsFile {
    /// Finds the credentials the same way the gcloud tooling does.
    ///
    /// `GOOGLE_APPLICATION_CREDENTIALS_JSON` (plain or base64 encoded) wins over the file named by
    /// `GOOGLE_APPLICATION_CREDENTIALS`, which wins over the gcloud well known file.
    pub async fn new() -> Result<Self, Error> {
        let credentials_json = {
            if let Ok(credentials) = Self::json_from_env().await {
                credentials
            } else {
                Self::json_from_file().await?
            }
        };

        Ok(serde_json::from_slice(credentials_json.as_slice())?)
    }

    pub async fn new_from_file(filepath: impl AsRef<Path>) -> Result<Self, Error> {
        let path = filepath.as_ref();
        let credentials_json = fs::read(path).await.map_err(|source| Error::CredentialsIOError {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::trace!("read {} bytes from {}", credentials_json.len(), path.display());
        Ok(serde_json::from_slice(credentials_json.as_slice())?)
    }

    pub async fn new_from_str(str: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(str)?)
    }

    /// Checks that the key file describes a service account able to sign.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(tp) = &self.tp {
            if tp != SERVICE_ACCOUNT_KEY {
                return Err(Error::UnsupportedAccountType(tp.clone()));
            }
        }
        if self.client_email.trim().is_empty() {
            return Err(Error::NoClientEmailFound);
        }
        if self.private_key.trim().is_empty() {
            return Err(Error::NoPrivateKeyFound);
        }
        Ok(())
    }

    async fn json_from_env() -> Result<Vec<u8>, ()> {
        let credentials = std::env::var("GOOGLE_APPLICATION_CREDENTIALS_JSON")
            .map_err(|_| ())
            .map(Vec::<u8>::from)?;

        if let Ok(decoded) = BASE64_STANDARD.decode(credentials.clone()) {
            Ok(decoded)
        } else {
            Ok(credentials)
        }
    }

    async fn json_from_file() -> Result<Vec<u8>, Error> {
        let path = match std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            Ok(s) => Ok(PathBuf::from(s)),
            Err(_e) => {
                // get well known file name
                if cfg!(target_os = "windows") {
                    let app_data = std::env::var("APPDATA")?;
                    Ok(Path::new(app_data.as_str()).join("gcloud").join(CREDENTIALS_FILE))
                } else {
                    match home::home_dir() {
                        Some(s) => Ok(s.join(".config").join("gcloud").join(CREDENTIALS_FILE)),
                        None => Err(Error::NoHomeDirectoryFound),
                    }
                }
            }
        }?;

        fs::read(&path)
            .await
            .map_err(|source| Error::CredentialsIOError { path, source })
    }
}
