//! # presign
//!
//! Uploads a local file to a Cloud Storage bucket through a V4 signed PUT URL and downloads it
//! back through a signed GET URL.
//!
//! The object is named with a random UUID so that concurrent runs never address the same object.
use std::path::PathBuf;
use std::time::Duration;

use time::OffsetDateTime;

use presign_auth::credentials::CredentialsFile;
use presign_storage::client::{Client, ClientConfig};
use presign_storage::http::transfer::TransferClient;
use presign_storage::sign::{signed_url_expiry, SignedURLError, SignedURLMethod, SignedURLOptions, UrlSigner, MAX_EXPIRES};

pub mod args;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Auth(#[from] presign_auth::error::Error),

    #[error(transparent)]
    Sign(#[from] SignedURLError),

    #[error(transparent)]
    Transfer(#[from] presign_storage::http::Error),
}

/// Everything a run needs. Populated from the command line and the environment by [`args::Args`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Service account key file. `None` searches the gcloud locations.
    pub credentials: Option<PathBuf>,
    pub bucket: String,
    pub upload_file: PathBuf,
    pub download_file: PathBuf,
    /// Lifetime of both signed URLs.
    pub expires: Duration,
    /// Appended to the generated object name.
    pub extension: String,
    /// Content type bound into the upload URL and sent with the upload.
    pub content_type: Option<String>,
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        if self.bucket.trim().is_empty() {
            return Err(Error::InvalidConfig("bucket must not be empty".to_string()));
        }
        if self.expires.is_zero() || self.expires > MAX_EXPIRES {
            return Err(Error::InvalidConfig(format!(
                "expires must be between 1s and {}, got {}",
                humantime::format_duration(MAX_EXPIRES),
                humantime::format_duration(self.expires)
            )));
        }
        Ok(())
    }
}

/// What a successful run did.
#[derive(Clone, Debug)]
pub struct Report {
    pub object: String,
    pub uploaded: u64,
    pub downloaded: u64,
    pub upload_url_expires_at: OffsetDateTime,
    pub download_url_expires_at: OffsetDateTime,
}

/// A fresh object name: a UUID v4 followed by `extension`.
pub fn object_name(extension: &str) -> String {
    let id = uuid::Uuid::new_v4();
    match extension {
        "" => id.to_string(),
        ext if ext.starts_with('.') => format!("{id}{ext}"),
        ext => format!("{id}.{ext}"),
    }
}

/// Loads the credentials, builds the client and performs the round trip.
///
/// Nothing touches the network before the credentials are loaded and the key is known to sign.
pub async fn run(config: &Config) -> Result<Report, Error> {
    config.validate()?;

    let credentials = match &config.credentials {
        Some(path) => CredentialsFile::new_from_file(path).await?,
        None => CredentialsFile::new().await?,
    };
    tracing::info!("read credentials complete");

    let signing_identity = credentials.client_email.clone();
    let client = Client::new(ClientConfig::default().with_credentials(credentials)?);
    tracing::info!(
        project_id = client.project_id().unwrap_or_default(),
        "created storage client"
    );

    round_trip(config, &signing_identity, &client, &client.transfer()).await
}

/// Signs and uploads, then signs and downloads, the same freshly named object.
pub async fn round_trip<S: UrlSigner + ?Sized>(
    config: &Config,
    signing_identity: &str,
    signer: &S,
    transfer: &TransferClient,
) -> Result<Report, Error> {
    let object = object_name(&config.extension);

    let upload_url = signer.signed_url(
        &config.bucket,
        &object,
        Some(signing_identity.to_string()),
        SignedURLOptions {
            method: SignedURLMethod::PUT,
            expires: config.expires,
            content_type: config.content_type.clone(),
            ..Default::default()
        },
    )?;
    let upload_url_expires_at = signed_url_expiry(&upload_url)?;
    tracing::info!(%upload_url_expires_at, "upload url generated");
    tracing::debug!("upload url: {}", upload_url);

    let uploaded = transfer
        .upload_object(&upload_url, &config.upload_file, config.content_type.as_deref())
        .await?;
    tracing::info!(object = %object, bytes = uploaded, "document uploaded successfully");

    let download_url = signer.signed_url(
        &config.bucket,
        &object,
        None,
        SignedURLOptions {
            method: SignedURLMethod::GET,
            expires: config.expires,
            ..Default::default()
        },
    )?;
    let download_url_expires_at = signed_url_expiry(&download_url)?;
    tracing::info!(%download_url_expires_at, "download url generated");
    tracing::debug!("download url: {}", download_url);

    let downloaded = transfer.download_object(&download_url, &config.download_file).await?;
    tracing::info!(object = %object, bytes = downloaded, "document downloaded successfully");

    Ok(Report {
        object,
        uploaded,
        downloaded,
        upload_url_expires_at,
        download_url_expires_at,
    })
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{object_name, Config, Error};

    fn config() -> Config {
        Config {
            credentials: None,
            bucket: "bucket".to_string(),
            upload_file: "upload.jpeg".into(),
            download_file: "download.jpeg".into(),
            expires: Duration::from_secs(3600),
            extension: ".jpeg".to_string(),
            content_type: None,
        }
    }

    #[test]
    fn test_object_name() {
        let name = object_name(".jpeg");
        assert!(name.ends_with(".jpeg"));
        assert!(uuid::Uuid::parse_str(name.trim_end_matches(".jpeg")).is_ok());
        assert_ne!(object_name(".jpeg"), name);

        assert!(object_name("png").ends_with(".png"));
        assert!(uuid::Uuid::parse_str(&object_name("")).is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());

        let mut c = config();
        c.bucket = " ".to_string();
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));

        let mut c = config();
        c.expires = Duration::from_secs(3_600_000);
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));

        let mut c = config();
        c.expires = Duration::ZERO;
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));
    }
}
