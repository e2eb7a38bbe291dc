use std::path::Path;
use std::sync::Arc;

use reqwest_middleware::ClientWithMiddleware;
use time::OffsetDateTime;

use presign_auth::credentials::CredentialsFile;

use crate::http::transfer::{ReqwestTransport, TransferClient, DEFAULT_UPLOAD_SUCCESS_CODES};
use crate::sign::{signed_url_at, PrivateKey, SignedURLError, SignedURLOptions, UrlSigner};

pub use presign_auth;

pub struct ClientConfig {
    pub http: Option<ClientWithMiddleware>,
    pub default_google_access_id: Option<String>,
    pub default_private_key: Option<PrivateKey>,
    pub project_id: Option<String>,
    pub upload_success_codes: Vec<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http: None,
            default_google_access_id: None,
            default_private_key: None,
            project_id: None,
            upload_success_codes: DEFAULT_UPLOAD_SUCCESS_CODES.to_vec(),
        }
    }
}

impl ClientConfig {
    /// Uses the service account key for signing.
    ///
    /// The key is parsed here, a key that can not sign is reported before any URL is requested.
    pub fn with_credentials(mut self, credentials: CredentialsFile) -> Result<Self, presign_auth::error::Error> {
        credentials.validate()?;
        let private_key = PrivateKey::from_pem(&credentials.private_key)
            .map_err(|e| presign_auth::error::Error::InvalidPrivateKey(e.to_string()))?;
        self.project_id = Some(credentials.project_id);
        self.default_google_access_id = Some(credentials.client_email);
        self.default_private_key = Some(private_key);
        Ok(self)
    }

    pub async fn with_credentials_file(self, path: impl AsRef<Path>) -> Result<Self, presign_auth::error::Error> {
        let credentials = CredentialsFile::new_from_file(path).await?;
        self.with_credentials(credentials)
    }
}

#[derive(Clone)]
pub struct Client {
    default_google_access_id: Option<String>,
    default_private_key: Option<PrivateKey>,
    project_id: Option<String>,
    http: ClientWithMiddleware,
    upload_success_codes: Vec<u16>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Client {
    /// New client
    pub fn new(config: ClientConfig) -> Self {
        let http = config
            .http
            .unwrap_or_else(|| reqwest::Client::default().into());
        Self {
            default_google_access_id: config.default_google_access_id,
            default_private_key: config.default_private_key,
            project_id: config.project_id,
            http,
            upload_success_codes: config.upload_success_codes,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn default_google_access_id(&self) -> Option<&str> {
        self.default_google_access_id.as_deref()
    }

    /// Binds a bucket for signing.
    pub fn bucket(&self, name: &str) -> BucketHandle<'_> {
        BucketHandle {
            client: self,
            name: name.to_string(),
        }
    }

    /// Transfers through signed URLs, sharing this client's connection pool.
    pub fn transfer(&self) -> TransferClient {
        TransferClient::new(Arc::new(ReqwestTransport::new(self.http.clone())))
            .with_upload_success_codes(self.upload_success_codes.clone())
    }

    /// Get signed url.
    /// SignedURL returns a URL for the specified object. Signed URLs allow anyone
    /// access to a restricted resource for a limited time without needing a
    /// Google account or signing in. For more information about signed URLs, see
    /// https://cloud.google.com/storage/docs/accesscontrol#signed_urls_query_string_authentication
    ///
    /// Signing is local, the private key never leaves the process.
    ///
    /// Using the client defaults:
    /// ```
    /// use presign_storage::client::Client;
    /// use presign_storage::sign::{SignedURLOptions, SignedURLMethod};
    ///
    /// fn run(client: Client) {
    ///     let url_for_download = client.signed_url("bucket", "file.txt", None, None, SignedURLOptions::default());
    ///     let url_for_upload = client.signed_url("bucket", "file.txt", None, None, SignedURLOptions {
    ///         method: SignedURLMethod::PUT,
    ///         ..Default::default()
    ///     });
    /// }
    /// ```
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub fn signed_url(
        &self,
        bucket: &str,
        object: &str,
        google_access_id: Option<String>,
        private_key: Option<PrivateKey>,
        opts: SignedURLOptions,
    ) -> Result<String, SignedURLError> {
        // use the one from the options or the default one or error out
        let google_access_id = match google_access_id {
            Some(overwritten_gai) => overwritten_gai,
            None => self
                .default_google_access_id
                .clone()
                .ok_or(SignedURLError::InvalidOption("No default google_access_id is found"))?,
        };

        let private_key = match private_key {
            Some(overwritten_key) => overwritten_key,
            None => self
                .default_private_key
                .clone()
                .ok_or(SignedURLError::InvalidOption("No default private_key is found"))?,
        };

        signed_url_at(
            bucket,
            object,
            &google_access_id,
            &private_key,
            &opts,
            OffsetDateTime::now_utc(),
        )
    }
}

impl UrlSigner for Client {
    fn signed_url(
        &self,
        bucket: &str,
        object: &str,
        google_access_id: Option<String>,
        opts: SignedURLOptions,
    ) -> Result<String, SignedURLError> {
        Client::signed_url(self, bucket, object, google_access_id, None, opts)
    }
}

/// A bucket of a [`Client`].
pub struct BucketHandle<'a> {
    client: &'a Client,
    name: String,
}

impl BucketHandle<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signed_url(
        &self,
        object: &str,
        google_access_id: Option<String>,
        opts: SignedURLOptions,
    ) -> Result<String, SignedURLError> {
        self.client.signed_url(&self.name, object, google_access_id, None, opts)
    }
}
