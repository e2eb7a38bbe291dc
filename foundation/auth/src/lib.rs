//! # presign-auth
//!
//! Loads Google Cloud service account key files.
//!
//! The loaded [`credentials::CredentialsFile`] carries the identity email, the PEM encoded
//! private key and the project id that are needed to sign Cloud Storage URLs locally.
//!
//! ```
//! use presign_auth::credentials::CredentialsFile;
//!
//! async fn run() -> Result<(), presign_auth::error::Error> {
//!     let credentials = CredentialsFile::new_from_file("service-account.json").await?;
//!     credentials.validate()?;
//!     println!("signing as {}", credentials.client_email);
//!     Ok(())
//! }
//! ```
pub mod credentials;
pub mod error;

pub(crate) const SERVICE_ACCOUNT_KEY: &str = "service_account";
