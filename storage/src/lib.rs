#![allow(clippy::result_large_err)]
//! # presign-storage
//!
//! Signed URLs for Google Cloud Storage, and the plain HTTP transfers that use them.
//!
//! * [About signed URLs](https://cloud.google.com/storage/docs/access-control/signed-urls)
//! * [V4 signing process](https://cloud.google.com/storage/docs/access-control/signing-urls-manually)
//!
//! ## Quick Start
//!
//! ### Authentication
//!
//! Signing happens locally with the private key of a service account key file.
//!
//! ```
//! use presign_storage::client::{ClientConfig, Client};
//!
//! async fn run() {
//!     let config = ClientConfig::default()
//!         .with_credentials_file("service-account.json")
//!         .await
//!         .unwrap();
//!     let client = Client::new(config);
//! }
//! ```
//!
//! ### Usage
//!
//! ```
//! use std::time::Duration;
//! use presign_storage::client::Client;
//! use presign_storage::sign::{SignedURLMethod, SignedURLOptions};
//!
//! async fn run(client: Client) -> Result<(), Box<dyn std::error::Error>> {
//!     let bucket = client.bucket("bucket");
//!
//!     // Upload the file
//!     let url_for_upload = bucket.signed_url("file.png", None, SignedURLOptions {
//!         method: SignedURLMethod::PUT,
//!         expires: Duration::from_secs(3600),
//!         ..Default::default()
//!     })?;
//!     client.transfer().upload_object(&url_for_upload, "file.png", None).await?;
//!
//!     // Download the file
//!     let url_for_download = bucket.signed_url("file.png", None, SignedURLOptions::default())?;
//!     client.transfer().download_object(&url_for_download, "copy.png").await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod sign;
