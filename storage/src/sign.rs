use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use ring::{rand, signature};
use sha2::{Digest, Sha256};
use time::format_description::well_known::iso8601::{EncodedConfig, TimePrecision};
use time::format_description::well_known::{self, Iso8601};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use url::{ParseError, Url};

use crate::http::Escape;
use crate::sign::SignedURLError::InvalidOption;

static SPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());
static TAB_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\t]+").unwrap());

/// The longest lifetime V4 signing accepts.
pub const MAX_EXPIRES: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const ALGORITHM: &str = "GOOG4-RSA-SHA256";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedURLMethod {
    DELETE,
    GET,
    HEAD,
    POST,
    PUT,
}

impl SignedURLMethod {
    pub fn as_str(&self) -> &str {
        match self {
            SignedURLMethod::DELETE => "DELETE",
            SignedURLMethod::GET => "GET",
            SignedURLMethod::HEAD => "HEAD",
            SignedURLMethod::POST => "POST",
            SignedURLMethod::PUT => "PUT",
        }
    }
}

impl Display for SignedURLMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait URLStyle {
    fn host(&self, bucket: &str) -> String;
    fn path(&self, bucket: &str, object: &str) -> String;
}

const HOST: &str = "storage.googleapis.com";

/// `https://storage.googleapis.com/bucket/object`
pub struct PathStyle {}

impl URLStyle for PathStyle {
    fn host(&self, _bucket: &str) -> String {
        HOST.to_string()
    }

    fn path(&self, bucket: &str, object: &str) -> String {
        if object.is_empty() {
            return bucket.escape();
        }
        format!("{}/{}", bucket.escape(), object.escape())
    }
}

/// `https://bucket.storage.googleapis.com/object`
pub struct VirtualHostedStyle {}

impl URLStyle for VirtualHostedStyle {
    fn host(&self, bucket: &str) -> String {
        format!("{bucket}.{HOST}")
    }

    fn path(&self, _bucket: &str, object: &str) -> String {
        object.escape()
    }
}

/// `https://hostname/object`, for a CNAME bound to the bucket.
///
/// Together with [`SignedURLOptions::insecure`] this also addresses a local emulator.
pub struct BucketBoundHostname(pub String);

impl URLStyle for BucketBoundHostname {
    fn host(&self, _bucket: &str) -> String {
        self.0.clone()
    }

    fn path(&self, _bucket: &str, object: &str) -> String {
        object.escape()
    }
}

/// An RSA service account key ready to sign.
#[derive(Clone)]
pub struct PrivateKey(Arc<signature::RsaKeyPair>);

impl PrivateKey {
    /// Parses the PKCS#8 PEM document found in the `private_key` field of a service account key file.
    pub fn from_pem(pem: &str) -> Result<Self, SignedURLError> {
        let (label, document) =
            pkcs8::SecretDocument::from_pem(pem).map_err(|e| SignedURLError::CertError(e.to_string()))?;
        if label != "PRIVATE KEY" {
            return Err(SignedURLError::CertError(format!("unexpected PEM label {label}")));
        }
        let key_pair =
            signature::RsaKeyPair::from_pkcs8(document.as_bytes()).map_err(|e| SignedURLError::CertError(e.to_string()))?;
        Ok(Self(Arc::new(key_pair)))
    }

    /// RSASSA-PKCS1-v1_5 with SHA-256.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignedURLError> {
        let mut signed = vec![0; self.0.public().modulus_len()];
        self.0
            .sign(&signature::RSA_PKCS1_SHA256, &rand::SystemRandom::new(), data, &mut signed)
            .map_err(|e| SignedURLError::CertError(e.to_string()))?;
        Ok(signed)
    }

    /// The DER encoded `RSAPublicKey` matching this key.
    pub fn public_key_der(&self) -> &[u8] {
        self.0.public().as_ref()
    }
}

impl Debug for PrivateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("private_key")
    }
}

/// SignedURLOptions allows you to restrict the access to the signed URL.
pub struct SignedURLOptions {
    /// Method is the HTTP method to be used with the signed URL.
    /// Signed URLs can be used with GET, HEAD, PUT, and DELETE requests.
    /// Required.
    pub method: SignedURLMethod,

    /// Expires is the lifetime of the signed URL, counted from the signing instant.
    /// It may be no more than seven days.
    /// Required.
    pub expires: Duration,

    /// ContentType is the content type header the client must provide
    /// to use the generated signed URL.
    /// Optional.
    pub content_type: Option<String>,

    /// Headers is a list of extension headers the client must provide
    /// in order to use the generated signed URL. Each must be a string of the
    /// form "key:values", with multiple values separated by a semicolon.
    /// Optional.
    pub headers: Vec<String>,

    /// QueryParameters is a map of additional query parameters. They are part of the
    /// signature, so the client must use the same query parameters when using the URL.
    /// Optional.
    pub query_parameters: HashMap<String, Vec<String>>,

    /// MD5 is the base64 encoded MD5 checksum of the file.
    /// If provided, the client should provide the exact value on the request
    /// header in order to use the signed URL.
    /// Optional.
    pub md5: Option<String>,

    /// Style provides options for the type of URL to use. Options are
    /// PathStyle (default), BucketBoundHostname, and VirtualHostedStyle. See
    /// https://cloud.google.com/storage/docs/request-endpoints for details.
    /// Optional.
    pub style: Box<dyn URLStyle + Send + Sync>,

    /// Insecure determines whether the signed URL should use HTTPS (default) or
    /// HTTP.
    /// Optional.
    pub insecure: bool,
}

impl Default for SignedURLOptions {
    fn default() -> Self {
        Self {
            method: SignedURLMethod::GET,
            expires: Duration::from_secs(600),
            content_type: None,
            headers: vec![],
            query_parameters: Default::default(),
            md5: None,
            style: Box::new(PathStyle {}),
            insecure: false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SignedURLError {
    #[error("invalid option {0}")]
    InvalidOption(&'static str),
    #[error(transparent)]
    ParseError(#[from] ParseError),
    #[error("cert error by: {0}")]
    CertError(String),
    #[error(transparent)]
    TimeFormat(#[from] time::error::Format),
    #[error("not a signed url: {0}")]
    NotSigned(&'static str),
}

/// Something able to produce signed URLs.
pub trait UrlSigner: Send + Sync {
    /// Signs `opts.method` on `bucket`/`object`. `google_access_id` falls back to the signer's default identity.
    fn signed_url(
        &self,
        bucket: &str,
        object: &str,
        google_access_id: Option<String>,
        opts: SignedURLOptions,
    ) -> Result<String, SignedURLError>;
}

/// Builds the complete signed URL for the given signing instant.
pub fn signed_url_at(
    bucket: &str,
    object: &str,
    google_access_id: &str,
    private_key: &PrivateKey,
    opts: &SignedURLOptions,
    now: OffsetDateTime,
) -> Result<String, SignedURLError> {
    let (signed_buffer, mut builder) = create_signed_buffer(bucket, object, google_access_id, opts, now)?;
    tracing::trace!("signed_buffer={:?}", String::from_utf8_lossy(&signed_buffer));

    let signature = private_key.sign(signed_buffer.as_slice())?;
    builder
        .query_pairs_mut()
        .append_pair("X-Goog-Signature", &hex::encode(signature));
    Ok(builder.to_string())
}

/// Returns the instant after which the signed URL is refused.
pub fn signed_url_expiry(url: &str) -> Result<OffsetDateTime, SignedURLError> {
    let url = Url::parse(url)?;
    let mut date = None;
    let mut expires = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "X-Goog-Date" => date = Some(v.into_owned()),
            "X-Goog-Expires" => expires = Some(v.into_owned()),
            _ => {}
        }
    }
    let date = date.ok_or(SignedURLError::NotSigned("missing X-Goog-Date"))?;
    let expires = expires.ok_or(SignedURLError::NotSigned("missing X-Goog-Expires"))?;
    let signed_at = PrimitiveDateTime::parse(&date, format_description!("[year][month][day]T[hour][minute][second]Z"))
        .map_err(|_| SignedURLError::NotSigned("malformed X-Goog-Date"))?
        .assume_utc();
    let expires: u64 = expires
        .parse()
        .map_err(|_| SignedURLError::NotSigned("malformed X-Goog-Expires"))?;
    i64::try_from(expires)
        .ok()
        .and_then(|seconds| signed_at.checked_add(time::Duration::seconds(seconds)))
        .ok_or(SignedURLError::NotSigned("X-Goog-Expires out of range"))
}

pub(crate) fn create_signed_buffer(
    bucket: &str,
    name: &str,
    google_access_id: &str,
    opts: &SignedURLOptions,
    now: OffsetDateTime,
) -> Result<(Vec<u8>, Url), SignedURLError> {
    validate_options(google_access_id, opts)?;

    let headers = v4_sanitize_headers(&opts.headers);
    // create base url
    let host = opts.style.host(bucket);
    let mut builder = {
        let url = if opts.insecure {
            format!("http://{}", &host)
        } else {
            format!("https://{}", &host)
        };
        Url::parse(&url)
    }?;

    // create signed headers
    let signed_headers = {
        let mut header_names = extract_header_names(&headers);
        header_names.push("host");
        if opts.content_type.is_some() {
            header_names.push("content-type");
        }
        if opts.md5.is_some() {
            header_names.push("content-md5");
        }
        header_names.sort_unstable();
        header_names.join(";")
    };

    const CONFIG: EncodedConfig = well_known::iso8601::Config::DEFAULT
        .set_use_separators(false)
        .set_time_precision(TimePrecision::Second { decimal_digits: None })
        .encode();

    let now = now.to_offset(time::UtcOffset::UTC);
    let timestamp = now.format(&Iso8601::<CONFIG>)?;
    let credential_scope = format!(
        "{}/auto/storage/goog4_request",
        now.format(format_description!("[year][month][day]"))?
    );

    // canonical query parameters are sorted by name then value
    {
        let mut pairs = vec![
            ("X-Goog-Algorithm".to_string(), ALGORITHM.to_string()),
            (
                "X-Goog-Credential".to_string(),
                format!("{}/{}", google_access_id, credential_scope),
            ),
            ("X-Goog-Date".to_string(), timestamp.clone()),
            ("X-Goog-Expires".to_string(), opts.expires.as_secs().to_string()),
            ("X-Goog-SignedHeaders".to_string(), signed_headers.clone()),
        ];
        for (k, values) in &opts.query_parameters {
            for value in values {
                pairs.push((k.clone(), value.clone()));
            }
        }
        pairs.sort();
        let mut query = builder.query_pairs_mut();
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
    }
    let escaped_query = builder.query().unwrap_or_default().replace('+', "%20");
    tracing::trace!("escaped_query={}", escaped_query);

    // create header with value
    let header_with_value = {
        let mut header_with_value = vec![format!("host:{}", host)];
        header_with_value.extend_from_slice(&headers);
        if let Some(content_type) = &opts.content_type {
            header_with_value.push(format!("content-type:{}", content_type))
        }
        if let Some(md5) = &opts.md5 {
            header_with_value.push(format!("content-md5:{}", md5))
        }
        header_with_value.sort();
        header_with_value
    };
    let path = opts.style.path(bucket, name);
    builder.set_path(&path);

    // create raw buffer
    let buffer = {
        let mut buffer = format!(
            "{}\n{}\n{}\n{}\n\n{}\n",
            opts.method.as_str(),
            builder.path(),
            escaped_query,
            header_with_value.join("\n"),
            signed_headers
        )
        .into_bytes();

        // If the user provides a value for X-Goog-Content-SHA256, we must use
        // that value in the request string. If not, we use UNSIGNED-PAYLOAD.
        let sha256_header = header_with_value.iter().find_map(|h| {
            let (k, v) = h.split_once(':')?;
            (k == "x-goog-content-sha256").then_some(v)
        });
        match sha256_header {
            Some(v) => buffer.extend_from_slice(v.as_bytes()),
            None => buffer.extend_from_slice("UNSIGNED-PAYLOAD".as_bytes()),
        }
        buffer
    };
    tracing::trace!("raw_buffer={:?}", String::from_utf8_lossy(&buffer));

    // create signed buffer
    let hex_digest = hex::encode(Sha256::digest(buffer));
    let mut signed_buffer: Vec<u8> = vec![];
    signed_buffer.extend_from_slice(format!("{ALGORITHM}\n").as_bytes());
    signed_buffer.extend_from_slice(format!("{}\n", timestamp).as_bytes());
    signed_buffer.extend_from_slice(format!("{}\n", credential_scope).as_bytes());
    signed_buffer.extend_from_slice(hex_digest.as_bytes());
    Ok((signed_buffer, builder))
}

fn v4_sanitize_headers(hdrs: &[String]) -> Vec<String> {
    let mut sanitized = HashMap::<String, Vec<String>>::new();
    for hdr in hdrs {
        let Some((key, value)) = hdr.trim().split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let space_removed = SPACE_REGEX.replace_all(value.trim(), " ");
        let value = TAB_REGEX.replace_all(space_removed.as_ref(), "\t");
        if !value.is_empty() {
            sanitized.entry(key).or_default().push(value.to_string());
        }
    }
    let mut sanitized_headers = Vec::with_capacity(sanitized.len());
    for (key, value) in sanitized {
        sanitized_headers.push(format!("{}:{}", key, value.join(",")));
    }
    sanitized_headers
}

fn extract_header_names(kvs: &[String]) -> Vec<&str> {
    kvs.iter()
        .map(|header| header.split(':').next().unwrap_or_default())
        .collect()
}

fn validate_options(google_access_id: &str, opts: &SignedURLOptions) -> Result<(), SignedURLError> {
    if google_access_id.is_empty() {
        return Err(InvalidOption("storage: missing required GoogleAccessID"));
    }
    if opts.expires.is_zero() {
        return Err(InvalidOption("missing required expires option"));
    }
    if let Some(md5) = &opts.md5 {
        match BASE64_STANDARD.decode(md5) {
            Ok(v) => {
                if v.len() != 16 {
                    return Err(InvalidOption("storage: invalid MD5 checksum length"));
                }
            }
            Err(_e) => return Err(InvalidOption("storage: invalid MD5 checksum")),
        }
    }
    if opts.expires > MAX_EXPIRES {
        return Err(InvalidOption("storage: expires must be within seven days from now"));
    }
    Ok(())
}
