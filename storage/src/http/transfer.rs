use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest_middleware::ClientWithMiddleware;
use tokio::io::AsyncWriteExt;

use crate::http::{redact, Error};

/// Status codes accepted for a PUT through a signed URL.
pub const DEFAULT_UPLOAD_SUCCESS_CODES: [u16; 3] = [200, 201, 204];

/// Lifecycle of a single upload or download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Requesting,
    Streaming,
    Complete,
    Failed,
}

impl Display for TransferState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferState::Idle => "idle",
            TransferState::Requesting => "requesting",
            TransferState::Streaming => "streaming",
            TransferState::Complete => "complete",
            TransferState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The response of a signed URL request, body not yet consumed.
pub struct Response {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, Error>>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Collects the body as text, used to report error responses.
    pub async fn text(mut self) -> String {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(chunk) => buf.extend_from_slice(&chunk),
                Err(e) => return format!("{}", e),
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Plain HTTP access to a signed URL. The URL itself carries the authorization.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn put(&self, url: &str, body: Bytes, content_type: Option<&str>) -> Result<Response, Error>;
    async fn get(&self, url: &str) -> Result<Response, Error>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    http: ClientWithMiddleware,
}

impl ReqwestTransport {
    pub fn new(http: ClientWithMiddleware) -> Self {
        Self { http }
    }
}

fn into_response(response: reqwest::Response) -> Response {
    Response {
        status: response.status().as_u16(),
        content_length: response.content_length(),
        body: response.bytes_stream().map(|chunk| chunk.map_err(Error::from)).boxed(),
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn put(&self, url: &str, body: Bytes, content_type: Option<&str>) -> Result<Response, Error> {
        let mut builder = self.http.put(url).body(body);
        if let Some(content_type) = content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        Ok(into_response(builder.send().await?))
    }

    async fn get(&self, url: &str) -> Result<Response, Error> {
        Ok(into_response(self.http.get(url).send().await?))
    }
}

/// Uploads and downloads single objects through signed URLs.
#[derive(Clone)]
pub struct TransferClient {
    transport: Arc<dyn HttpTransport>,
    upload_success_codes: Vec<u16>,
}

impl TransferClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            upload_success_codes: DEFAULT_UPLOAD_SUCCESS_CODES.to_vec(),
        }
    }

    pub fn with_upload_success_codes(mut self, codes: Vec<u16>) -> Self {
        self.upload_success_codes = codes;
        self
    }

    /// Uploads the whole file with a PUT and returns the number of bytes sent.
    ///
    /// The file is read before any request is issued, a missing file never reaches the network.
    /// `content_type` must match the content type the URL was signed with, if any.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn upload_object(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<u64, Error> {
        let target = redact(url);
        tracing::debug!(url = %target, state = %TransferState::Idle, "upload");
        let result = self.upload(url, path.as_ref(), content_type, &target).await;
        finish("upload", &target, &result);
        result
    }

    async fn upload(&self, url: &str, path: &Path, content_type: Option<&str>, target: &str) -> Result<u64, Error> {
        let data = tokio::fs::read(path).await.map_err(Error::file_access(path))?;
        let size = data.len() as u64;

        tracing::debug!(url = %target, state = %TransferState::Requesting, size, "upload");
        let response = self.transport.put(url, Bytes::from(data), content_type).await?;
        if !self.upload_success_codes.contains(&response.status) {
            let status = response.status;
            return Err(Error::UnexpectedStatus {
                status,
                body: response.text().await,
            });
        }
        Ok(size)
    }

    /// Downloads the object into `path`, creating or truncating it, and returns the number of bytes written.
    ///
    /// When the response declares a content length that differs from the bytes written the result is
    /// [`Error::Integrity`]. The partially written file is left in place.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn download_object(&self, url: &str, path: impl AsRef<Path>) -> Result<u64, Error> {
        let target = redact(url);
        tracing::debug!(url = %target, state = %TransferState::Idle, "download");
        let result = self.download(url, path.as_ref(), &target).await;
        finish("download", &target, &result);
        result
    }

    async fn download(&self, url: &str, path: &Path, target: &str) -> Result<u64, Error> {
        tracing::debug!(url = %target, state = %TransferState::Requesting, "download");
        let response = self.transport.get(url).await?;
        if !response.is_success() {
            let status = response.status;
            return Err(Error::UnexpectedStatus {
                status,
                body: response.text().await,
            });
        }

        let expected = response.content_length;
        let mut body = response.body;
        let mut file = tokio::fs::File::create(path).await.map_err(Error::file_access(path))?;
        tracing::debug!(url = %target, state = %TransferState::Streaming, ?expected, "download");

        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    file.flush().await.map_err(Error::file_access(path))?;
                    return match expected {
                        Some(expected) if written < expected => {
                            tracing::warn!("body ended early: {}", e);
                            Err(Error::Integrity {
                                expected,
                                actual: written,
                            })
                        }
                        _ => Err(e),
                    };
                }
            };
            file.write_all(&chunk).await.map_err(Error::file_access(path))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(Error::file_access(path))?;

        match expected {
            Some(expected) if expected != written => Err(Error::Integrity {
                expected,
                actual: written,
            }),
            _ => Ok(written),
        }
    }
}

fn finish<T>(operation: &str, target: &str, result: &Result<T, Error>) {
    match result {
        Ok(_) => tracing::debug!(url = %target, state = %TransferState::Complete, "{}", operation),
        Err(e) => tracing::debug!(url = %target, state = %TransferState::Failed, error = %e, "{}", operation),
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures_util::StreamExt;

    use crate::http::transfer::{HttpTransport, Response, TransferClient, TransferState};
    use crate::http::Error;

    #[ctor::ctor]
    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    /// Answers every request with a canned response and records the calls.
    #[derive(Default)]
    struct Canned {
        status: u16,
        content_length: Option<u64>,
        chunks: Vec<&'static str>,
        fail_after_chunks: bool,
        calls: Mutex<Vec<(String, Option<String>, usize)>>,
    }

    impl Canned {
        fn response(&self) -> Response {
            let mut items: Vec<Result<Bytes, Error>> =
                self.chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
            if self.fail_after_chunks {
                items.push(Err(Error::HttpMiddleware(anyhow::anyhow!("connection reset"))));
            }
            Response {
                status: self.status,
                content_length: self.content_length,
                body: futures_util::stream::iter(items).boxed(),
            }
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for Canned {
        async fn put(&self, url: &str, body: Bytes, content_type: Option<&str>) -> Result<Response, Error> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), content_type.map(str::to_string), body.len()));
            Ok(self.response())
        }

        async fn get(&self, url: &str) -> Result<Response, Error> {
            self.calls.lock().unwrap().push((url.to_string(), None, 0));
            Ok(self.response())
        }
    }

    fn client(canned: Canned) -> (TransferClient, Arc<Canned>) {
        let canned = Arc::new(canned);
        (TransferClient::new(canned.clone()), canned)
    }

    #[tokio::test]
    async fn test_upload_accepts_documented_codes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.jpeg");
        std::fs::write(&path, b"jpeg bytes").unwrap();

        for status in [200, 201, 204] {
            let (client, canned) = client(Canned {
                status,
                ..Default::default()
            });
            let sent = client
                .upload_object("https://example.com/b/o?sig=1", &path, Some("image/jpeg"))
                .await
                .unwrap();
            assert_eq!(sent, 10);
            let calls = canned.calls.lock().unwrap();
            assert_eq!(
                calls.as_slice(),
                &[(
                    "https://example.com/b/o?sig=1".to_string(),
                    Some("image/jpeg".to_string()),
                    10
                )]
            );
        }
    }

    #[tokio::test]
    async fn test_upload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.jpeg");
        std::fs::write(&path, b"jpeg bytes").unwrap();

        let (client, _) = client(Canned {
            status: 403,
            chunks: vec!["<Error><Code>SignatureDoesNotMatch</Code></Error>"],
            ..Default::default()
        });
        match client.upload_object("https://example.com/b/o", &path, None).await {
            Err(Error::UnexpectedStatus { status, body }) => {
                assert_eq!(status, 403);
                assert!(body.contains("SignatureDoesNotMatch"));
            }
            other => panic!("unexpected result {other:?}"),
        }

        let (client, _) = self::client(Canned {
            status: 201,
            ..Default::default()
        });
        let client = client.with_upload_success_codes(vec![200]);
        assert!(matches!(
            client.upload_object("https://example.com/b/o", &path, None).await,
            Err(Error::UnexpectedStatus { status: 201, .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_missing_file_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (client, canned) = client(Canned {
            status: 200,
            ..Default::default()
        });
        let err = client
            .upload_object("https://example.com/b/o", dir.path().join("missing.jpeg"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileAccess { .. }), "{err:?}");
        assert!(canned.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_streams_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download.jpeg");
        std::fs::write(&path, b"previous content that is longer").unwrap();

        let (client, _) = client(Canned {
            status: 200,
            content_length: Some(11),
            chunks: vec!["hello", " ", "world"],
            ..Default::default()
        });
        let written = client.download_object("https://example.com/b/o", &path).await.unwrap();
        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_download_without_content_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download.jpeg");
        let (client, _) = client(Canned {
            status: 200,
            content_length: None,
            chunks: vec!["chunked"],
            ..Default::default()
        });
        assert_eq!(client.download_object("https://example.com/b/o", &path).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_download_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download.jpeg");
        let (client, _) = client(Canned {
            status: 200,
            content_length: Some(10),
            chunks: vec!["abc"],
            ..Default::default()
        });
        let err = client.download_object("https://example.com/b/o", &path).await.unwrap_err();
        assert!(
            matches!(err, Error::Integrity { expected: 10, actual: 3 }),
            "{err:?}"
        );
        // the partial file stays
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_download_connection_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download.jpeg");
        let (client, _) = client(Canned {
            status: 200,
            content_length: Some(10),
            chunks: vec!["abcd"],
            fail_after_chunks: true,
            ..Default::default()
        });
        let err = client.download_object("https://example.com/b/o", &path).await.unwrap_err();
        assert!(matches!(err, Error::Integrity { expected: 10, actual: 4 }), "{err:?}");

        let (client, _) = client_without_length();
        let err = client.download_object("https://example.com/b/o", &path).await.unwrap_err();
        assert!(matches!(err, Error::HttpMiddleware(_)), "{err:?}");
    }

    fn client_without_length() -> (TransferClient, Arc<Canned>) {
        client(Canned {
            status: 200,
            content_length: None,
            chunks: vec!["abcd"],
            fail_after_chunks: true,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_download_error_status_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download.jpeg");
        let (client, _) = client(Canned {
            status: 404,
            chunks: vec!["NoSuchKey"],
            ..Default::default()
        });
        match client.download_object("https://example.com/b/o", &path).await {
            Err(Error::UnexpectedStatus { status: 404, body }) => assert_eq!(body, "NoSuchKey"),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TransferState::Idle.to_string(), "idle");
        assert_eq!(TransferState::Streaming.to_string(), "streaming");
        assert_eq!(TransferState::Failed.to_string(), "failed");
    }
}
