//! Single-candidate fetcher.
//!
//! Downloads one URL to one destination path. Redirects are followed in an
//! explicit bounded loop instead of by the HTTP client, so the hop limit and
//! the `TooManyRedirects` outcome are observable. The body is streamed into
//! `{dest}.part` and renamed into place only after the stream completes, so
//! `dest` never holds a truncated file.
//!
//! Every non-success outcome removes both the partial file and any stale
//! file already sitting at `dest`.

use crate::config::USER_AGENT;
use crate::error::{ProbeError, ProbeResult};
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

/// Terminal result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Body written to `path`.
    Success {
        path: PathBuf,
        bytes: u64,
        final_url: String,
        redirects: u32,
    },
    /// Non-2xx, non-followed status.
    HttpError { status: u16 },
    /// Transport failure: DNS, refused connection, timeout, dropped stream.
    NetworkError { cause: String },
    /// More than `limit` redirects in a row.
    TooManyRedirects { limit: u32 },
    /// 2xx with a zero-length body.
    EmptyBody,
    /// The response arrived but could not be written locally.
    WriteFailed { cause: String },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short label for progress output.
    pub fn summary(&self) -> String {
        match self {
            Self::Success { bytes, .. } => format!("ok ({bytes} bytes)"),
            Self::HttpError { status } => format!("HTTP {status}"),
            Self::NetworkError { cause } => format!("network error: {cause}"),
            Self::TooManyRedirects { limit } => format!("more than {limit} redirects"),
            Self::EmptyBody => "empty body".to_string(),
            Self::WriteFailed { cause } => format!("write failed: {cause}"),
        }
    }
}

/// HTTP fetcher with manual redirect handling.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_redirects: u32,
}

impl Fetcher {
    /// Build a fetcher. `timeout_ms` of `None` keeps the transport default.
    pub fn new(max_redirects: u32, timeout_ms: Option<u64>) -> ProbeResult<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT);
        if let Some(ms) = timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| ProbeError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_redirects,
        })
    }

    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    /// Fetch `url` into `dest`.
    pub async fn fetch(&self, url: &str, dest: &Path) -> FetchOutcome {
        let outcome = self.fetch_inner(url, dest).await;
        if !outcome.is_success() {
            cleanup(dest).await;
        }
        outcome
    }

    async fn fetch_inner(&self, url: &str, dest: &Path) -> FetchOutcome {
        let mut current = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                return FetchOutcome::NetworkError {
                    cause: format!("invalid url {url:?}: {e}"),
                }
            }
        };
        let mut hops = 0u32;

        loop {
            let resp = match self.client.get(current.clone()).send().await {
                Ok(r) => r,
                Err(e) => {
                    return FetchOutcome::NetworkError {
                        cause: e.to_string(),
                    }
                }
            };
            let status = resp.status();

            if is_followed_redirect(status) {
                let Some(location) = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                else {
                    return FetchOutcome::HttpError {
                        status: status.as_u16(),
                    };
                };
                if hops >= self.max_redirects {
                    return FetchOutcome::TooManyRedirects {
                        limit: self.max_redirects,
                    };
                }
                let next = match current.join(location) {
                    Ok(u) => u,
                    Err(e) => {
                        return FetchOutcome::NetworkError {
                            cause: format!("bad redirect location {location:?}: {e}"),
                        }
                    }
                };
                debug!(from = %current, to = %next, status = status.as_u16(), "following redirect");
                current = next;
                hops += 1;
                continue;
            }

            if !status.is_success() {
                return FetchOutcome::HttpError {
                    status: status.as_u16(),
                };
            }

            return stream_to_file(resp, dest, current.to_string(), hops).await;
        }
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

async fn stream_to_file(
    mut resp: reqwest::Response,
    dest: &Path,
    final_url: String,
    redirects: u32,
) -> FetchOutcome {
    let write_failed = |e: std::io::Error| FetchOutcome::WriteFailed {
        cause: e.to_string(),
    };

    if let Some(parent) = dest.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return write_failed(e);
        }
    }

    let part = part_path(dest);
    let mut file = match tokio::fs::File::create(&part).await {
        Ok(f) => f,
        Err(e) => return write_failed(e),
    };

    let mut bytes = 0u64;
    loop {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = file.write_all(&chunk).await {
                    return write_failed(e);
                }
                bytes += chunk.len() as u64;
            }
            Ok(None) => break,
            Err(e) => {
                return FetchOutcome::NetworkError {
                    cause: e.to_string(),
                }
            }
        }
    }

    if let Err(e) = file.flush().await {
        return write_failed(e);
    }
    drop(file);

    if bytes == 0 {
        return FetchOutcome::EmptyBody;
    }

    if let Err(e) = tokio::fs::rename(&part, dest).await {
        return write_failed(e);
    }

    FetchOutcome::Success {
        path: dest.to_path_buf(),
        bytes,
        final_url,
        redirects,
    }
}

/// `{dest}.part`, the in-progress download path.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_owned();
    s.push(".part");
    PathBuf::from(s)
}

/// Remove the partial download and whatever sits at `dest`.
async fn cleanup(dest: &Path) {
    for path in [part_path(dest), dest.to_path_buf()] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "removed leftover file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %path.display(), "cleanup failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    fn fetcher() -> Fetcher {
        Fetcher::new(5, Some(5_000)).unwrap()
    }

    #[tokio::test]
    async fn test_success_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/cars/mg3-blue.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(JPEG),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mg3-blue.jpg");
        let url = format!("{}/images/cars/mg3-blue.jpg", server.uri());

        let outcome = fetcher().fetch(&url, &dest).await;
        assert!(outcome.is_success(), "{outcome:?}");
        assert_eq!(std::fs::read(&dest).unwrap(), JPEG);
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_404_leaves_no_file() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("gone.jpg");
        // A stale file from an earlier run must not survive a failed attempt.
        std::fs::write(&dest, b"stale").unwrap();

        let outcome = fetcher()
            .fetch(&format!("{}/gone.jpg", server.uri()), &dest)
            .await;
        assert_eq!(outcome, FetchOutcome::HttpError { status: 404 });
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_relative_redirect_followed() {
        let server = MockServer::start().await;
        Mock::given(path("/old.jpg"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/new/real.jpg"))
            .mount(&server)
            .await;
        Mock::given(path("/new/real.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("car.jpg");
        match fetcher()
            .fetch(&format!("{}/old.jpg", server.uri()), &dest)
            .await
        {
            FetchOutcome::Success {
                redirects,
                final_url,
                bytes,
                ..
            } => {
                assert_eq!(redirects, 1);
                assert!(final_url.ends_with("/new/real.jpg"));
                assert_eq!(bytes, JPEG.len() as u64);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redirect_loop_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(path("/loop.jpg"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/loop.jpg"))
            .expect(4)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("loop.jpg");
        let outcome = Fetcher::new(3, None)
            .unwrap()
            .fetch(&format!("{}/loop.jpg", server.uri()), &dest)
            .await;
        assert_eq!(outcome, FetchOutcome::TooManyRedirects { limit: 3 });
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_redirect_without_location_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(path("/nowhere.jpg"))
            .respond_with(ResponseTemplate::new(302))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let outcome = fetcher()
            .fetch(
                &format!("{}/nowhere.jpg", server.uri()),
                &dir.path().join("x.jpg"),
            )
            .await;
        assert_eq!(outcome, FetchOutcome::HttpError { status: 302 });
    }

    #[tokio::test]
    async fn test_empty_body_is_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/empty.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("empty.jpg");
        let outcome = fetcher()
            .fetch(&format!("{}/empty.jpg", server.uri()), &dest)
            .await;
        assert_eq!(outcome, FetchOutcome::EmptyBody);
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop a listener to get a port with nothing behind it.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.jpg");
        let outcome = fetcher()
            .fetch(&format!("http://127.0.0.1:{port}/x.jpg"), &dest)
            .await;
        assert!(matches!(outcome, FetchOutcome::NetworkError { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_invalid_url_is_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = fetcher().fetch("not a url", &dir.path().join("x.jpg")).await;
        assert!(matches!(outcome, FetchOutcome::NetworkError { .. }));
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/tmp/a.jpg")),
            PathBuf::from("/tmp/a.jpg.part")
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&FetchOutcome::HttpError { status: 404 }).unwrap();
        assert_eq!(json, r#"{"outcome":"http_error","status":404}"#);
    }
}
