//! Shadow Clone HTTP client.
//!
//! Async client using `reqwest`. Every authorised call carries the user's
//! credential as a Bearer token; the stream itself never sees it.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use tracing::{debug, warn};

use shadowclone_protocol::constants::{
    ARCHIVE_CONTENT_TYPE, AUTHORIZE_PATH, AWAKEN_PATH, REPORT_CONTENT_TYPE, REPORT_FORM_FIELD,
    REPORT_PATH, RETRIEVE_ALL_PATH, SEARCH_PATH,
};

use crate::types::{Credential, ReportEntry, SearchResponse, SessionToken};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Errors from the Shadow Clone client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} refused: {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("credential is not a valid header value")]
    InvalidCredential,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status of a refused call, if that is what failed.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Shadow Clone API client.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a client for the server at `server_url`.
    pub fn new(server_url: &str) -> Result<Self, ApiError> {
        let parsed = reqwest::Url::parse(server_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{server_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "{server_url}: scheme must be http or https"
            )));
        }

        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the server base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Pings the unauthenticated wake-up endpoint.
    pub async fn awaken(&self) -> Result<(), ApiError> {
        let resp = self.http.get(self.url(AWAKEN_PATH)).send().await?;
        check_status(AWAKEN_PATH, resp.status())?;
        debug!("server awake");
        Ok(())
    }

    /// Exchanges the bearer credential for a stream session token.
    pub async fn authorize(&self, credential: &Credential) -> Result<SessionToken, ApiError> {
        let resp = self
            .http
            .post(self.url(AUTHORIZE_PATH))
            .header(AUTHORIZATION, bearer(credential)?)
            .header(CONTENT_TYPE, FORM_URLENCODED)
            .send()
            .await?;
        check_status(AUTHORIZE_PATH, resp.status())?;

        let token = resp.text().await?;
        debug!(token_len = token.len(), "session token issued");
        Ok(SessionToken::new(token))
    }

    /// Downloads the report named by `identifier`.
    pub async fn fetch_report(
        &self,
        credential: &Credential,
        identifier: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let resp = self
            .http
            .post(self.url(REPORT_PATH))
            .header(AUTHORIZATION, bearer(credential)?)
            .header(ACCEPT, REPORT_CONTENT_TYPE)
            .form(&[(REPORT_FORM_FIELD, identifier)])
            .send()
            .await?;
        check_status(REPORT_PATH, resp.status())?;

        Ok(resp.bytes().await?.to_vec())
    }

    /// Lists generated reports. An empty server answer yields no entries.
    pub async fn search_reports(
        &self,
        credential: &Credential,
    ) -> Result<Vec<ReportEntry>, ApiError> {
        let resp = self
            .http
            .post(self.url(SEARCH_PATH))
            .header(AUTHORIZATION, bearer(credential)?)
            .send()
            .await?;
        check_status(SEARCH_PATH, resp.status())?;

        let body = resp.bytes().await?;
        match serde_json::from_slice::<SearchResponse>(&body) {
            Ok(parsed) => Ok(parsed.into_entries()),
            Err(e) => {
                // The server answers with an HTML snippet when nothing exists.
                debug!(error = %e, "search returned no report list");
                Ok(Vec::new())
            }
        }
    }

    /// Downloads every report as a zip archive.
    ///
    /// Returns `None` when the server has nothing to retrieve.
    pub async fn retrieve_all(&self, credential: &Credential) -> Result<Option<Vec<u8>>, ApiError> {
        let resp = self
            .http
            .post(self.url(RETRIEVE_ALL_PATH))
            .header(AUTHORIZATION, bearer(credential)?)
            .header(ACCEPT, ARCHIVE_CONTENT_TYPE)
            .send()
            .await?;
        check_status(RETRIEVE_ALL_PATH, resp.status())?;

        let is_html = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/html"));
        if is_html {
            return Ok(None);
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }
}

/// Builds the `Authorization` header value for a credential.
fn bearer(credential: &Credential) -> Result<HeaderValue, ApiError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
        .map_err(|_| ApiError::InvalidCredential)?;
    value.set_sensitive(true);
    Ok(value)
}

fn check_status(endpoint: &'static str, status: reqwest::StatusCode) -> Result<(), ApiError> {
    if status == reqwest::StatusCode::OK {
        return Ok(());
    }
    warn!(endpoint, status = status.as_u16(), "request refused");
    Err(ApiError::Status {
        endpoint,
        status: status.as_u16(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Starts a one-shot mock HTTP server. The handle resolves to the raw
    /// request it received.
    async fn mock_server(
        status: u16,
        content_type: &str,
        body: &[u8],
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let content_type = content_type.to_string();
        let body = body.to_vec();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;

            let head = format!(
                "HTTP/1.1 {status} Status\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(&body).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    /// Reads one request: headers, then `Content-Length` bytes of body.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn cred() -> Credential {
        Credential::new("user-jwt").unwrap()
    }

    #[tokio::test]
    async fn authorize_returns_token_on_200() {
        let (url, handle) = mock_server(200, "text/html", b"ws-token-123").await;

        let client = Client::new(&url).unwrap();
        let token = client.authorize(&cred()).await.unwrap();
        assert_eq!(token.expose(), "ws-token-123");

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /authorize "));
        let lower = request.to_ascii_lowercase();
        assert!(lower.contains("authorization: bearer user-jwt"));
        assert!(lower.contains("content-type: application/x-www-form-urlencoded"));
    }

    #[tokio::test]
    async fn authorize_reports_refusal_status() {
        let (url, handle) = mock_server(401, "application/json", br#"{"msg":"expired"}"#).await;

        let client = Client::new(&url).unwrap();
        let err = client.authorize(&cred()).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("401"), "{err}");

        handle.abort();
    }

    #[tokio::test]
    async fn fetch_report_posts_form_field() {
        let (url, handle) = mock_server(200, "text/csv", b"a,b\n1,2\n").await;

        let client = Client::new(&url).unwrap();
        let bytes = client
            .fetch_report(&cred(), "./reports/c1/3-quarterly.csv")
            .await
            .unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /report "));
        assert!(request.ends_with("REPORT_PATH=.%2Freports%2Fc1%2F3-quarterly.csv"));
        assert!(
            request
                .to_ascii_lowercase()
                .contains("authorization: bearer user-jwt")
        );
    }

    #[tokio::test]
    async fn fetch_report_failure_carries_its_own_status() {
        let (url, handle) = mock_server(500, "text/html", b"boom").await;

        let client = Client::new(&url).unwrap();
        let err = client.fetch_report(&cred(), "x.csv").await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status {
                endpoint: REPORT_PATH,
                status: 500
            }
        ));

        handle.abort();
    }

    #[tokio::test]
    async fn search_parses_report_list() {
        let json = br#"{"report_list":[{"NORMAL-lab.csv":"./reports/c1/NORMAL-lab.csv"}]}"#;
        let (url, handle) = mock_server(200, "application/json", json).await;

        let client = Client::new(&url).unwrap();
        let reports = client.search_reports(&cred()).await.unwrap();
        assert_eq!(
            reports,
            vec![ReportEntry {
                name: "NORMAL-lab.csv".into(),
                path: "./reports/c1/NORMAL-lab.csv".into(),
            }]
        );

        handle.abort();
    }

    #[tokio::test]
    async fn search_without_reports_is_empty() {
        let (url, handle) = mock_server(200, "text/html", b"<h1> No reports found</h1>").await;

        let client = Client::new(&url).unwrap();
        assert!(client.search_reports(&cred()).await.unwrap().is_empty());

        handle.abort();
    }

    #[tokio::test]
    async fn retrieve_all_returns_archive() {
        let (url, handle) = mock_server(200, "application/zip", b"PK\x03\x04zip").await;

        let client = Client::new(&url).unwrap();
        let archive = client.retrieve_all(&cred()).await.unwrap();
        assert_eq!(archive.as_deref(), Some(&b"PK\x03\x04zip"[..]));

        handle.abort();
    }

    #[tokio::test]
    async fn retrieve_all_html_means_nothing() {
        let (url, handle) =
            mock_server(200, "text/html; charset=utf-8", b"<h1> No reports to retrieve</h1>").await;

        let client = Client::new(&url).unwrap();
        assert!(client.retrieve_all(&cred()).await.unwrap().is_none());

        handle.abort();
    }

    #[tokio::test]
    async fn awaken_uses_get_without_auth() {
        let (url, handle) = mock_server(200, "text/html", b"").await;

        let client = Client::new(&url).unwrap();
        client.awaken().await.unwrap();

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /awaken "));
        assert!(!request.to_ascii_lowercase().contains("authorization"));
    }

    #[test]
    fn new_rejects_bad_urls() {
        assert!(matches!(
            Client::new("not a url"),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            Client::new("ftp://example.com"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn new_trims_trailing_slash() {
        let client = Client::new("https://scan.example.com/").unwrap();
        assert_eq!(client.base_url(), "https://scan.example.com");
    }

    #[test]
    fn bearer_rejects_control_characters() {
        let cred = Credential::new("bad\u{7f}value").unwrap();
        assert!(matches!(bearer(&cred), Err(ApiError::InvalidCredential)));
    }
}
