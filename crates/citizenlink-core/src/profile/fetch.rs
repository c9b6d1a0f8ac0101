//! HTTPS retrieval of citizen dossier pages.

use std::error::Error as StdError;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::ProfileConfig;
use crate::error::{Error, Result};

/// Path of a citizen dossier relative to the site root.
const CITIZEN_PATH_PREFIX: &str = "/en/citizens/";

/// Profile fetch failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server's certificate chain did not validate.
    #[error("TLS certificate validation failed: {0}")]
    Tls(String),

    #[error("profile request timed out")]
    Timeout,

    #[error("profile page returned HTTP {status}")]
    Status { status: u16 },

    #[error("profile request failed: {0}")]
    Request(String),
}

/// Source of profile page HTML.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Fetch the raw HTML of `handle`'s profile page.
    async fn fetch(&self, handle: &str) -> std::result::Result<String, FetchError>;
}

/// Fetches dossier pages with reqwest over certificate-validated TLS.
#[derive(Debug, Clone)]
pub struct HttpProfileFetcher {
    http: reqwest::Client,
    base_url: String,
}

impl HttpProfileFetcher {
    /// Build a fetcher from profile settings.
    ///
    /// Certificates from `ca_bundle` are trusted in addition to the platform
    /// roots.
    pub fn new(config: &ProfileConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(Error::Config("profile.base_url is empty".into()));
        }

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("citizenlink/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &config.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| {
                Error::Config(format!("Failed to read CA bundle {}: {e}", path.display()))
            })?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
                Error::Config(format!("Failed to parse CA bundle {}: {e}", path.display()))
            })?;
            debug!(path = %path.display(), count = certs.len(), "Loaded CA bundle");
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let http = builder
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    /// Dossier URL for `handle`.
    pub fn profile_url(&self, handle: &str) -> String {
        format!("{}{CITIZEN_PATH_PREFIX}{handle}", self.base_url)
    }
}

#[async_trait]
impl ProfileFetcher for HttpProfileFetcher {
    async fn fetch(&self, handle: &str) -> std::result::Result<String, FetchError> {
        let url = self.profile_url(handle);
        debug!(%url, "Fetching profile page");

        let resp = self.http.get(&url).send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    if let Some(tls) = find_tls_error(&err) {
        return FetchError::Tls(tls.to_string());
    }
    FetchError::Request(error_chain(&err))
}

/// Locate a rustls error anywhere in the source chain.
///
/// hyper surfaces handshake failures as `io::Error` wrapping the rustls
/// error, and `io::Error::source` skips the wrapped value, so both are
/// checked.
fn find_tls_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a rustls::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return Some(tls);
        }
        if let Some(tls) = e
            .downcast_ref::<std::io::Error>()
            .and_then(std::io::Error::get_ref)
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            return Some(tls);
        }
        current = e.source();
    }
    None
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });
        addr
    }

    fn fetcher_for(addr: SocketAddr, timeout_secs: u64) -> HttpProfileFetcher {
        let config = ProfileConfig {
            base_url: format!("http://{addr}/"),
            timeout_secs,
            ..ProfileConfig::default()
        };
        HttpProfileFetcher::new(&config).unwrap()
    }

    #[test]
    fn profile_url_embeds_handle() {
        let fetcher = HttpProfileFetcher::new(&ProfileConfig::default()).unwrap();
        assert_eq!(
            fetcher.profile_url("Space_Trucker"),
            "https://robertsspaceindustries.com/en/citizens/Space_Trucker"
        );
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let config = ProfileConfig {
            base_url: String::new(),
            ..ProfileConfig::default()
        };
        assert!(matches!(
            HttpProfileFetcher::new(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_ca_bundle_is_config_error() {
        let config = ProfileConfig {
            ca_bundle: Some("/nonexistent/cacert.pem".into()),
            ..ProfileConfig::default()
        };
        assert!(matches!(
            HttpProfileFetcher::new(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn tls_error_found_behind_io_error() {
        let tls = rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer);
        let io = std::io::Error::other(tls);
        let found = find_tls_error(&io).expect("tls error");
        assert!(matches!(found, rustls::Error::InvalidCertificate(_)));
    }

    #[test]
    fn plain_io_error_is_not_tls() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(find_tls_error(&io).is_none());
    }

    #[tokio::test]
    async fn fetches_page_body() {
        let app = Router::new().route(
            "/en/citizens/{handle}",
            get(|axum::extract::Path(handle): axum::extract::Path<String>| async move {
                format!(r#"<div class="bio"><div class="value">hi {handle}</div></div>"#)
            }),
        );
        let fetcher = fetcher_for(serve(app).await, 5);

        let html = fetcher.fetch("Pilot").await.unwrap();
        assert!(html.contains("hi Pilot"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let app = Router::new().route(
            "/en/citizens/{handle}",
            get(|| async { (StatusCode::NOT_FOUND, "no such citizen") }),
        );
        let fetcher = fetcher_for(serve(app).await, 5);

        let err = fetcher.fetch("Ghost").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404 }));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let app = Router::new().route(
            "/en/citizens/{handle}",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "too late"
            }),
        );
        let fetcher = fetcher_for(serve(app).await, 1);

        let err = fetcher.fetch("Sloth").await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout), "got {err}");
    }

    #[tokio::test]
    async fn connection_refused_is_request_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let fetcher = fetcher_for(addr, 5);

        let err = fetcher.fetch("Nobody").await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_)), "got {err}");
    }
}
