use thiserror::Error;
use url::Url;

use super::decoder::DecodeError;
use super::feed_config::FeedConfig;
use super::model::Feed;
use super::transport::build_client;
use crate::util::{resolve, ResolveError};

/// Errors that can occur while fetching a catalog feed.
///
/// Each variant belongs to exactly one [`ErrorKind`], so callers can tell
/// "fix your settings" apart from "server unreachable" and "feed unreadable".
#[derive(Debug, Error)]
pub enum FetchError {
    /// The catalog URL, or a path resolved against it, is not a valid URL
    /// on the catalog's origin
    #[error("Invalid catalog URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: ResolveError,
    },
    /// Basic auth selected without a username and password
    #[error("Username and password must be provided for basic authentication")]
    MissingCredentials,
    /// The catalog's auth type is not one the client implements
    #[error("Unsupported authentication type: {0}")]
    UnsupportedAuth(String),
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The body is not a readable catalog document
    #[error("Parse error: {0}")]
    Parse(#[from] DecodeError),
}

/// Broad classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or incomplete catalog settings; retrying will not help.
    Configuration,
    /// The server could not be reached or answered badly; may be retried.
    Network,
    /// The server answered with something that is not a usable catalog.
    Parse,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::InvalidUrl { .. }
            | FetchError::MissingCredentials
            | FetchError::UnsupportedAuth(_)
            | FetchError::ClientBuild(_) => ErrorKind::Configuration,
            FetchError::Network(_)
            | FetchError::HttpStatus(_)
            | FetchError::ResponseTooLarge
            | FetchError::IncompleteResponse { .. } => ErrorKind::Network,
            FetchError::Parse(_) => ErrorKind::Parse,
        }
    }

    /// Returns true if the same request may succeed when tried again.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::IncompleteResponse { .. } => true,
            FetchError::HttpStatus(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Parses a catalog's base URL.
pub(crate) fn base_url(config: &FeedConfig) -> Result<Url, FetchError> {
    Url::parse(&config.url).map_err(|source| FetchError::InvalidUrl {
        url: config.url.clone(),
        source: source.into(),
    })
}

/// Fetches the root feed of a catalog.
///
/// # Errors
///
/// See [`FetchError`]; configuration errors are reported before any
/// request is made.
pub async fn fetch_root(config: &FeedConfig) -> Result<Feed, FetchError> {
    let url = base_url(config)?;
    let transport = build_client(config)?;

    tracing::debug!(url = %url, "Fetching root feed");
    transport.get_feed(&url).await
}

/// Fetches a feed inside a catalog.
///
/// `path` is taken verbatim from a link href discovered while browsing.
/// `""` and `"/"` fetch the catalog root; anything else replaces the path of
/// the catalog's base URL (see [`crate::util::resolve`]). Absolute hrefs
/// are only followed on the catalog's own origin, so credentials never
/// leave it.
///
/// Makes at most one request and never retries.
pub async fn fetch_path(config: &FeedConfig, path: &str) -> Result<Feed, FetchError> {
    if path.is_empty() || path == "/" {
        return fetch_root(config).await;
    }

    let base = base_url(config)?;
    let url = resolve(&base, path).map_err(|source| FetchError::InvalidUrl {
        url: path.to_string(),
        source,
    })?;
    let transport = build_client(config)?;

    tracing::debug!(url = %url, base = %base, path = %path, "Fetching path");
    transport.get_feed(&url).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opds::feed_config::AuthType;

    #[test]
    fn test_error_kinds() {
        assert_eq!(FetchError::MissingCredentials.kind(), ErrorKind::Configuration);
        assert_eq!(
            FetchError::UnsupportedAuth("ntlm".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(FetchError::HttpStatus(503).kind(), ErrorKind::Network);
        assert_eq!(FetchError::ResponseTooLarge.kind(), ErrorKind::Network);
        assert_eq!(
            FetchError::Parse(DecodeError::NotAFeed).kind(),
            ErrorKind::Parse
        );
    }

    #[test]
    fn test_retryable() {
        assert!(FetchError::HttpStatus(502).is_retryable());
        assert!(FetchError::HttpStatus(429).is_retryable());
        assert!(!FetchError::HttpStatus(404).is_retryable());
        assert!(!FetchError::MissingCredentials.is_retryable());
        assert!(!FetchError::Parse(DecodeError::UnexpectedEof).is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_base_url_is_configuration_error() {
        let config = FeedConfig::new("not a url");
        let err = fetch_root(&config).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = fetch_path(&config, "/sub").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_foreign_href_is_configuration_error() {
        let config = FeedConfig::with_basic_auth("http://127.0.0.1:9/opds", "reader", "s3cret");
        let err = fetch_path(&config, "https://evil.example.net/steal")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::InvalidUrl {
                source: ResolveError::ForeignOrigin(_),
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_unsupported_auth_fails_before_request() {
        let mut config = FeedConfig::new("http://127.0.0.1:9/opds");
        config.auth_type = AuthType::Unsupported("oauth".to_string());
        let err = fetch_path(&config, "/sub").await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedAuth(_)));
    }
}
