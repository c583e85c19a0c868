use std::sync::OnceLock;

use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::client::FetchError;
use super::decoder::decode;
use super::feed_config::{AuthType, FeedConfig};
use super::model::Feed;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Media types catalogs are served with, most specific first.
const ACCEPT_FEED: &str = "application/atom+xml, application/xml;q=0.9, text/xml;q=0.8";

const USER_AGENT: &str = concat!("opds-explorer/", env!("CARGO_PKG_VERSION"));

/// Client for catalogs without authentication. Stateless, so one instance
/// is shared by every unauthenticated feed.
static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Credentials attached to every request a [`Transport`] sends.
#[derive(Debug, Clone)]
pub enum Credentials {
    None,
    Basic {
        username: String,
        password: SecretString,
    },
}

/// An HTTP client configured for one catalog's authentication policy.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    credentials: Credentials,
}

/// Builds the transport for a catalog.
///
/// This is the single place auth policy is decided:
///
/// - [`AuthType::None`] → the shared unauthenticated client
/// - [`AuthType::Basic`] → a dedicated client that sends
///   `Authorization: Basic ...` with every request, not only after a 401
///
/// # Errors
///
/// - [`FetchError::MissingCredentials`] if Basic auth is selected and the
///   username or password is missing or empty
/// - [`FetchError::UnsupportedAuth`] for any other auth type
/// - [`FetchError::ClientBuild`] if the TLS backend cannot be initialized
///
/// None of these touch the network.
pub fn build_client(config: &FeedConfig) -> Result<Transport, FetchError> {
    match &config.auth_type {
        AuthType::None => Ok(Transport {
            client: shared_client()?,
            credentials: Credentials::None,
        }),
        AuthType::Basic => {
            let username = config
                .username
                .as_deref()
                .filter(|u| !u.is_empty())
                .ok_or(FetchError::MissingCredentials)?;
            let password = config
                .password
                .as_ref()
                .filter(|p| !p.expose_secret().is_empty())
                .ok_or(FetchError::MissingCredentials)?;

            Ok(Transport {
                client: client_builder().build().map_err(FetchError::ClientBuild)?,
                credentials: Credentials::Basic {
                    username: username.to_string(),
                    password: password.clone(),
                },
            })
        }
        AuthType::Unsupported(name) => Err(FetchError::UnsupportedAuth(name.clone())),
    }
}

fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder().user_agent(USER_AGENT)
}

fn shared_client() -> Result<reqwest::Client, FetchError> {
    if let Some(client) = SHARED_CLIENT.get() {
        return Ok(client.clone());
    }
    let client = client_builder().build().map_err(FetchError::ClientBuild)?;
    // A concurrent initializer may win; both clients are equivalent.
    Ok(SHARED_CLIENT.get_or_init(|| client).clone())
}

impl Transport {
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// GETs `url` and decodes the body as a catalog feed.
    ///
    /// The body is read completely (bounded to 10MB) and the response is
    /// released before decoding starts. Exactly one request is made.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - connection, TLS or body read failure
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`]
    /// - [`FetchError::Parse`] - the body is not a valid catalog document
    pub async fn get_feed(&self, url: &Url) -> Result<Feed, FetchError> {
        let mut request = self.client.get(url.clone()).header(ACCEPT, ACCEPT_FEED);
        if let Credentials::Basic { username, password } = &self.credentials {
            request = request.basic_auth(username, Some(password.expose_secret()));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "Catalog request failed");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !is_feed_content_type(&content_type) {
            tracing::debug!(
                url = %url,
                content_type = %content_type,
                "Unexpected content type for catalog, decoding anyway"
            );
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        let feed = decode(&bytes)?;

        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            entries = feed.entries.len(),
            "Fetched catalog feed"
        );
        Ok(feed)
    }
}

/// Atom, generic XML, or unspecified.
fn is_feed_content_type(content_type: &str) -> bool {
    content_type.is_empty()
        || content_type.contains("application/atom+xml")
        || content_type.contains("application/xml")
        || content_type.contains("text/xml")
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let declared = response.content_length();
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(FetchError::ResponseTooLarge);
    }
    collect_body(response.bytes_stream(), declared, limit).await
}

/// Drains a body stream into memory, enforcing `limit` and checking the
/// total against the declared `Content-Length`.
async fn collect_body<S, B>(
    stream: S,
    declared: Option<u64>,
    limit: usize,
) -> Result<Vec<u8>, FetchError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    futures::pin_mut!(stream);

    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        if body.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        body.extend_from_slice(chunk);
    }

    match declared {
        Some(expected) if (body.len() as u64) < expected => Err(FetchError::IncompleteResponse {
            expected,
            received: body.len(),
        }),
        _ => Ok(body),
    }
}
