use std::borrow::Cow;

use thiserror::Error;
use url::Url;

/// Why an href could not be turned into a fetchable catalog URL.
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error(transparent)]
    Parse(#[from] url::ParseError),
    /// An absolute href pointing at a different scheme, host or port than
    /// the catalog. Following it would send catalog credentials elsewhere.
    #[error("{0} is outside the catalog's origin")]
    ForeignOrigin(String),
}

/// Resolves a catalog path or link href against a feed's base URL.
///
/// Catalog navigation hands us hrefs taken verbatim from the feed being
/// browsed. These are almost always root-relative (`/catalog/new`), so the
/// href *replaces* the base URL's path wholesale: only the scheme and
/// authority (userinfo, host, port) of `base` are kept. There is no `../`
/// style joining against the existing path, which means a sibling-relative
/// href such as `page2.xml` resolves against the server root, not against
/// the directory of the current feed.
///
/// # Rules
///
/// - `""` or `"/"` → `base` unchanged (the catalog root)
/// - an absolute `http(s)://` href on the same scheme, host and port as
///   `base` → its path and query, treated like a root-relative href
/// - an absolute `http(s)://` href anywhere else → [`ResolveError::ForeignOrigin`]
/// - anything else → `scheme://authority` + href (a leading `/` is added when
///   missing); a query string inside the href becomes the URL's query
///
/// # Errors
///
/// [`ResolveError::Parse`] if the combined URL cannot be parsed, or with
/// [`url::ParseError::EmptyHost`] if `base` has no host to borrow.
///
/// # Examples
///
/// ```
/// use opds_explorer::util::resolve;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/catalog/root.xml").unwrap();
/// let url = resolve(&base, "/catalog/new?page=2").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/catalog/new?page=2");
///
/// assert!(resolve(&base, "https://elsewhere.example.net/feed").is_err());
/// ```
pub fn resolve(base: &Url, path: &str) -> Result<Url, ResolveError> {
    if path.is_empty() || path == "/" {
        return Ok(base.clone());
    }

    let path = match Url::parse(path) {
        Ok(absolute) if matches!(absolute.scheme(), "http" | "https") => {
            if !same_origin(base, &absolute) {
                return Err(ResolveError::ForeignOrigin(absolute.to_string()));
            }
            let mut local = absolute.path().to_string();
            if let Some(query) = absolute.query() {
                local.push('?');
                local.push_str(query);
            }
            Cow::Owned(local)
        }
        _ => Cow::Borrowed(path),
    };

    let host = base.host_str().ok_or(url::ParseError::EmptyHost)?;

    let mut target = format!("{}://", base.scheme());
    if !base.username().is_empty() {
        target.push_str(base.username());
        if let Some(password) = base.password() {
            target.push(':');
            target.push_str(password);
        }
        target.push('@');
    }
    target.push_str(host);
    if let Some(port) = base.port() {
        target.push_str(&format!(":{}", port));
    }
    if !path.starts_with('/') {
        target.push('/');
    }
    target.push_str(&path);

    Ok(Url::parse(&target)?)
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Returns the origin of a URL as `scheme://host[:port]`.
///
/// The port is omitted when it is unset or is the scheme's default port
/// (the `url` crate already normalizes default ports away).
///
/// # Examples
///
/// ```
/// use opds_explorer::util::origin_of;
///
/// assert_eq!(origin_of("https://example.com:8080/x").unwrap(), "https://example.com:8080");
/// assert_eq!(origin_of("https://example.com:443/x").unwrap(), "https://example.com");
/// ```
pub fn origin_of(url: &str) -> Result<String, url::ParseError> {
    let parsed = Url::parse(url)?;
    let host = parsed.host_str().ok_or(url::ParseError::EmptyHost)?;
    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Expands a root-relative resource href (`/covers/1.jpg`) against the
/// origin of `base_url`. Other hrefs are returned unchanged, as are
/// root-relative ones when `base_url` has no usable origin.
pub fn expand_root_relative(base_url: &str, href: &str) -> String {
    if !href.starts_with('/') {
        return href.to_string();
    }
    match origin_of(base_url) {
        Ok(origin) => format!("{}{}", origin, href),
        Err(e) => {
            tracing::debug!(base = %base_url, href = %href, error = %e, "Cannot expand root-relative href");
            href.to_string()
        }
    }
}
