use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::util::expand_root_relative;

/// Authentication scheme a catalog expects.
///
/// Unrecognized names from a configuration file are kept as
/// [`AuthType::Unsupported`] so the problem surfaces as a configuration
/// error when the catalog is fetched, not as a load failure for every feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Unsupported(String),
}

impl From<String> for AuthType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "" | "none" => AuthType::None,
            "basic" => AuthType::Basic,
            _ => AuthType::Unsupported(value),
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthType::None => f.write_str("none"),
            AuthType::Basic => f.write_str("basic"),
            AuthType::Unsupported(name) => f.write_str(name),
        }
    }
}

/// A catalog the user has registered: where it lives, how to log in, and
/// how to show it in a list.
///
/// Owned by the feed registry and handed to the client by reference.
/// The password is a [`SecretString`], so `Debug` output never shows it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Root URL of the catalog
    pub url: String,
    pub auth_type: AuthType,
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
    pub title: String,
    pub subtitle: String,
    /// Icon shown next to the catalog; may be root-relative
    pub image_url: String,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl FeedConfig {
    /// A catalog that needs no authentication.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// A catalog behind HTTP Basic authentication.
    pub fn with_basic_auth(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            auth_type: AuthType::Basic,
            username: Some(username.into()),
            password: Some(SecretString::from(password.into())),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// The catalog's icon URL, `""` if none. Root-relative values are
    /// expanded against the catalog's origin.
    pub fn icon_url(&self) -> String {
        if self.image_url.is_empty() {
            return String::new();
        }
        expand_root_relative(&self.url, &self.image_url)
    }

    /// `Authorization` header value for Basic catalogs.
    ///
    /// Lets image loaders fetch thumbnails with the same credentials as the
    /// catalog itself. `None` for catalogs without usable Basic credentials.
    pub fn authorization_header(&self) -> Option<String> {
        if self.auth_type != AuthType::Basic {
            return None;
        }
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        let password = self
            .password
            .as_ref()
            .map(|p| p.expose_secret())
            .filter(|p| !p.is_empty())?;
        Some(format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", username, password))
        ))
    }
}

/// Value equality over every field, secrets included; the registry keys
/// feeds this way.
impl PartialEq for FeedConfig {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.auth_type == other.auth_type
            && self.username == other.username
            && self.password.as_ref().map(|p| p.expose_secret())
                == other.password.as_ref().map(|p| p.expose_secret())
            && self.title == other.title
            && self.subtitle == other.subtitle
            && self.image_url == other.image_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_type_from_config_string() {
        assert_eq!(AuthType::from("none".to_string()), AuthType::None);
        assert_eq!(AuthType::from("BASIC".to_string()), AuthType::Basic);
        assert_eq!(
            AuthType::from("digest".to_string()),
            AuthType::Unsupported("digest".to_string())
        );
    }

    #[test]
    fn test_icon_url() {
        let mut feed = FeedConfig::new("https://www.example.com:8443/opds/");
        assert_eq!(feed.icon_url(), "");

        feed.image_url = "/favicon.ico".to_string();
        assert_eq!(feed.icon_url(), "https://www.example.com:8443/favicon.ico");

        feed.image_url = "https://cdn.example.com/icon.png".to_string();
        assert_eq!(feed.icon_url(), "https://cdn.example.com/icon.png");
    }

    #[test]
    fn test_authorization_header() {
        let feed = FeedConfig::with_basic_auth("https://x/opds", "Aladdin", "open sesame");
        assert_eq!(
            feed.authorization_header().as_deref(),
            Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
        );

        assert_eq!(FeedConfig::new("https://x/opds").authorization_header(), None);
        let empty = FeedConfig::with_basic_auth("https://x/opds", "user", "");
        assert_eq!(empty.authorization_header(), None);
    }

    #[test]
    fn test_equality_includes_password() {
        let a = FeedConfig::with_basic_auth("https://x/opds", "u", "p1");
        let b = FeedConfig::with_basic_auth("https://x/opds", "u", "p2");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_debug_redacts_password() {
        let feed = FeedConfig::with_basic_auth("https://x/opds", "u", "hunter2");
        assert!(!format!("{:?}", feed).contains("hunter2"));
    }
}
