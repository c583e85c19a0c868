use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use opds_explorer::config::Config;
use opds_explorer::opds::{
    fetch_next_page, fetch_path, AuthType, ErrorKind, Feed, FeedConfig, FetchError,
};
use opds_explorer::registry::{FeedStore, MemoryFeedStore};
use opds_explorer::util::strip_control_chars;

/// Get the config directory path (~/.config/opds-explorer/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("opds-explorer");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "opds-explorer", about = "Browse OPDS book catalogs from the terminal")]
struct Args {
    /// Config file to use instead of ~/.config/opds-explorer/config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered catalogs
    Feeds,

    /// Fetch a catalog feed and list its entries
    Browse {
        /// Catalog title or URL. Unregistered URLs are browsed ad hoc.
        feed: String,

        /// Href inside the catalog, as printed for navigation entries
        #[arg(default_value = "/")]
        path: String,

        /// Number of pages to accumulate (defaults to `max_pages` from config)
        #[arg(long)]
        pages: Option<u32>,

        /// Print the decoded feed as JSON
        #[arg(long)]
        json: bool,

        /// Basic auth username, overriding the registered one
        #[arg(long, requires = "password")]
        username: Option<String>,

        /// Basic auth password
        #[arg(long, requires = "username")]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let timeout = config.request_timeout();
    let default_pages = config.max_pages;
    let store = MemoryFeedStore::new(config.feeds);

    match args.command {
        Command::Feeds => list_feeds(&store),
        Command::Browse {
            feed,
            path,
            pages,
            json,
            username,
            password,
        } => {
            let mut catalog = select_feed(&store, &feed)?;
            if let (Some(username), Some(password)) = (username, password) {
                with_credentials(&mut catalog, username, password);
            }
            let pages = pages.unwrap_or(default_pages).max(1);
            browse(&catalog, &path, pages, json, timeout).await
        }
    }
}

fn list_feeds(store: &impl FeedStore) -> Result<()> {
    if store.list().is_empty() {
        println!("No catalogs registered. Add [[feeds]] entries to your config.toml.");
        return Ok(());
    }

    for feed in store.list() {
        let title = if feed.title.is_empty() { &feed.url } else { &feed.title };
        println!("{}", strip_control_chars(title));
        println!("  url:  {}", strip_control_chars(&feed.url));
        println!("  auth: {}", feed.auth_type);
        if !feed.subtitle.is_empty() {
            println!("  {}", strip_control_chars(&feed.subtitle));
        }
        let icon = feed.icon_url();
        if !icon.is_empty() {
            println!("  icon: {}", strip_control_chars(&icon));
        }
    }
    Ok(())
}

/// Looks a catalog up by title or URL, falling back to an unauthenticated
/// ad-hoc catalog when the argument is itself an http(s) URL.
fn select_feed(store: &impl FeedStore, name: &str) -> Result<FeedConfig> {
    if let Some(feed) = store.find(name) {
        return Ok(feed.clone());
    }

    match url::Url::parse(name) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            tracing::debug!(url = %name, "Browsing unregistered catalog");
            Ok(FeedConfig::new(name))
        }
        _ => anyhow::bail!(
            "No catalog named {:?}. Run `opds-explorer feeds` to list registered catalogs.",
            name
        ),
    }
}

/// Switches a catalog to Basic auth with the given credentials, keeping its
/// display settings.
fn with_credentials(catalog: &mut FeedConfig, username: String, password: String) {
    catalog.auth_type = AuthType::Basic;
    catalog.username = Some(username);
    catalog.password = Some(SecretString::from(password));
}

async fn browse(
    catalog: &FeedConfig,
    path: &str,
    pages: u32,
    json: bool,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut feed = with_deadline(timeout, fetch_path(catalog, path))
        .await
        .map_err(|e| describe(catalog, e))?;

    let mut fetched = 1;
    while fetched < pages && feed.next_page_url().is_some() {
        feed = with_deadline(timeout, fetch_next_page(catalog, &feed))
            .await
            .map_err(|e| describe(catalog, e))?;
        fetched += 1;
    }
    tracing::info!(pages = fetched, entries = feed.entries.len(), "Catalog loaded");

    if json {
        println!("{}", serde_json::to_string_pretty(&feed)?);
    } else {
        print_feed(catalog, &feed);
    }
    Ok(())
}

/// Failure of a deadline-bound fetch.
enum BrowseError {
    Fetch(FetchError),
    TimedOut(Duration),
}

async fn with_deadline<F>(timeout: Option<Duration>, fetch: F) -> Result<Feed, BrowseError>
where
    F: Future<Output = Result<Feed, FetchError>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fetch).await {
            Ok(result) => result.map_err(BrowseError::Fetch),
            Err(_) => Err(BrowseError::TimedOut(limit)),
        },
        None => fetch.await.map_err(BrowseError::Fetch),
    }
}

fn describe(catalog: &FeedConfig, err: BrowseError) -> anyhow::Error {
    let err = match err {
        BrowseError::TimedOut(limit) => {
            return anyhow::anyhow!(
                "Timed out after {}s waiting for {}",
                limit.as_secs(),
                catalog.url
            );
        }
        BrowseError::Fetch(err) => err,
    };

    let hint = match err.kind() {
        ErrorKind::Configuration => "check the catalog settings in config.toml",
        ErrorKind::Network if err.is_retryable() => "the server may be busy, try again later",
        ErrorKind::Network => "the catalog could not be reached",
        ErrorKind::Parse => "the server did not return a readable OPDS feed",
    };
    anyhow::Error::new(err).context(format!("Failed to load {} ({})", catalog.url, hint))
}

fn print_feed(catalog: &FeedConfig, feed: &Feed) {
    println!("{}", strip_control_chars(&feed.title));
    if let Some(subtitle) = &feed.subtitle {
        println!("{}", strip_control_chars(subtitle));
    }
    println!();

    for entry in &feed.entries {
        let marker = if entry.is_navigation() { ">" } else { " " };
        println!("{} {}", marker, strip_control_chars(&entry.title));

        let subtitle = entry.subtitle();
        if !subtitle.is_empty() {
            println!("    {}", strip_control_chars(&subtitle));
        }
        if let Some(href) = entry.link_url() {
            println!("    browse: {}", strip_control_chars(href));
        }
        let thumbnail = entry.thumbnail_url(&catalog.url);
        if !thumbnail.is_empty() {
            println!("    cover:  {}", strip_control_chars(&thumbnail));
        }
    }

    if let Some(next) = feed.next_page_url() {
        println!();
        println!("More entries available (next: {})", strip_control_chars(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opds_explorer::config::default_feed;
    use secrecy::ExposeSecret;

    #[test]
    fn test_credentials_override_keeps_display_settings() {
        let mut catalog = default_feed();
        with_credentials(&mut catalog, "reader".to_string(), "s3cret".to_string());

        assert_eq!(catalog.auth_type, AuthType::Basic);
        assert_eq!(catalog.username.as_deref(), Some("reader"));
        assert_eq!(
            catalog.password.as_ref().map(|p| p.expose_secret()),
            Some("s3cret")
        );
        assert_eq!(catalog.url, "https://m.gutenberg.org/ebooks.opds/");
        assert_eq!(catalog.title, "Project Gutenberg");
        assert_eq!(catalog.subtitle, "Free eBooks since 1971.");
        assert_eq!(
            catalog.icon_url(),
            "https://www.gutenberg.org/gutenberg/favicon.ico"
        );
    }

    #[test]
    fn test_select_feed_by_title_or_url() {
        let store = MemoryFeedStore::new(vec![default_feed()]);
        assert_eq!(
            select_feed(&store, "project gutenberg").unwrap().url,
            "https://m.gutenberg.org/ebooks.opds/"
        );

        let ad_hoc = select_feed(&store, "https://books.example.com/opds").unwrap();
        assert_eq!(ad_hoc.auth_type, AuthType::None);
        assert!(select_feed(&store, "Unknown").is_err());
    }
}
