//! OPDS catalog client.
//!
//! OPDS catalogs are Atom feeds with a few extensions for books: cover
//! images, acquisition links with prices, and navigation between
//! sub-catalogs. This module fetches and decodes them:
//!
//! - [`feed_config`] - What the feed registry hands us: URL, auth, display info
//! - [`transport`] - HTTP client construction per auth policy
//! - [`decoder`] - Namespace-aware Atom/OPDS XML decoding
//! - [`client`] - `fetch_root` / `fetch_path` and the [`FetchError`] taxonomy
//! - [`pagination`] - Following `next` links and accumulating entries
//!
//! # Example
//!
//! ```ignore
//! use opds_explorer::opds::{fetch_next_page, fetch_path, FeedConfig};
//!
//! let config = FeedConfig::new("https://m.gutenberg.org/ebooks.opds/");
//! let mut feed = fetch_path(&config, "/").await?;
//! for entry in &feed.entries {
//!     println!("{} - {}", entry.title, entry.subtitle());
//! }
//!
//! // Pull in one more page of results
//! feed = fetch_next_page(&config, &feed).await?;
//! ```

pub mod client;
pub mod decoder;
pub mod feed_config;
pub mod model;
pub mod pagination;
pub mod transport;

pub use client::{fetch_path, fetch_root, ErrorKind, FetchError};
pub use decoder::{decode, DecodeError};
pub use feed_config::{AuthType, FeedConfig};
pub use model::{Author, Category, Content, Entry, Feed, Link, Price};
pub use pagination::{fetch_next_page, merge_page};
pub use transport::{build_client, Credentials, Transport};
