//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL resolution**: Turning catalog hrefs into fetchable URLs and
//!   extracting a feed's origin for root-relative resources
//! - **Text processing**: Character-based truncation and terminal sanitizing
//!
//! # Examples
//!
//! ```
//! use opds_explorer::util::{origin_of, resolve, truncate_chars};
//! use url::Url;
//!
//! let base = Url::parse("https://example.com/opds").unwrap();
//! let url = resolve(&base, "/opds/new").unwrap();
//! assert_eq!(url.as_str(), "https://example.com/opds/new");
//!
//! assert_eq!(origin_of("https://example.com:8080/x").unwrap(), "https://example.com:8080");
//! assert_eq!(truncate_chars("Long entry summary", 4), "Long...");
//! ```

mod text;
mod urls;

pub use self::text::{strip_control_chars, truncate_chars};
pub use self::urls::{expand_root_relative, origin_of, resolve, ResolveError};
