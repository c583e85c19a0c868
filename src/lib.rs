//! Client library for browsing OPDS book catalogs.
//!
//! - [`opds`] - Fetching, decoding and paginating catalog feeds
//! - [`registry`] - The user's list of catalogs
//! - [`config`] - `config.toml` loading
//! - [`util`] - URL resolution and display text helpers

pub mod config;
pub mod opds;
pub mod registry;
pub mod util;
