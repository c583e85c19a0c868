//! The list of catalogs the user has registered.
//!
//! The catalog client never reads this directly; callers look a catalog up
//! here and pass its [`FeedConfig`] to the client. Entries are identified by
//! value equality of the whole config, so editing a catalog is "replace this
//! exact config with that one".

use crate::opds::FeedConfig;

/// Storage for registered catalogs.
pub trait FeedStore {
    /// All catalogs in display order.
    fn list(&self) -> &[FeedConfig];

    /// Appends a catalog.
    fn add(&mut self, feed: FeedConfig);

    /// Replaces every catalog equal to `old` with `new`. Returns how many
    /// were replaced.
    fn update(&mut self, old: &FeedConfig, new: FeedConfig) -> usize;

    /// Removes every catalog equal to `feed`. Returns how many were removed.
    fn remove(&mut self, feed: &FeedConfig) -> usize;

    /// Finds a catalog by title (case-insensitive) or exact URL.
    fn find(&self, title_or_url: &str) -> Option<&FeedConfig> {
        self.list()
            .iter()
            .find(|f| f.url == title_or_url || f.title.eq_ignore_ascii_case(title_or_url))
    }
}

/// In-memory [`FeedStore`], usually seeded from [`crate::config::Config`].
#[derive(Debug, Clone, Default)]
pub struct MemoryFeedStore {
    feeds: Vec<FeedConfig>,
}

impl MemoryFeedStore {
    pub fn new(feeds: Vec<FeedConfig>) -> Self {
        Self { feeds }
    }
}

impl FeedStore for MemoryFeedStore {
    fn list(&self) -> &[FeedConfig] {
        &self.feeds
    }

    fn add(&mut self, feed: FeedConfig) {
        tracing::debug!(title = %feed.title, "Added feed");
        self.feeds.push(feed);
        tracing::debug!(total = self.feeds.len(), "Feed registry updated");
    }

    fn update(&mut self, old: &FeedConfig, new: FeedConfig) -> usize {
        let mut replaced = 0;
        for feed in self.feeds.iter_mut().filter(|f| *f == old) {
            *feed = new.clone();
            replaced += 1;
        }
        tracing::debug!(
            old = %old.title,
            new = %new.title,
            replaced = replaced,
            "Updated feed"
        );
        replaced
    }

    fn remove(&mut self, feed: &FeedConfig) -> usize {
        let before = self.feeds.len();
        self.feeds.retain(|f| f != feed);
        let removed = before - self.feeds.len();
        tracing::debug!(
            title = %feed.title,
            removed = removed,
            remaining = self.feeds.len(),
            "Removed feed"
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryFeedStore {
        MemoryFeedStore::new(vec![
            FeedConfig::new("https://a.example.com/opds").with_title("Alpha"),
            FeedConfig::with_basic_auth("https://b.example.com/opds", "u", "p").with_title("Beta"),
        ])
    }

    #[test]
    fn test_add_appends() {
        let mut store = store();
        store.add(FeedConfig::new("https://c.example.com/opds").with_title("Gamma"));
        let titles: Vec<_> = store.list().iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn test_update_by_value() {
        let mut store = store();
        let old = store.list()[1].clone();
        let new = FeedConfig::with_basic_auth("https://b.example.com/opds", "u", "new-pass")
            .with_title("Beta");

        assert_eq!(store.update(&old, new.clone()), 1);
        assert_eq!(store.list()[1], new);

        // The old value no longer matches anything
        assert_eq!(store.update(&old, new), 0);
    }

    #[test]
    fn test_remove_by_value() {
        let mut store = store();
        let alpha = store.list()[0].clone();
        assert_eq!(store.remove(&alpha), 1);
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.remove(&alpha), 0);
    }

    #[test]
    fn test_remove_requires_full_equality() {
        let mut store = store();
        // Same URL and title, different password
        let lookalike =
            FeedConfig::with_basic_auth("https://b.example.com/opds", "u", "other").with_title("Beta");
        assert_eq!(store.remove(&lookalike), 0);
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn test_find_by_title_or_url() {
        let store = store();
        assert_eq!(store.find("beta").map(|f| f.url.as_str()), Some("https://b.example.com/opds"));
        assert_eq!(
            store.find("https://a.example.com/opds").map(|f| f.title.as_str()),
            Some("Alpha")
        );
        assert!(store.find("Delta").is_none());
    }
}
