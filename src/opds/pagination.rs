use percent_encoding::percent_decode_str;

use super::client::{fetch_path, FetchError};
use super::feed_config::FeedConfig;
use super::model::Feed;

/// Fetches the page after `current` and appends its entries.
///
/// Returns a new [`Feed`] that keeps `current`'s identity and metadata (id,
/// title, subtitle, updated, authors, icon), takes its links from the newly
/// fetched page, and lists `current`'s entries followed by the new page's
/// entries. Calling this again on the result fetches the page after that;
/// the chain ends when the returned feed no longer has a `next` link.
///
/// When `current` has no (or an empty) `next` link this is not an error:
/// a copy of `current` is returned and nothing is fetched.
///
/// The `next` href is percent-decoded once before being resolved and
/// fetched.
///
/// # Errors
///
/// Any [`FetchError`] from fetching the next page. `current` is never
/// modified, so a failed call leaves the caller's accumulated feed intact.
pub async fn fetch_next_page(config: &FeedConfig, current: &Feed) -> Result<Feed, FetchError> {
    let next = match current.next_page_url() {
        Some(next) if !next.is_empty() => next,
        _ => {
            tracing::debug!(
                page = current.self_page().unwrap_or_default(),
                "No next page to fetch"
            );
            return Ok(current.clone());
        }
    };

    let decoded = percent_decode_str(next).decode_utf8_lossy();
    tracing::debug!(next = %decoded, entries = current.entries.len(), "Fetching next page");

    let page = fetch_path(config, &decoded).await?;
    Ok(merge_page(current, page))
}

/// Appends `page` onto `current`, keeping `current`'s metadata and taking
/// `page`'s links. Entries are neither reordered nor deduplicated.
pub fn merge_page(current: &Feed, page: Feed) -> Feed {
    let mut entries = Vec::with_capacity(current.entries.len() + page.entries.len());
    entries.extend(current.entries.iter().cloned());
    entries.extend(page.entries);

    Feed {
        id: current.id.clone(),
        title: current.title.clone(),
        subtitle: current.subtitle.clone(),
        updated: current.updated.clone(),
        icon: current.icon.clone(),
        authors: current.authors.clone(),
        links: page.links,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opds::model::{Entry, Link};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn entry(id: &str) -> Entry {
        Entry {
            id: id.to_string(),
            title: id.to_string(),
            updated: None,
            authors: Vec::new(),
            links: Vec::new(),
            categories: Vec::new(),
            summary: None,
            content: None,
            language: None,
            issued: None,
        }
    }

    fn feed(id: &str, entries: Vec<Entry>, next: Option<&str>) -> Feed {
        Feed {
            id: id.to_string(),
            title: format!("{} title", id),
            subtitle: Some("sub".to_string()),
            updated: Some("2024-01-01T00:00:00Z".to_string()),
            icon: Some("/icon.png".to_string()),
            authors: Vec::new(),
            links: next
                .map(|href| {
                    vec![Link {
                        rel: Some("next".to_string()),
                        href: href.to_string(),
                        media_type: None,
                        title: None,
                        prices: None,
                    }]
                })
                .unwrap_or_default(),
            entries,
        }
    }

    #[test]
    fn test_merge_keeps_metadata_and_takes_new_links() {
        let first = feed("page-1", vec![entry("a"), entry("b")], Some("/p2"));
        let second = feed("page-2", vec![entry("c")], Some("/p3"));

        let merged = merge_page(&first, second);

        assert_eq!(merged.id, "page-1");
        assert_eq!(merged.title, "page-1 title");
        assert_eq!(merged.next_page_url(), Some("/p3"));
        let ids: Vec<_> = merged.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        // Input untouched
        assert_eq!(first.entries.len(), 2);
    }

    #[test]
    fn test_merge_does_not_dedup() {
        let first = feed("f", vec![entry("a")], Some("/p2"));
        let second = feed("f", vec![entry("a")], None);
        let merged = merge_page(&first, second);
        assert_eq!(merged.entries.len(), 2);
        assert_eq!(merged.next_page_url(), None);
    }

    #[tokio::test]
    async fn test_no_next_link_returns_input() {
        let config = FeedConfig::new("https://example.com/opds");
        let current = feed("f", vec![entry("a")], None);
        let result = fetch_next_page(&config, &current).await.unwrap();
        assert_eq!(result, current);
    }

    #[tokio::test]
    async fn test_empty_next_link_returns_input() {
        let config = FeedConfig::new("https://example.com/opds");
        let current = feed("f", vec![entry("a")], Some(""));
        let result = fetch_next_page(&config, &current).await.unwrap();
        assert_eq!(result, current);
    }

    proptest! {
        #[test]
        fn prop_merge_concatenates(first_len in 0usize..20, second_len in 0usize..20) {
            let first: Vec<Entry> = (0..first_len).map(|i| entry(&format!("a{}", i))).collect();
            let second: Vec<Entry> = (0..second_len).map(|i| entry(&format!("b{}", i))).collect();
            let current = feed("f", first.clone(), Some("/next"));
            let merged = merge_page(&current, feed("g", second.clone(), None));

            prop_assert_eq!(merged.entries.len(), first_len + second_len);
            prop_assert_eq!(&merged.entries[..first_len], &first[..]);
            prop_assert_eq!(&merged.entries[first_len..], &second[..]);
        }
    }
}
