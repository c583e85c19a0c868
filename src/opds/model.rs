//! Catalog data model produced by the decoder.
//!
//! Every value here is created while decoding one response body and is
//! read-only afterwards. Derived views (thumbnail, navigation target,
//! display subtitle) are computed on demand from an [`Entry`] and, where
//! needed, the base URL of the feed it came from.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::util::{expand_root_relative, truncate_chars};

/// Link relation for the full-size cover image
pub const REL_IMAGE: &str = "http://opds-spec.org/image";
/// Link relation for a thumbnail-sized cover image
pub const REL_THUMBNAIL: &str = "http://opds-spec.org/image/thumbnail";
/// Link relation for a cover image (older catalogs)
pub const REL_COVER: &str = "http://opds-spec.org/image/cover";
/// Link relation pointing into a sub-catalog
pub const REL_SUBSECTION: &str = "subsection";
/// Atom pagination relation
pub const REL_NEXT: &str = "next";
/// Atom self relation
pub const REL_SELF: &str = "self";
/// Media type of an OPDS navigation/acquisition feed
pub const OPDS_CATALOG_TYPE: &str = "application/atom+xml;profile=opds-catalog";

/// Maximum characters in a display subtitle before it is truncated
const SUBTITLE_MAX_CHARS: usize = 50;

/// Thumbnail relations in priority order
const THUMBNAIL_RELS: [&str; 3] = [REL_THUMBNAIL, REL_IMAGE, REL_COVER];

/// A decoded OPDS catalog document (Atom `<feed>`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feed {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub updated: Option<String>,
    pub icon: Option<String>,
    pub authors: Vec<Author>,
    pub links: Vec<Link>,
    /// Entries in document order, which is also display order.
    pub entries: Vec<Entry>,
}

impl Feed {
    /// Returns the href of the first link with the given relation.
    pub fn link_with_rel(&self, rel: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel.as_deref() == Some(rel))
            .map(|l| l.href.as_str())
    }

    /// Href of the next page of this feed, if the catalog paginates.
    pub fn next_page_url(&self) -> Option<&str> {
        self.link_with_rel(REL_NEXT)
    }

    /// Href this feed reports for itself.
    pub fn self_page(&self) -> Option<&str> {
        self.link_with_rel(REL_SELF)
    }
}

/// A single catalog item: either a navigation entry pointing at another
/// feed, or a leaf publication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub updated: Option<String>,
    pub authors: Vec<Author>,
    pub links: Vec<Link>,
    pub categories: Vec<Category>,
    pub summary: Option<String>,
    pub content: Option<Content>,
    /// `dc:language`
    pub language: Option<String>,
    /// `dc:issued`
    pub issued: Option<String>,
}

impl Entry {
    /// URL of the entry's cover thumbnail, or `""` when it has none.
    ///
    /// Picks the first link with relation `image/thumbnail`, then `image`,
    /// then `image/cover`. Root-relative hrefs are expanded against the
    /// origin of `base_url`.
    pub fn thumbnail_url(&self, base_url: &str) -> String {
        let link = THUMBNAIL_RELS
            .iter()
            .find_map(|rel| self.links.iter().find(|l| l.rel.as_deref() == Some(*rel)));

        match link {
            Some(link) if !link.href.is_empty() => expand_root_relative(base_url, &link.href),
            _ => String::new(),
        }
    }

    /// Href of the sub-catalog this entry navigates into, returned verbatim.
    ///
    /// `None` means the entry is a leaf item.
    pub fn link_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| {
                l.rel.as_deref() == Some(REL_SUBSECTION)
                    || l.media_type.as_deref() == Some(OPDS_CATALOG_TYPE)
            })
            .map(|l| l.href.as_str())
    }

    pub fn is_navigation(&self) -> bool {
        self.link_url().is_some()
    }

    /// One-line description for list display.
    ///
    /// Fallback chain:
    /// 1. non-empty summary
    /// 2. content starting with `<div` (XHTML markup) → author names
    /// 3. content text, or author names when there is no content text
    ///
    /// The result is cut to 50 characters plus `"..."`.
    pub fn subtitle(&self) -> String {
        let mut subtitle = self.summary.clone().unwrap_or_default();

        if subtitle.is_empty() {
            subtitle = match self.content.as_ref().and_then(|c| c.body.as_deref()) {
                Some(body) if body.starts_with("<div") => self.author_names(),
                Some(body) => body.to_string(),
                None => self.author_names(),
            };
        }

        truncate_chars(&subtitle, SUBTITLE_MAX_CHARS).into_owned()
    }

    /// Author names joined with `", "`.
    pub fn author_names(&self) -> String {
        self.authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `updated` parsed as an RFC 3339 timestamp, when it is one.
    pub fn updated_at(&self) -> Option<DateTime<FixedOffset>> {
        self.updated
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
    }
}

/// An entry's `<content>` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    /// The `type` attribute (`text`, `html`, `xhtml`, or a media type)
    pub content_type: Option<String>,
    /// Inner text for text/html content, or the serialized child markup
    /// for xhtml content.
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub rel: Option<String>,
    pub href: String,
    pub media_type: Option<String>,
    pub title: Option<String>,
    /// `opds:price` children, if any were present.
    pub prices: Option<Vec<Price>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Price {
    pub currency_code: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Author {
    pub name: String,
    pub uri: Option<String>,
    /// Attributes on `<author>` the decoder does not interpret, keyed by
    /// qualified name.
    pub others: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub scheme: Option<String>,
    pub term: String,
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn link(rel: &str, href: &str) -> Link {
        Link {
            rel: Some(rel.to_string()),
            href: href.to_string(),
            media_type: None,
            title: None,
            prices: None,
        }
    }

    fn author(name: &str) -> Author {
        Author {
            name: name.to_string(),
            uri: None,
            others: BTreeMap::new(),
        }
    }

    fn entry() -> Entry {
        Entry {
            id: "urn:entry:1".to_string(),
            title: "Entry".to_string(),
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

    fn content(body: &str) -> Option<Content> {
        Some(Content {
            content_type: Some("html".to_string()),
            body: Some(body.to_string()),
        })
    }

    #[test]
    fn test_thumbnail_priority() {
        let mut e = entry();
        e.links = vec![
            link(REL_COVER, "https://x/cover.jpg"),
            link(REL_IMAGE, "https://x/image.jpg"),
            link(REL_THUMBNAIL, "https://x/thumb.jpg"),
        ];
        assert_eq!(e.thumbnail_url("https://x/opds"), "https://x/thumb.jpg");

        e.links.pop();
        assert_eq!(e.thumbnail_url("https://x/opds"), "https://x/image.jpg");

        e.links.pop();
        assert_eq!(e.thumbnail_url("https://x/opds"), "https://x/cover.jpg");
    }

    #[test]
    fn test_thumbnail_expands_root_relative() {
        let mut e = entry();
        e.links = vec![link(REL_IMAGE, "/covers/1.jpg")];
        assert_eq!(
            e.thumbnail_url("https://books.example.com:8080/opds/root.xml"),
            "https://books.example.com:8080/covers/1.jpg"
        );
    }

    #[test]
    fn test_thumbnail_empty_cases() {
        let mut e = entry();
        assert_eq!(e.thumbnail_url("https://x/"), "");

        e.links = vec![link(REL_THUMBNAIL, "")];
        assert_eq!(e.thumbnail_url("https://x/"), "");

        e.links = vec![link("alternate", "/book.html")];
        assert_eq!(e.thumbnail_url("https://x/"), "");
    }

    #[test]
    fn test_link_url_by_rel_or_type() {
        let mut e = entry();
        assert_eq!(e.link_url(), None);
        assert!(!e.is_navigation());

        e.links = vec![link(REL_SUBSECTION, "/catalog/sub")];
        assert_eq!(e.link_url(), Some("/catalog/sub"));

        let mut typed = link("related", "/catalog/typed");
        typed.media_type = Some(OPDS_CATALOG_TYPE.to_string());
        e.links = vec![link(REL_IMAGE, "/c.jpg"), typed];
        assert_eq!(e.link_url(), Some("/catalog/typed"));
    }

    #[test]
    fn test_subtitle_prefers_summary() {
        let mut e = entry();
        e.summary = Some("A summary".to_string());
        e.content = content("Content text");
        e.authors = vec![author("Jane Austen")];
        assert_eq!(e.subtitle(), "A summary");
    }

    #[test]
    fn test_subtitle_div_content_uses_authors() {
        let mut e = entry();
        e.summary = Some(String::new());
        e.content = content("<div xmlns=\"http://www.w3.org/1999/xhtml\">Body</div>");
        e.authors = vec![author("Jane Austen"), author("Charlotte Brontë")];
        assert_eq!(e.subtitle(), "Jane Austen, Charlotte Brontë");
    }

    #[test]
    fn test_subtitle_uses_content_text() {
        let mut e = entry();
        e.content = content("Plain description");
        e.authors = vec![author("Jane Austen")];
        assert_eq!(e.subtitle(), "Plain description");
    }

    #[test]
    fn test_subtitle_falls_back_to_authors() {
        let mut e = entry();
        e.authors = vec![author("Mary Shelley")];
        assert_eq!(e.subtitle(), "Mary Shelley");

        e.content = Some(Content {
            content_type: Some("text".to_string()),
            body: None,
        });
        assert_eq!(e.subtitle(), "Mary Shelley");
    }

    #[test]
    fn test_subtitle_empty_content_text_is_kept() {
        let mut e = entry();
        e.content = content("");
        e.authors = vec![author("Mary Shelley")];
        assert_eq!(e.subtitle(), "");
    }

    #[test]
    fn test_subtitle_empty_when_nothing_available() {
        assert_eq!(entry().subtitle(), "");
    }

    #[test]
    fn test_subtitle_truncation_boundary() {
        let mut e = entry();
        let fifty = "a".repeat(50);
        e.summary = Some(fifty.clone());
        assert_eq!(e.subtitle(), fifty);

        e.summary = Some("b".repeat(51));
        assert_eq!(e.subtitle(), format!("{}...", "b".repeat(50)));
    }

    #[test]
    fn test_feed_link_helpers() {
        let feed = Feed {
            id: "urn:feed".to_string(),
            title: "Feed".to_string(),
            subtitle: None,
            updated: None,
            icon: None,
            authors: Vec::new(),
            links: vec![link(REL_SELF, "/opds?page=1"), link(REL_NEXT, "/opds?page=2")],
            entries: Vec::new(),
        };
        assert_eq!(feed.next_page_url(), Some("/opds?page=2"));
        assert_eq!(feed.self_page(), Some("/opds?page=1"));
        assert_eq!(feed.link_with_rel("up"), None);
    }

    #[test]
    fn test_updated_at_parses_rfc3339() {
        let mut e = entry();
        e.updated = Some("2024-03-01T12:00:00Z".to_string());
        assert!(e.updated_at().is_some());

        e.updated = Some("last tuesday".to_string());
        assert!(e.updated_at().is_none());
    }
}
