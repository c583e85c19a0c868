//! Atom + OPDS XML decoding.
//!
//! A small recursive-descent decoder over `quick-xml`'s namespace-aware pull
//! parser. Elements are matched on (namespace, local name), so an `<id>` from
//! a vendor namespace never lands in the Atom `id` field. Anything the decoder
//! does not recognize is skipped, which keeps catalogs with vendor extensions
//! readable.
//!
//! XXE: quick-xml (0.37) never expands `<!ENTITY>` declarations; custom
//! entities fail unescaping with an error instead of being resolved.

use std::collections::BTreeMap;
use std::io::BufRead;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use thiserror::Error;

use super::model::{Author, Category, Content, Entry, Feed, Link, Price};

const ATOM_NS: &[u8] = b"http://www.w3.org/2005/Atom";
const OPDS_NS: &[u8] = b"http://opds-spec.org/2010/catalog";
const DC_TERMS_NS: &[u8] = b"http://purl.org/dc/terms/";
const DC_ELEMENTS_NS: &[u8] = b"http://purl.org/dc/elements/1.1/";

/// Errors that can occur while decoding a catalog document.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// An attribute could not be read.
    #[error("XML attribute error: {0}")]
    Attribute(#[from] AttrError),

    /// The root element is not an Atom `<feed>`.
    #[error("document is not an Atom feed")]
    NotAFeed,

    /// The document ended inside an open element.
    #[error("unexpected end of document")]
    UnexpectedEof,

    /// A required child element or attribute is absent.
    #[error("<{element}> is missing required {field}")]
    MissingField {
        element: &'static str,
        field: &'static str,
    },

    /// An `opds:price` body is not a decimal number.
    #[error("invalid price amount: {0:?}")]
    InvalidPrice(String),
}

/// Decodes an Atom/OPDS catalog document.
///
/// # Errors
///
/// Returns [`DecodeError`] if the XML is malformed, the root is not an Atom
/// `<feed>`, or a required field is missing (`id`/`title` on the feed and on
/// entries, `href` on links, `term` on categories, `name` on authors).
///
/// # Examples
///
/// ```
/// use opds_explorer::opds::decode;
///
/// let xml = br#"<feed xmlns="http://www.w3.org/2005/Atom">
///   <id>urn:catalog</id><title>Catalog</title>
/// </feed>"#;
/// let feed = decode(xml).unwrap();
/// assert_eq!(feed.title, "Catalog");
/// assert!(feed.entries.is_empty());
/// ```
pub fn decode(bytes: &[u8]) -> Result<Feed, DecodeError> {
    let mut reader = NsReader::from_reader(bytes);
    let mut buf = Vec::new();

    loop {
        match next_node(&mut reader, &mut buf)? {
            Node::Element { tag, empty } => {
                if tag.is(Ns::Atom, "feed") {
                    return parse_feed(&mut reader, empty);
                }
                return Err(DecodeError::NotAFeed);
            }
            Node::Eof => return Err(DecodeError::NotAFeed),
            Node::Text { .. } | Node::Close(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    Atom,
    Opds,
    Dc,
    Other,
}

impl Ns {
    fn classify(resolved: &ResolveResult<'_>) -> Self {
        let ResolveResult::Bound(Namespace(ns)) = resolved else {
            return Ns::Other;
        };
        let ns: &[u8] = ns;
        if ns == ATOM_NS {
            Ns::Atom
        } else if ns == OPDS_NS {
            Ns::Opds
        } else if ns == DC_TERMS_NS || ns == DC_ELEMENTS_NS {
            Ns::Dc
        } else {
            Ns::Other
        }
    }
}

/// An opened element, detached from the reader's buffer.
struct Tag {
    ns: Ns,
    local: String,
    /// Tag content between `<` and `>` (name plus attributes), as written.
    raw: String,
    /// Non-namespace-declaration attributes, keyed by qualified name.
    attributes: Vec<(String, String)>,
}

impl Tag {
    fn is(&self, ns: Ns, local: &str) -> bool {
        self.ns == ns && self.local == local
    }

    /// Value of an unprefixed attribute.
    fn attr(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }
}

enum Node {
    Element { tag: Tag, empty: bool },
    Text { text: String, raw: String },
    Close(String),
    Eof,
}

fn next_node<R: BufRead>(reader: &mut NsReader<R>, buf: &mut Vec<u8>) -> Result<Node, DecodeError> {
    loop {
        buf.clear();
        let (resolved, event) = reader.read_resolved_event_into(buf)?;
        let ns = Ns::classify(&resolved);

        match event {
            Event::Start(e) => {
                return Ok(Node::Element {
                    tag: read_tag(reader, ns, &e)?,
                    empty: false,
                })
            }
            Event::Empty(e) => {
                return Ok(Node::Element {
                    tag: read_tag(reader, ns, &e)?,
                    empty: true,
                })
            }
            Event::End(e) => {
                return Ok(Node::Close(
                    String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ))
            }
            Event::Text(e) => {
                return Ok(Node::Text {
                    text: e.unescape()?.into_owned(),
                    raw: String::from_utf8_lossy(&e).into_owned(),
                })
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                return Ok(Node::Text {
                    raw: format!("<![CDATA[{}]]>", text),
                    text,
                });
            }
            Event::Eof => return Ok(Node::Eof),
            _ => {}
        }
    }
}

fn read_tag<R: BufRead>(
    reader: &NsReader<R>,
    ns: Ns,
    e: &BytesStart<'_>,
) -> Result<Tag, DecodeError> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let value = attr.decode_and_unescape_value(reader.decoder())?;
        attributes.push((String::from_utf8_lossy(key).into_owned(), value.into_owned()));
    }

    Ok(Tag {
        ns,
        local: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        raw: String::from_utf8_lossy(e).into_owned(),
        attributes,
    })
}

/// Consumes the rest of an element without interpreting it.
fn skip<R: BufRead>(reader: &mut NsReader<R>, empty: bool) -> Result<(), DecodeError> {
    if empty {
        return Ok(());
    }
    let mut buf = Vec::new();
    let mut depth = 0usize;
    loop {
        match next_node(reader, &mut buf)? {
            Node::Element { empty: false, .. } => depth += 1,
            Node::Close(_) if depth == 0 => return Ok(()),
            Node::Close(_) => depth -= 1,
            Node::Eof => return Err(DecodeError::UnexpectedEof),
            _ => {}
        }
    }
}

/// Collects all text inside an element (nested markup flattened), trimmed.
fn read_text<R: BufRead>(reader: &mut NsReader<R>, empty: bool) -> Result<String, DecodeError> {
    Ok(read_raw_text(reader, empty)?.trim().to_string())
}

/// Like [`read_text`] but keeps surrounding whitespace.
fn read_raw_text<R: BufRead>(
    reader: &mut NsReader<R>,
    empty: bool,
) -> Result<String, DecodeError> {
    if empty {
        return Ok(String::new());
    }
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match next_node(reader, &mut buf)? {
            Node::Element { empty: false, .. } => depth += 1,
            Node::Element { .. } => {}
            Node::Text { text: t, .. } => text.push_str(&t),
            Node::Close(_) if depth == 0 => return Ok(text),
            Node::Close(_) => depth -= 1,
            Node::Eof => return Err(DecodeError::UnexpectedEof),
        }
    }
}

/// Reads the inside of `<content>` as a fragment.
///
/// Direct text is unescaped (so `type="html"` content yields its HTML);
/// child elements are re-serialized as written, so `type="xhtml"` content
/// yields its `<div ...>` markup. `None` when the element has no content.
fn read_fragment<R: BufRead>(
    reader: &mut NsReader<R>,
    empty: bool,
) -> Result<Option<String>, DecodeError> {
    if empty {
        return Ok(None);
    }
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut depth = 0usize;
    loop {
        match next_node(reader, &mut buf)? {
            Node::Element { tag, empty: true } => {
                out.push('<');
                out.push_str(&tag.raw);
                out.push_str("/>");
            }
            Node::Element { tag, empty: false } => {
                out.push('<');
                out.push_str(&tag.raw);
                out.push('>');
                depth += 1;
            }
            Node::Text { text, raw } => {
                if depth == 0 {
                    out.push_str(&text);
                } else {
                    out.push_str(&raw);
                }
            }
            Node::Close(_) if depth == 0 => break,
            Node::Close(name) => {
                out.push_str("</");
                out.push_str(&name);
                out.push('>');
                depth -= 1;
            }
            Node::Eof => return Err(DecodeError::UnexpectedEof),
        }
    }

    if out.is_empty() {
        return Ok(None);
    }
    Ok(Some(out.trim().to_string()))
}

fn parse_feed<R: BufRead>(reader: &mut NsReader<R>, empty: bool) -> Result<Feed, DecodeError> {
    let mut id = None;
    let mut title = None;
    let mut subtitle = None;
    let mut updated = None;
    let mut icon = None;
    let mut authors = Vec::new();
    let mut links = Vec::new();
    let mut entries = Vec::new();

    if !empty {
        let mut buf = Vec::new();
        loop {
            match next_node(reader, &mut buf)? {
                Node::Element { tag, empty } => match (tag.ns, tag.local.as_str()) {
                    (Ns::Atom, "id") => id = Some(read_text(reader, empty)?),
                    (Ns::Atom, "title") => title = Some(read_text(reader, empty)?),
                    (Ns::Atom, "subtitle") => subtitle = Some(read_text(reader, empty)?),
                    (Ns::Atom, "updated") => updated = Some(read_text(reader, empty)?),
                    (Ns::Atom, "icon") => icon = Some(read_text(reader, empty)?),
                    (Ns::Atom, "author") => authors.push(parse_author(reader, &tag, empty)?),
                    (Ns::Atom, "link") => links.push(parse_link(reader, &tag, empty)?),
                    (Ns::Atom, "entry") => entries.push(parse_entry(reader, empty)?),
                    _ => skip(reader, empty)?,
                },
                Node::Close(_) => break,
                Node::Eof => return Err(DecodeError::UnexpectedEof),
                Node::Text { .. } => {}
            }
        }
    }

    tracing::trace!(entries = entries.len(), links = links.len(), "Decoded catalog feed");

    Ok(Feed {
        id: id.ok_or(DecodeError::MissingField {
            element: "feed",
            field: "id",
        })?,
        title: title.ok_or(DecodeError::MissingField {
            element: "feed",
            field: "title",
        })?,
        subtitle,
        updated,
        icon,
        authors,
        links,
        entries,
    })
}

fn parse_entry<R: BufRead>(reader: &mut NsReader<R>, empty: bool) -> Result<Entry, DecodeError> {
    let mut id = None;
    let mut title = None;
    let mut updated = None;
    let mut authors = Vec::new();
    let mut links = Vec::new();
    let mut categories = Vec::new();
    let mut summary = None;
    let mut content = None;
    let mut language = None;
    let mut issued = None;

    if !empty {
        let mut buf = Vec::new();
        loop {
            match next_node(reader, &mut buf)? {
                Node::Element { tag, empty } => match (tag.ns, tag.local.as_str()) {
                    (Ns::Atom, "id") => id = Some(read_text(reader, empty)?),
                    (Ns::Atom, "title") => title = Some(read_text(reader, empty)?),
                    (Ns::Atom, "updated") => updated = Some(read_text(reader, empty)?),
                    (Ns::Atom, "summary") => summary = Some(read_raw_text(reader, empty)?),
                    (Ns::Atom, "author") => authors.push(parse_author(reader, &tag, empty)?),
                    (Ns::Atom, "link") => links.push(parse_link(reader, &tag, empty)?),
                    (Ns::Atom, "category") => categories.push(parse_category(reader, &tag, empty)?),
                    (Ns::Atom, "content") => {
                        content = Some(Content {
                            content_type: tag.attr("type"),
                            body: read_fragment(reader, empty)?,
                        })
                    }
                    (Ns::Dc, "language") => language = Some(read_text(reader, empty)?),
                    (Ns::Dc, "issued") => issued = Some(read_text(reader, empty)?),
                    _ => skip(reader, empty)?,
                },
                Node::Close(_) => break,
                Node::Eof => return Err(DecodeError::UnexpectedEof),
                Node::Text { .. } => {}
            }
        }
    }

    Ok(Entry {
        id: id.ok_or(DecodeError::MissingField {
            element: "entry",
            field: "id",
        })?,
        title: title.ok_or(DecodeError::MissingField {
            element: "entry",
            field: "title",
        })?,
        updated,
        authors,
        links,
        categories,
        summary,
        content,
        language,
        issued,
    })
}

fn parse_author<R: BufRead>(
    reader: &mut NsReader<R>,
    tag: &Tag,
    empty: bool,
) -> Result<Author, DecodeError> {
    let mut name = None;
    let mut uri = None;

    if !empty {
        let mut buf = Vec::new();
        loop {
            match next_node(reader, &mut buf)? {
                Node::Element { tag, empty } => match (tag.ns, tag.local.as_str()) {
                    (Ns::Atom, "name") => name = Some(read_text(reader, empty)?),
                    (Ns::Atom, "uri") => uri = Some(read_text(reader, empty)?),
                    _ => skip(reader, empty)?,
                },
                Node::Close(_) => break,
                Node::Eof => return Err(DecodeError::UnexpectedEof),
                Node::Text { .. } => {}
            }
        }
    }

    Ok(Author {
        name: name.ok_or(DecodeError::MissingField {
            element: "author",
            field: "name",
        })?,
        uri,
        others: tag.attributes.iter().cloned().collect::<BTreeMap<_, _>>(),
    })
}

fn parse_link<R: BufRead>(
    reader: &mut NsReader<R>,
    tag: &Tag,
    empty: bool,
) -> Result<Link, DecodeError> {
    let href = tag.attr("href").ok_or(DecodeError::MissingField {
        element: "link",
        field: "href",
    })?;
    let mut prices: Option<Vec<Price>> = None;

    if !empty {
        let mut buf = Vec::new();
        loop {
            match next_node(reader, &mut buf)? {
                Node::Element { tag: child, empty } if child.is(Ns::Opds, "price") => {
                    let price = parse_price(reader, &child, empty)?;
                    prices.get_or_insert_with(Vec::new).push(price);
                }
                Node::Element { empty, .. } => skip(reader, empty)?,
                Node::Close(_) => break,
                Node::Eof => return Err(DecodeError::UnexpectedEof),
                Node::Text { .. } => {}
            }
        }
    }

    Ok(Link {
        rel: tag.attr("rel"),
        href,
        media_type: tag.attr("type"),
        title: tag.attr("title"),
        prices,
    })
}

fn parse_price<R: BufRead>(
    reader: &mut NsReader<R>,
    tag: &Tag,
    empty: bool,
) -> Result<Price, DecodeError> {
    let currency_code = tag.attr("currencycode").ok_or(DecodeError::MissingField {
        element: "opds:price",
        field: "currencycode",
    })?;
    let text = read_text(reader, empty)?;
    let amount = text
        .parse::<f64>()
        .map_err(|_| DecodeError::InvalidPrice(text.clone()))?;

    Ok(Price {
        currency_code,
        amount,
    })
}

fn parse_category<R: BufRead>(
    reader: &mut NsReader<R>,
    tag: &Tag,
    empty: bool,
) -> Result<Category, DecodeError> {
    skip(reader, empty)?;
    Ok(Category {
        term: tag.attr("term").ok_or(DecodeError::MissingField {
            element: "category",
            field: "term",
        })?,
        scheme: tag.attr("scheme"),
        label: tag.attr("label"),
    })
}
