//! Atom / RSS feed document parsing
//!
//! Elements are matched by local name so namespaced extensions such as
//! `media:thumbnail` and `yt:videoId` are picked up without caring about
//! the prefix a publisher chose.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::models::FeedItem;
use crate::utils::error::ParseError;
use crate::utils::{expand_template, item_id_from_entry_id, parse_timestamp};

const UNKNOWN_NAME: &str = "Unknown Channel";
const UNKNOWN_URL: &str = "Unknown URL";
const UNTITLED: &str = "No title";

/// One `<entry>` / `<item>` as found in the document, before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    /// Atom `<id>`, e.g. `yt:video:abc123`
    pub id: Option<String>,
    /// RSS `<guid>`
    pub guid: Option<String>,
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    /// First listed thumbnail
    pub thumbnail: Option<String>,
}

impl RawEntry {
    /// Stable item id: last segment of the Atom id, else guid, else `videoId`
    pub fn item_id(&self) -> Option<String> {
        self.id
            .as_deref()
            .and_then(item_id_from_entry_id)
            .or_else(|| {
                self.guid
                    .as_deref()
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
            })
            .or_else(|| {
                self.video_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
    }
}

/// A parsed feed document
#[derive(Debug, Clone, Default)]
pub struct FeedDocument {
    pub title: Option<String>,
    pub author_uri: Option<String>,
    pub alternate_link: Option<String>,
    pub first_link: Option<String>,
    pub entries: Vec<RawEntry>,
}

impl FeedDocument {
    /// Parse an Atom or RSS 2.0 document
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Xml` for malformed XML
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut doc = FeedDocument::default();
        let mut stack: Vec<String> = Vec::new();
        let mut current: Option<RawEntry> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = local_name(&e);
                    doc.open_element(&e, &name, &stack, &mut current);
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    doc.open_element(&e, &name, &stack, &mut current);
                }
                Event::End(_) => {
                    if let Some(name) = stack.pop() {
                        if is_entry(&name) {
                            if let Some(entry) = current.take() {
                                doc.entries.push(entry);
                            }
                        }
                    }
                }
                Event::Text(t) => {
                    // Unknown HTML entities are kept verbatim rather than failing the document
                    let text = match t.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&t).into_owned(),
                    };
                    doc.assign_text(text, &stack, current.as_mut());
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).trim().to_string();
                    doc.assign_text(text, &stack, current.as_mut());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(doc)
    }

    fn open_element(
        &mut self,
        e: &BytesStart<'_>,
        name: &str,
        stack: &[String],
        current: &mut Option<RawEntry>,
    ) {
        if is_entry(name) {
            if current.is_none() {
                *current = Some(RawEntry::default());
            }
            return;
        }

        match (name, current.as_mut()) {
            ("link", Some(entry)) => {
                let rel = attribute(e, "rel");
                if entry.link.is_none() && matches!(rel.as_deref(), None | Some("alternate")) {
                    entry.link = attribute(e, "href");
                }
            }
            // Takes the first listed thumbnail; no resolution comparison.
            ("thumbnail", Some(entry)) => {
                if entry.thumbnail.is_none() {
                    entry.thumbnail = attribute(e, "url");
                }
            }
            ("link", None) if parent_is_feed(stack) => {
                if let Some(href) = attribute(e, "href") {
                    if attribute(e, "rel").as_deref() == Some("alternate")
                        && self.alternate_link.is_none()
                    {
                        self.alternate_link = Some(href.clone());
                    }
                    if self.first_link.is_none() {
                        self.first_link = Some(href);
                    }
                }
            }
            _ => {}
        }
    }

    fn assign_text(&mut self, text: String, stack: &[String], current: Option<&mut RawEntry>) {
        if text.is_empty() {
            return;
        }
        let Some(name) = stack.last().map(String::as_str) else {
            return;
        };
        let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());

        match current {
            Some(entry) => {
                if !parent.is_some_and(is_entry) {
                    return;
                }
                match name {
                    "id" => entry.id = Some(text),
                    "guid" => entry.guid = Some(text),
                    "videoId" => entry.video_id = Some(text),
                    "title" => entry.title = Some(text),
                    "link" if entry.link.is_none() => entry.link = Some(text),
                    "published" | "pubDate" => entry.published = Some(text),
                    "updated" => entry.updated = Some(text),
                    _ => {}
                }
            }
            None => match name {
                "title" if matches!(parent, Some("feed" | "channel")) => {
                    if self.title.is_none() {
                        self.title = Some(text);
                    }
                }
                "uri" if parent == Some("author") => {
                    if self.author_uri.is_none() {
                        self.author_uri = Some(text);
                    }
                }
                "link" if parent == Some("channel") => {
                    if self.first_link.is_none() {
                        self.first_link = Some(text.clone());
                    }
                    if self.alternate_link.is_none() {
                        self.alternate_link = Some(text);
                    }
                }
                _ => {}
            },
        }
    }

    /// Display name of the source
    pub fn source_name(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    /// Canonical url of the source: author uri, else alternate link, else first link
    pub fn source_url(&self) -> String {
        self.author_uri
            .clone()
            .or_else(|| self.alternate_link.clone())
            .or_else(|| self.first_link.clone())
            .unwrap_or_else(|| UNKNOWN_URL.to_string())
    }

    /// Validated items in document order; entries without an id are dropped
    pub fn items(&self, item_url_template: &str) -> Vec<FeedItem> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let id = entry.item_id()?;
                let published = entry
                    .published
                    .clone()
                    .or_else(|| entry.updated.clone())
                    .unwrap_or_default();
                Some(FeedItem {
                    title: entry.title.clone().unwrap_or_else(|| UNTITLED.to_string()),
                    url: entry
                        .link
                        .clone()
                        .unwrap_or_else(|| expand_template(item_url_template, &id)),
                    published_at: parse_timestamp(&published),
                    published,
                    thumbnail: entry.thumbnail.clone(),
                    id,
                })
            })
            .collect()
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

fn is_entry(name: &str) -> bool {
    matches!(name, "entry" | "item")
}

fn parent_is_feed(stack: &[String]) -> bool {
    matches!(stack.last().map(String::as_str), Some("feed" | "channel"))
}
