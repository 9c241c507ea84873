//! Best-effort RSS 2.0 item extraction.
//!
//! Only broken XML fails the whole feed. Items missing fields still come back,
//! with those fields left as `None` for the mapper to judge. Text with an
//! entity XML does not define (`&nbsp;` and friends) is kept as written.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use super::model::FeedEntry;
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid,
    PubDate,
    Summary,
    Content,
    Creator,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"guid" => Some(Field::Guid),
            b"pubDate" => Some(Field::PubDate),
            b"description" => Some(Field::Summary),
            b"content:encoded" => Some(Field::Content),
            b"dc:creator" => Some(Field::Creator),
            _ => None,
        }
    }
}

/// Parse all `<item>` elements of an RSS document in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries: Vec<FeedEntry> = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SyncError::Transport(format!("malformed feed XML: {e}")))?;
        match event {
            Event::Start(start) => {
                let name = start.name();
                if name.as_ref() == b"item" {
                    current = Some(FeedEntry::default());
                } else if let Some(entry) = current.as_mut() {
                    if is_media(name.as_ref()) {
                        take_media_url(entry, &start);
                    }
                    if let Some(f) = Field::from_tag(name.as_ref()) {
                        field = Some(f);
                        text.clear();
                    }
                }
            }
            Event::Empty(empty) => {
                if let Some(entry) = current.as_mut() {
                    if is_media(empty.name().as_ref()) {
                        take_media_url(entry, &empty);
                    }
                }
            }
            Event::Text(t) => {
                if field.is_some() {
                    match t.unescape() {
                        Ok(value) => text.push_str(&value),
                        Err(err) => {
                            debug!(?field, error = %err, "keeping feed text unescaped");
                            text.push_str(&String::from_utf8_lossy(&t));
                        }
                    }
                }
            }
            Event::CData(data) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(end) => {
                let name = end.name();
                if name.as_ref() == b"item" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    field = None;
                } else if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    if Field::from_tag(name.as_ref()) == Some(f) {
                        assign(entry, f, std::mem::take(&mut text));
                        field = None;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

fn is_media(name: &[u8]) -> bool {
    name == b"media:content" || name == b"media:thumbnail"
}

fn take_media_url(entry: &mut FeedEntry, element: &BytesStart<'_>) {
    if entry.media_url.is_some() {
        return;
    }
    entry.media_url = element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"url")
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
        .filter(|value| !value.is_empty());
}

fn assign(entry: &mut FeedEntry, field: Field, value: String) {
    let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
    let slot = match field {
        Field::Title => &mut entry.title,
        Field::Link => &mut entry.link,
        Field::Guid => &mut entry.guid,
        Field::PubDate => &mut entry.pub_date,
        Field::Summary => &mut entry.summary,
        Field::Content => &mut entry.content,
        Field::Creator => &mut entry.creator,
    };
    // First occurrence wins.
    if slot.is_none() {
        *slot = value;
    }
}
