use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

pub const METADATA_CONTENT_TYPE: &str = "application/atom+xml";

const KIND_SCHEME: &str = "http://schemas.google.com/g/2005#kind";
const PARENT_REL: &str = "http://schemas.google.com/docs/2007#parent";

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("document does not contain an entry")]
    MissingEntry,
}

impl EntryError {
    /// True when the body itself could not be read as XML, as opposed to a
    /// well-formed document that is not an entry.
    pub fn is_malformed(&self) -> bool {
        matches!(self, EntryError::Malformed(_))
    }
}

/// Request body for folder creation and for the first leg of an upload.
pub fn metadata_document(kind: &str, name: &str) -> String {
    format!(
        "<?xml version='1.0' encoding='UTF-8'?>\n\
         <entry xmlns=\"http://www.w3.org/2005/Atom\" xmlns:docs=\"http://schemas.google.com/docs/2007\">\
         <category scheme=\"{KIND_SCHEME}\" term=\"http://schemas.google.com/docs/2007#{kind}\"/>\
         <title>{}</title>\
         </entry>",
        escape(name)
    )
}

/// The server's view of a resource, read from an Atom `<entry>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub filename: String,
    pub kind: String,
    pub resource_id: String,
    pub etag: String,
    pub self_href: String,
    pub content_src: String,
    pub parent_hrefs: Vec<String>,
    pub mtime: Option<OffsetDateTime>,
    pub md5: Option<String>,
    pub is_editable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Title,
    Filename,
    ResourceId,
    Updated,
    Md5,
}

impl Entry {
    pub fn parse(body: &[u8]) -> Result<Self, EntryError> {
        let mut reader = Reader::from_reader(body);
        let mut entry: Option<Entry> = None;
        let mut depth = 0usize;
        // Depth of the <entry> element once found.
        let mut entry_depth = None;
        let mut capture: Option<(TextField, String)> = None;
        let mut seen_root = false;

        loop {
            match reader.read_event().map_err(malformed)? {
                Event::Start(start) => {
                    depth += 1;
                    seen_root = true;
                    match entry_depth {
                        None if start.local_name().as_ref() == b"entry" => {
                            entry = Some(Entry {
                                etag: attribute(&start, "gd:etag")?.unwrap_or_default(),
                                ..Entry::default()
                            });
                            entry_depth = Some(depth);
                        }
                        Some(level) if depth == level + 1 => {
                            if let Some(found) = entry.as_mut() {
                                found.apply_element(&start)?;
                            }
                            capture = text_field(start.local_name().as_ref())
                                .map(|field| (field, String::new()));
                        }
                        _ => {}
                    }
                }
                Event::Empty(start) => {
                    seen_root = true;
                    if let (Some(level), Some(found)) = (entry_depth, entry.as_mut())
                        && depth == level
                    {
                        found.apply_element(&start)?;
                    }
                }
                Event::Text(text) => {
                    if let Some((_, buffer)) = capture.as_mut() {
                        buffer.push_str(&text.unescape().map_err(malformed)?);
                    }
                }
                Event::CData(data) => {
                    if let Some((_, buffer)) = capture.as_mut() {
                        buffer.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::End(_) => {
                    if let (Some((field, value)), Some(found)) = (capture.take(), entry.as_mut()) {
                        found.set_text(field, value.trim());
                    }
                    if entry_depth == Some(depth) {
                        // Only the first entry of the document matters.
                        return entry.ok_or(EntryError::MissingEntry);
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(EntryError::Malformed("document has no root element".into()));
        }
        if depth != 0 {
            return Err(EntryError::Malformed("unexpected end of document".into()));
        }
        Err(EntryError::MissingEntry)
    }

    fn apply_element(&mut self, element: &BytesStart<'_>) -> Result<(), EntryError> {
        match element.local_name().as_ref() {
            b"category" => {
                if attribute(element, "scheme")?.as_deref() == Some(KIND_SCHEME)
                    && let Some(term) = attribute(element, "term")?
                {
                    self.kind = term
                        .rsplit_once('#')
                        .map(|(_, kind)| kind.to_string())
                        .unwrap_or(term);
                }
            }
            b"link" => {
                let rel = attribute(element, "rel")?.unwrap_or_default();
                let href = attribute(element, "href")?.unwrap_or_default();
                match rel.as_str() {
                    "self" => self.self_href = href,
                    "edit" | "edit-media" => self.is_editable = true,
                    PARENT_REL => self.parent_hrefs.push(href),
                    _ => {}
                }
            }
            b"content" => {
                if let Some(src) = attribute(element, "src")? {
                    self.content_src = src;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn set_text(&mut self, field: TextField, value: &str) {
        match field {
            TextField::Title => self.title = value.to_string(),
            TextField::Filename => self.filename = value.to_string(),
            TextField::ResourceId => self.resource_id = value.to_string(),
            TextField::Md5 => self.md5 = Some(value.to_string()).filter(|v| !v.is_empty()),
            TextField::Updated => {
                self.mtime = OffsetDateTime::parse(value, &Rfc3339)
                    .inspect_err(|err| {
                        warn!(
                            value,
                            error = %err,
                            "unparsable entry timestamp, treating as unset"
                        );
                    })
                    .ok();
            }
        }
    }
}

/// Accepts any well-formed XML document. Used for responses whose content is
/// not otherwise needed but must not be garbage.
pub fn check_well_formed(body: &[u8]) -> Result<(), EntryError> {
    let mut reader = Reader::from_reader(body);
    let mut depth = 0usize;
    let mut seen_root = false;
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(_) => {
                depth += 1;
                seen_root = true;
            }
            Event::Empty(_) => seen_root = true,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }
    if !seen_root {
        return Err(EntryError::Malformed("document has no root element".into()));
    }
    if depth != 0 {
        return Err(EntryError::Malformed("unexpected end of document".into()));
    }
    Ok(())
}

fn text_field(name: &[u8]) -> Option<TextField> {
    match name {
        b"title" => Some(TextField::Title),
        b"filename" => Some(TextField::Filename),
        b"resourceId" => Some(TextField::ResourceId),
        b"updated" => Some(TextField::Updated),
        b"md5Checksum" => Some(TextField::Md5),
        _ => None,
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, EntryError> {
    let Some(attr) = element.try_get_attribute(name).map_err(malformed)? else {
        return Ok(None);
    };
    let value: Cow<'_, str> = attr.unescape_value().map_err(malformed)?;
    Ok(Some(value.into_owned()))
}

fn malformed(err: impl std::fmt::Display) -> EntryError {
    EntryError::Malformed(err.to_string())
}
