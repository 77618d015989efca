//! WBXML reader
//!
//! A pull decoder producing a typed event stream, and a document-tree layer
//! on top of it for request parsing. Malformed input is rejected with a
//! specific error; a single bad byte in a response puts clients into silent
//! retry loops, so nothing here is lenient.

use crate::common::{Error, Result};
use crate::service::wbxml::tokens::{is_registered_page, page_name, token_name};
use crate::service::wbxml::{
    CHARSET_UTF8, END, ENTITY, OPAQUE, PUBLIC_ID, STR_I, SWITCH_PAGE, TAG_HAS_ATTRIBUTES,
    TAG_HAS_CONTENT, VERSION,
};

/// Decoded WBXML event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SwitchPage(u8),
    StartTag {
        page: u8,
        token: u8,
        has_content: bool,
    },
    End,
    Text(String),
    Opaque(Vec<u8>),
}

/// Streaming WBXML decoder
pub struct WbxmlReader<'a> {
    data: &'a [u8],
    pos: usize,
    page: u8,
    depth: usize,
}

impl<'a> WbxmlReader<'a> {
    /// Validate the document header and position the reader on the body
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Codec("document shorter than header".to_string()));
        }
        if data[0] != VERSION {
            return Err(Error::Codec(format!(
                "unsupported WBXML version 0x{:02x}",
                data[0]
            )));
        }
        if data[1] != PUBLIC_ID {
            return Err(Error::Codec(format!(
                "unexpected public id 0x{:02x}",
                data[1]
            )));
        }
        if data[2] != CHARSET_UTF8 {
            return Err(Error::Codec(format!("unsupported charset 0x{:02x}", data[2])));
        }
        if data[3] != 0x00 {
            return Err(Error::Codec("non-empty string table".to_string()));
        }
        Ok(Self {
            data,
            pos: 4,
            page: 0,
            depth: 0,
        })
    }

    /// Current codepage
    pub fn page(&self) -> u8 {
        self.page
    }

    /// Next event, or None at a well-formed end of document
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        if self.pos >= self.data.len() {
            if self.depth != 0 {
                return Err(Error::Codec(format!(
                    "end of document with {} open element(s)",
                    self.depth
                )));
            }
            return Ok(None);
        }
        let byte = self.read_byte()?;
        match byte {
            SWITCH_PAGE => {
                let page = self.read_byte()?;
                if !is_registered_page(page) {
                    return Err(Error::Codec(format!("unknown codepage 0x{:02x}", page)));
                }
                self.page = page;
                Ok(Some(Event::SwitchPage(page)))
            }
            END => {
                if self.depth == 0 {
                    return Err(Error::Codec("END with no open element".to_string()));
                }
                self.depth -= 1;
                Ok(Some(Event::End))
            }
            STR_I => {
                let value = self.read_terminated_string()?;
                Ok(Some(Event::Text(value)))
            }
            ENTITY => {
                let code = self.read_mb_uint()?;
                let ch = char::from_u32(code as u32)
                    .ok_or_else(|| Error::Codec(format!("invalid entity 0x{:x}", code)))?;
                Ok(Some(Event::Text(ch.to_string())))
            }
            OPAQUE => {
                let len = self.read_mb_uint()? as usize;
                if self.pos + len > self.data.len() {
                    return Err(Error::Codec(format!(
                        "opaque length {} overruns document",
                        len
                    )));
                }
                let data = self.data[self.pos..self.pos + len].to_vec();
                self.pos += len;
                Ok(Some(Event::Opaque(data)))
            }
            _ => {
                if byte & TAG_HAS_ATTRIBUTES != 0 {
                    return Err(Error::Codec(format!(
                        "attribute flag set on tag 0x{:02x}; ActiveSync does not use attributes",
                        byte
                    )));
                }
                let token = byte & !TAG_HAS_CONTENT;
                if token < 0x05 {
                    return Err(Error::Codec(format!("reserved token 0x{:02x}", byte)));
                }
                let has_content = byte & TAG_HAS_CONTENT != 0;
                if has_content {
                    self.depth += 1;
                }
                Ok(Some(Event::StartTag {
                    page: self.page,
                    token,
                    has_content,
                }))
            }
        }
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::Codec("unexpected end of document".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_mb_uint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for _ in 0..10 {
            let byte = self.read_byte()?;
            value = (value << 7) | u64::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::Codec("mb_uint longer than 10 bytes".to_string()))
    }

    fn read_terminated_string(&mut self) -> Result<String> {
        let start = self.pos;
        while self.pos < self.data.len() && self.data[self.pos] != 0x00 {
            self.pos += 1;
        }
        if self.pos >= self.data.len() {
            return Err(Error::Codec("unterminated inline string".to_string()));
        }
        let bytes = &self.data[start..self.pos];
        self.pos += 1; // terminator
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::Codec("inline string is not valid UTF-8".to_string()))
    }
}

/// Element content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Opaque(Vec<u8>),
}

/// Decoded element tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub page: u8,
    pub token: u8,
    pub children: Vec<Node>,
}

impl Element {
    fn new(page: u8, token: u8) -> Self {
        Self {
            page,
            token,
            children: Vec::new(),
        }
    }

    /// Whether this element is (page, token)
    pub fn is(&self, page: u8, token: u8) -> bool {
        self.page == page && self.token == token
    }

    /// First child element matching (page, token)
    pub fn find(&self, page: u8, token: u8) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(el) if el.is(page, token) => Some(el),
            _ => None,
        })
    }

    /// All child elements matching (page, token)
    pub fn find_all<'a>(
        &'a self,
        page: u8,
        token: u8,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter_map(move |node| match node {
            Node::Element(el) if el.is(page, token) => Some(el),
            _ => None,
        })
    }

    /// Concatenated text content of this element
    pub fn text(&self) -> Option<String> {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(value) = node {
                out.push_str(value);
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Text content of a direct child element
    pub fn child_text(&self, page: u8, token: u8) -> Option<String> {
        self.find(page, token).and_then(Element::text)
    }

    /// Opaque content of this element, if any
    pub fn opaque(&self) -> Option<&[u8]> {
        self.children.iter().find_map(|node| match node {
            Node::Opaque(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Diagnostic name, e.g. `AirSync:SyncKey`
    pub fn display_name(&self) -> String {
        let page = page_name(self.page).unwrap_or("?");
        let tag = token_name(self.page, self.token).unwrap_or("?");
        format!("{}:{}", page, tag)
    }
}

/// Decode a complete document into its root element
pub fn parse_document(data: &[u8]) -> Result<Element> {
    let mut reader = WbxmlReader::new(data)?;
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    while let Some(event) = reader.next_event()? {
        match event {
            Event::SwitchPage(_) => {}
            Event::StartTag {
                page,
                token,
                has_content,
            } => {
                if root.is_some() {
                    return Err(Error::Codec("content after document root".to_string()));
                }
                let element = Element::new(page, token);
                if has_content {
                    stack.push(element);
                } else if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(element));
                } else {
                    root = Some(element);
                }
            }
            Event::End => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Codec("END with no open element".to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(element));
                } else {
                    root = Some(element);
                }
            }
            Event::Text(value) => {
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| Error::Codec("text outside any element".to_string()))?;
                parent.children.push(Node::Text(value));
            }
            Event::Opaque(data) => {
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| Error::Codec("opaque data outside any element".to_string()))?;
                parent.children.push(Node::Opaque(data));
            }
        }
    }

    root.ok_or_else(|| Error::Codec("empty document".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::wbxml::tokens::{airsync, airsyncbase, PAGE_AIRSYNCBASE};
    use crate::service::wbxml::WbxmlWriter;

    fn sample_document() -> Vec<u8> {
        let mut writer = WbxmlWriter::new();
        writer.start_tag(0, airsync::SYNC);
        writer.start_tag(0, airsync::COLLECTIONS);
        writer.start_tag(0, airsync::COLLECTION);
        writer.text_element(0, airsync::SYNC_KEY, "3").unwrap();
        writer.text_element(0, airsync::COLLECTION_ID, "1").unwrap();
        writer.start_tag(0, airsync::GET_CHANGES);
        writer.end_tag().unwrap();
        writer
            .text_element(PAGE_AIRSYNCBASE, airsyncbase::TYPE, "2")
            .unwrap();
        writer.start_tag(PAGE_AIRSYNCBASE, airsyncbase::DATA);
        writer.opaque(b"<html/>");
        writer.end_tag().unwrap();
        writer.end_tag().unwrap();
        writer.end_tag().unwrap();
        writer.end_tag().unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let bytes = sample_document();
        let root = parse_document(&bytes).unwrap();
        let mut writer = WbxmlWriter::new();
        writer.write_element(&root).unwrap();
        assert_eq!(writer.finish().unwrap(), bytes);
    }

    #[test]
    fn test_tree_navigation() {
        let root = parse_document(&sample_document()).unwrap();
        assert!(root.is(0, airsync::SYNC));
        let collection = root
            .find(0, airsync::COLLECTIONS)
            .and_then(|c| c.find(0, airsync::COLLECTION))
            .unwrap();
        assert_eq!(collection.child_text(0, airsync::SYNC_KEY).as_deref(), Some("3"));
        // empty element decodes to a childless element
        let get_changes = collection.find(0, airsync::GET_CHANGES).unwrap();
        assert!(get_changes.children.is_empty());
        let data = collection.find(PAGE_AIRSYNCBASE, airsyncbase::DATA).unwrap();
        assert_eq!(data.opaque(), Some(b"<html/>".as_ref()));
    }

    #[test]
    fn test_rejects_bad_header() {
        assert!(parse_document(&[0x02, 0x01, 0x6A, 0x00, 0x45, 0x01]).is_err());
        assert!(parse_document(&[0x03, 0x02, 0x6A, 0x00, 0x45, 0x01]).is_err());
        assert!(parse_document(&[0x03, 0x01, 0x04, 0x00, 0x45, 0x01]).is_err());
        assert!(parse_document(&[0x03, 0x01]).is_err());
    }

    #[test]
    fn test_rejects_unknown_codepage() {
        let doc = [0x03, 0x01, 0x6A, 0x00, 0x00, 0x63, 0x45, 0x01];
        let err = parse_document(&doc).unwrap_err();
        assert!(err.to_string().contains("codepage"));
    }

    #[test]
    fn test_rejects_stray_end() {
        let doc = [0x03, 0x01, 0x6A, 0x00, 0x01];
        assert!(parse_document(&doc).is_err());
    }

    #[test]
    fn test_rejects_unclosed_element() {
        let doc = [0x03, 0x01, 0x6A, 0x00, 0x45];
        assert!(parse_document(&doc).is_err());
    }

    #[test]
    fn test_rejects_opaque_overrun() {
        let doc = [0x03, 0x01, 0x6A, 0x00, 0x45, 0xC3, 0x10, 0xAA, 0x01];
        let err = parse_document(&doc).unwrap_err();
        assert!(err.to_string().contains("overruns"));
    }

    #[test]
    fn test_rejects_invalid_utf8_string() {
        let doc = [0x03, 0x01, 0x6A, 0x00, 0x45, 0x03, 0xFF, 0xFE, 0x00, 0x01];
        let err = parse_document(&doc).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_rejects_attribute_flag() {
        let doc = [0x03, 0x01, 0x6A, 0x00, 0xC5, 0x01];
        assert!(parse_document(&doc).is_err());
    }

    #[test]
    fn test_event_stream_shape() {
        let mut writer = WbxmlWriter::new();
        writer.start_tag(0, airsync::SYNC);
        writer.text("x");
        writer.end_tag().unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = WbxmlReader::new(&bytes).unwrap();
        assert_eq!(
            reader.next_event().unwrap(),
            Some(Event::StartTag {
                page: 0,
                token: airsync::SYNC,
                has_content: true
            })
        );
        assert_eq!(reader.next_event().unwrap(), Some(Event::Text("x".to_string())));
        assert_eq!(reader.next_event().unwrap(), Some(Event::End));
        assert_eq!(reader.next_event().unwrap(), None);
    }
}
