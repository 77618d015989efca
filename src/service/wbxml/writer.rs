//! WBXML writer
//!
//! Emits SWITCH_PAGE only when the next tag lives on a different codepage,
//! and holds start-tags back until content arrives so that elements closed
//! immediately are written content-less, with no END token. This delayed
//! emission matches what grommunio-sync ships and what ActiveSync clients
//! are tested against.

use crate::common::{Error, Result};
use crate::service::wbxml::reader::{Element, Node};
use crate::service::wbxml::{
    CHARSET_UTF8, END, OPAQUE, PUBLIC_ID, STR_I, SWITCH_PAGE, TAG_HAS_CONTENT, VERSION,
};

struct PendingTag {
    page: u8,
    token: u8,
    sent: bool,
}

/// WBXML 1.3 document writer
pub struct WbxmlWriter {
    out: Vec<u8>,
    current_page: u8,
    stack: Vec<PendingTag>,
}

impl WbxmlWriter {
    /// Create a writer with the ActiveSync document header already emitted
    pub fn new() -> Self {
        let mut out = Vec::with_capacity(256);
        out.push(VERSION);
        out.push(PUBLIC_ID);
        out.push(CHARSET_UTF8);
        out.push(0x00); // string table length
        Self {
            out,
            current_page: 0,
            stack: Vec::new(),
        }
    }

    /// Open an element. Emission is delayed until content arrives.
    pub fn start_tag(&mut self, page: u8, token: u8) {
        self.stack.push(PendingTag {
            page,
            token,
            sent: false,
        });
    }

    /// Emit a content-less element immediately
    pub fn empty_tag(&mut self, page: u8, token: u8) {
        self.flush_pending();
        self.emit_tag(page, token, false);
    }

    /// Inline string content of the current element. NUL bytes are dropped;
    /// the wire format uses them as terminators.
    pub fn text(&mut self, value: &str) {
        let clean: String;
        let value = if value.contains('\0') {
            clean = value.replace('\0', "");
            &clean
        } else {
            value
        };
        if value.is_empty() {
            return;
        }
        self.flush_pending();
        self.out.push(STR_I);
        self.out.extend_from_slice(value.as_bytes());
        self.out.push(0x00);
    }

    /// Opaque binary content of the current element
    pub fn opaque(&mut self, data: &[u8]) {
        self.flush_pending();
        self.out.push(OPAQUE);
        write_mb_uint(&mut self.out, data.len() as u64);
        self.out.extend_from_slice(data);
    }

    /// Close the innermost open element
    pub fn end_tag(&mut self) -> Result<()> {
        let tag = self
            .stack
            .pop()
            .ok_or_else(|| Error::Codec("end_tag with no open element".to_string()))?;
        if tag.sent {
            self.out.push(END);
        } else {
            // Never materialized: the element is content-less
            self.flush_pending();
            self.emit_tag(tag.page, tag.token, false);
        }
        Ok(())
    }

    /// Convenience: `<tag>value</tag>`
    pub fn text_element(&mut self, page: u8, token: u8, value: &str) -> Result<()> {
        self.start_tag(page, token);
        self.text(value);
        self.end_tag()
    }

    /// Finish the document and take the bytes
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.stack.is_empty() {
            return Err(Error::Codec(format!(
                "{} element(s) left open",
                self.stack.len()
            )));
        }
        Ok(self.out)
    }

    /// Re-encode a decoded element tree
    pub fn write_element(&mut self, element: &Element) -> Result<()> {
        self.start_tag(element.page, element.token);
        for child in &element.children {
            match child {
                Node::Element(inner) => self.write_element(inner)?,
                Node::Text(value) => self.text(value),
                Node::Opaque(data) => self.opaque(data),
            }
        }
        self.end_tag()
    }

    fn flush_pending(&mut self) {
        for i in 0..self.stack.len() {
            if !self.stack[i].sent {
                let (page, token) = (self.stack[i].page, self.stack[i].token);
                self.emit_tag(page, token, true);
                self.stack[i].sent = true;
            }
        }
    }

    fn emit_tag(&mut self, page: u8, token: u8, has_content: bool) {
        if self.current_page != page {
            self.out.push(SWITCH_PAGE);
            self.out.push(page);
            self.current_page = page;
        }
        let mut byte = token;
        if has_content {
            byte |= TAG_HAS_CONTENT;
        }
        self.out.push(byte);
    }
}

impl Default for WbxmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Multi-byte unsigned integer: big-endian 7-bit groups, continuation bit
/// on all but the last byte
pub fn write_mb_uint(out: &mut Vec<u8>, mut value: u64) {
    let mut groups = [0u8; 10];
    let mut count = 0;
    loop {
        groups[count] = (value & 0x7F) as u8;
        count += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let mut byte = groups[i];
        if i > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::wbxml::tokens::{airsync, folder_hierarchy, PAGE_FOLDER_HIERARCHY};

    #[test]
    fn test_header_bytes() {
        let writer = WbxmlWriter::new();
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes, vec![0x03, 0x01, 0x6A, 0x00]);
    }

    #[test]
    fn test_mb_uint_encoding() {
        let mut out = Vec::new();
        write_mb_uint(&mut out, 0);
        assert_eq!(out, vec![0x00]);

        out.clear();
        write_mb_uint(&mut out, 0x7F);
        assert_eq!(out, vec![0x7F]);

        out.clear();
        write_mb_uint(&mut out, 0x80);
        assert_eq!(out, vec![0x81, 0x00]);

        out.clear();
        write_mb_uint(&mut out, 0x2000);
        assert_eq!(out, vec![0xC0, 0x00]);
    }

    #[test]
    fn test_simple_document() {
        let mut writer = WbxmlWriter::new();
        writer.start_tag(0, airsync::SYNC);
        writer.text_element(0, airsync::STATUS, "1").unwrap();
        writer.end_tag().unwrap();
        let bytes = writer.finish().unwrap();
        // header, Sync|C, Status|C, STR_I "1" 00, END, END
        assert_eq!(
            bytes,
            vec![0x03, 0x01, 0x6A, 0x00, 0x45, 0x4E, 0x03, b'1', 0x00, 0x01, 0x01]
        );
    }

    #[test]
    fn test_empty_element_has_no_content_bit_and_no_end() {
        let mut writer = WbxmlWriter::new();
        writer.start_tag(0, airsync::SYNC);
        writer.start_tag(0, airsync::MORE_AVAILABLE);
        writer.end_tag().unwrap(); // closed with no content
        writer.end_tag().unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes, vec![0x03, 0x01, 0x6A, 0x00, 0x45, 0x14, 0x01]);
    }

    #[test]
    fn test_page_switch_only_on_change() {
        let mut writer = WbxmlWriter::new();
        writer.start_tag(0, airsync::SYNC);
        writer
            .text_element(PAGE_FOLDER_HIERARCHY, folder_hierarchy::SYNC_KEY, "1")
            .unwrap();
        writer
            .text_element(PAGE_FOLDER_HIERARCHY, folder_hierarchy::COUNT, "0")
            .unwrap();
        writer.end_tag().unwrap();
        let bytes = writer.finish().unwrap();
        // One SWITCH_PAGE before SyncKey, none before Count
        assert_eq!(
            bytes,
            vec![
                0x03, 0x01, 0x6A, 0x00, // header
                0x45, // Sync | content
                0x00, 0x07, // SWITCH_PAGE FolderHierarchy
                0x52, 0x03, b'1', 0x00, 0x01, // SyncKey "1"
                0x57, 0x03, b'0', 0x00, 0x01, // Count "0"
                0x01, // END Sync
            ]
        );
    }

    #[test]
    fn test_opaque_length_prefix() {
        let mut writer = WbxmlWriter::new();
        writer.start_tag(0, airsync::SYNC);
        writer.opaque(&[0xDE, 0xAD]);
        writer.end_tag().unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[4..], &[0x45, 0xC3, 0x02, 0xDE, 0xAD, 0x01]);
    }

    #[test]
    fn test_unbalanced_document_rejected() {
        let mut writer = WbxmlWriter::new();
        writer.start_tag(0, airsync::SYNC);
        assert!(writer.finish().is_err());

        let mut writer = WbxmlWriter::new();
        assert!(writer.end_tag().is_err());
    }

    #[test]
    fn test_text_drops_nul_bytes() {
        let mut writer = WbxmlWriter::new();
        writer.start_tag(0, airsync::SYNC);
        writer.text("a\0b");
        writer.end_tag().unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[4..], &[0x45, 0x03, b'a', b'b', 0x00, 0x01]);
    }
}
