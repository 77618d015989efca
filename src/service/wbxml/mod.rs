//! WBXML 1.3 codec
//!
//! Binary encoding of the ActiveSync XML vocabulary per WAP-192-WBXML and
//! MS-ASWBXML. The writer performs codepage-switch minimization and delayed
//! tag emission; the reader produces a typed event stream with strict error
//! reporting, plus a document tree for request parsing.

pub mod reader;
pub mod tokens;
pub mod writer;

pub use reader::{parse_document, Element, Event, Node, WbxmlReader};
pub use writer::WbxmlWriter;

/// WBXML version 1.3
pub const VERSION: u8 = 0x03;
/// Public identifier used by ActiveSync documents
pub const PUBLIC_ID: u8 = 0x01;
/// IANA MIBenum for UTF-8
pub const CHARSET_UTF8: u8 = 0x6A;

/// Control tokens (page-independent)
pub const SWITCH_PAGE: u8 = 0x00;
pub const END: u8 = 0x01;
pub const ENTITY: u8 = 0x02;
pub const STR_I: u8 = 0x03;
pub const OPAQUE: u8 = 0xC3;

/// Content-follows flag on tag tokens
pub const TAG_HAS_CONTENT: u8 = 0x40;
/// Attributes flag; ActiveSync never sets it
pub const TAG_HAS_ATTRIBUTES: u8 = 0x80;

/// Hex dump for TRACE diagnostics
pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(if i % 16 == 0 { '\n' } else { ' ' });
        }
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hex_groups_lines() {
        let dump = to_hex(&[0x03, 0x01, 0x6a, 0x00]);
        assert_eq!(dump, "03 01 6a 00");
    }

    #[test]
    fn test_to_hex_wraps_at_sixteen() {
        let dump = to_hex(&[0u8; 17]);
        assert_eq!(dump.lines().count(), 2);
    }
}
