//! MIME assembly and extraction
//!
//! Builds RFC 5322 messages for Type=4 body responses when the store has no
//! raw MIME for an item, and mines text/HTML parts out of stored MIME.

use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message, MultiPart, SinglePart};
use mail_parser::MessageParser;
use std::time::SystemTime;

use crate::common::{Error, Result};

/// Fields needed to synthesize a minimal RFC 5322 message
pub struct MimeSource<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub date: DateTime<Utc>,
    pub body_plain: Option<&'a str>,
    pub body_html: Option<&'a str>,
}

fn mailbox_or_placeholder(addr: &str) -> Mailbox {
    addr.parse::<Mailbox>()
        .unwrap_or_else(|_| "unknown@invalid".parse::<Mailbox>().expect("literal mailbox"))
}

/// Assemble an RFC 5322 message from stored fields.
///
/// Plain and HTML bodies become a multipart/alternative; a single body is
/// emitted as-is. An item with neither gets an empty text part so the
/// result still parses.
pub fn build_mime(source: &MimeSource<'_>) -> Result<Vec<u8>> {
    let builder = Message::builder()
        .from(mailbox_or_placeholder(source.from))
        .to(mailbox_or_placeholder(source.to))
        .subject(source.subject)
        .date(SystemTime::from(source.date));

    let message = match (source.body_plain, source.body_html) {
        (Some(plain), Some(html)) => builder.multipart(MultiPart::alternative_plain_html(
            plain.to_string(),
            html.to_string(),
        )),
        (None, Some(html)) => builder.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(html.to_string()),
        ),
        (plain, None) => builder.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(plain.unwrap_or("").to_string()),
        ),
    }
    .map_err(|e| Error::Other(format!("Failed to assemble MIME: {}", e)))?;

    Ok(message.formatted())
}

/// Extract text and HTML bodies from raw MIME
pub fn extract_bodies(raw: &[u8]) -> (Option<String>, Option<String>) {
    match MessageParser::default().parse(raw) {
        Some(message) => {
            let plain = message.body_text(0).map(|cow| cow.into_owned());
            let html = message.body_html(0).map(|cow| cow.into_owned());
            (plain, html)
        }
        None => (None, None),
    }
}
