//! Command handlers
//!
//! One module per ActiveSync command, plus the shared item projection used
//! by both Sync and ItemOperations.

pub mod estimate;
pub mod folder_sync;
pub mod item_ops;
pub mod ping;
pub mod provision;
pub mod sync;

use crate::common::types::BodyType;
use crate::common::Result;
use crate::data::mail_store::{MailStore, StoredItem};
use crate::service::body::{self, Payload, PreparedBody};
use crate::service::mime;
use crate::service::wbxml::tokens::{
    airsyncbase, email, PAGE_AIRSYNCBASE, PAGE_EMAIL,
};
use crate::service::wbxml::{Element, WbxmlWriter};

/// One `<AirSyncBase:BodyPreference>` from a request
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyPreference {
    pub body_type: BodyType,
    pub truncation_size: Option<usize>,
    pub all_or_none: bool,
}

/// Collect the BodyPreference list from an `<Options>` element
pub(crate) fn parse_body_preferences(options: Option<&Element>) -> Vec<BodyPreference> {
    let Some(options) = options else {
        return Vec::new();
    };
    options
        .find_all(PAGE_AIRSYNCBASE, airsyncbase::BODY_PREFERENCE)
        .filter_map(|pref| {
            let body_type = pref
                .child_text(PAGE_AIRSYNCBASE, airsyncbase::TYPE)?
                .parse::<u8>()
                .ok()
                .and_then(BodyType::from_u8)?;
            let truncation_size = pref
                .child_text(PAGE_AIRSYNCBASE, airsyncbase::TRUNCATION_SIZE)
                .and_then(|raw| raw.parse::<usize>().ok());
            let all_or_none = pref
                .child_text(PAGE_AIRSYNCBASE, airsyncbase::ALL_OR_NONE)
                .map(|raw| raw == "1")
                .unwrap_or(false);
            Some(BodyPreference {
                body_type,
                truncation_size,
                all_or_none,
            })
        })
        .collect()
}

/// The format the item natively carries
pub(crate) fn native_body_type(item: &StoredItem) -> BodyType {
    if item.body_html.is_some() {
        BodyType::Html
    } else if item.body_plain.is_some() {
        BodyType::Plain
    } else {
        BodyType::Mime
    }
}

/// Prepare the selected body for an item, applying truncation
pub(crate) fn prepare_item_body(
    store: &dyn MailStore,
    item: &StoredItem,
    body_type: BodyType,
    limit: Option<usize>,
) -> Result<PreparedBody> {
    match body_type {
        BodyType::Plain => {
            let text = plain_text_of(item);
            let mut prepared = body::prepare_text(&text, limit);
            prepared.body_type = BodyType::Plain;
            Ok(prepared)
        }
        BodyType::Html => {
            let html = match &item.body_html {
                Some(html) => html.clone(),
                // Serve text-only mail as minimal HTML
                None => format!(
                    "<html><body>{}</body></html>",
                    html_escape::encode_text(&plain_text_of(item))
                ),
            };
            let mut prepared = body::prepare_text(&html, limit);
            prepared.body_type = BodyType::Html;
            Ok(prepared)
        }
        BodyType::Mime => {
            let raw = store.build_or_fetch_mime(item)?;
            Ok(body::prepare_binary(&raw, limit))
        }
    }
}

fn plain_text_of(item: &StoredItem) -> String {
    if let Some(plain) = &item.body_plain {
        return plain.clone();
    }
    if let Some(html) = &item.body_html {
        return body::plain_from_html(html);
    }
    if let Some(raw) = &item.mime {
        let (plain, html) = mime::extract_bodies(raw);
        if let Some(plain) = plain {
            return plain;
        }
        if let Some(html) = html {
            return body::plain_from_html(&html);
        }
    }
    String::new()
}

/// Payload bytes of a prepared body, for batch byte budgeting
pub(crate) fn payload_len(prepared: &PreparedBody) -> usize {
    match &prepared.payload {
        Payload::Text(text) => text.len(),
        Payload::Binary(data) => data.len(),
    }
}

/// Project an item's fields into ApplicationData content: the Email
/// codepage fields in canonical order, then the AirSyncBase body and the
/// native body type.
pub(crate) fn write_application_data(
    writer: &mut WbxmlWriter,
    item: &StoredItem,
    prepared: &PreparedBody,
) -> Result<()> {
    writer.text_element(PAGE_EMAIL, email::TO, &item.recipient)?;
    writer.text_element(PAGE_EMAIL, email::FROM, &item.sender)?;
    writer.text_element(PAGE_EMAIL, email::SUBJECT, &item.subject)?;
    writer.text_element(
        PAGE_EMAIL,
        email::DATE_RECEIVED,
        &item.received_at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
    )?;
    writer.text_element(PAGE_EMAIL, email::DISPLAY_TO, &item.recipient)?;
    writer.text_element(PAGE_EMAIL, email::THREAD_TOPIC, &item.subject)?;
    writer.text_element(PAGE_EMAIL, email::IMPORTANCE, "1")?;
    writer.text_element(PAGE_EMAIL, email::READ, if item.is_read { "1" } else { "0" })?;
    writer.text_element(PAGE_EMAIL, email::MESSAGE_CLASS, "IPM.Note")?;
    writer.text_element(PAGE_EMAIL, email::INTERNET_CPID, "65001")?;
    writer.text_element(
        PAGE_EMAIL,
        email::CONTENT_CLASS,
        "urn:content-classes:message",
    )?;

    write_body_element(writer, item, prepared)?;

    writer.text_element(
        PAGE_AIRSYNCBASE,
        airsyncbase::NATIVE_BODY_TYPE,
        &native_body_type(item).as_u8().to_string(),
    )?;
    Ok(())
}

/// `<AirSyncBase:Body>` with the canonical child order:
/// Type, EstimatedDataSize, Truncated, Data, Preview
fn write_body_element(
    writer: &mut WbxmlWriter,
    item: &StoredItem,
    prepared: &PreparedBody,
) -> Result<()> {
    writer.start_tag(PAGE_AIRSYNCBASE, airsyncbase::BODY);
    writer.text_element(
        PAGE_AIRSYNCBASE,
        airsyncbase::TYPE,
        &prepared.body_type.as_u8().to_string(),
    )?;
    writer.text_element(
        PAGE_AIRSYNCBASE,
        airsyncbase::ESTIMATED_DATA_SIZE,
        &prepared.estimated_size.to_string(),
    )?;
    writer.text_element(
        PAGE_AIRSYNCBASE,
        airsyncbase::TRUNCATED,
        if prepared.truncated { "1" } else { "0" },
    )?;

    writer.start_tag(PAGE_AIRSYNCBASE, airsyncbase::DATA);
    match &prepared.payload {
        // MIME goes out as opaque data, always; HTML too once it leaves
        // ASCII, where inline strings invite client-side charset bugs.
        Payload::Binary(data) => writer.opaque(data),
        Payload::Text(text) => {
            if prepared.body_type == BodyType::Html && !text.is_ascii() {
                writer.opaque(text.as_bytes());
            } else {
                writer.text(text);
            }
        }
    }
    writer.end_tag()?;

    if prepared.body_type != BodyType::Mime {
        if let Some(snippet) = body::preview(item.body_plain.as_deref(), item.body_html.as_deref())
        {
            writer.text_element(PAGE_AIRSYNCBASE, airsyncbase::PREVIEW, &snippet)?;
        }
    }
    writer.end_tag() // Body
}
