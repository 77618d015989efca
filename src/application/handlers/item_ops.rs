//! The ItemOperations command
//!
//! Fetch retrieves one item's full body on demand, usually as MIME, with
//! the explicitly requested body preference; EmptyFolderContents clears a
//! collection and resets its sync relationship.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::dispatcher::{AppContext, CommandResponse};
use crate::application::handlers::{parse_body_preferences, prepare_item_body, write_application_data};
use crate::application::strategy::{ClientStrategy, MIME_TRUNCATION_CAP};
use crate::common::types::{status, BodyType, Principal};
use crate::common::{Error, Result};
use crate::data::mail_store::StoredItem;
use crate::data::state_store::Device;
use crate::service::wbxml::tokens::{airsync, item_operations as io, PAGE_AIRSYNC, PAGE_ITEM_OPERATIONS};
use crate::service::wbxml::{Element, Node, WbxmlWriter};

pub async fn handle(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    device: &Device,
    strategy: &'static ClientStrategy,
    document: &Element,
) -> Result<CommandResponse> {
    if !document.is(PAGE_ITEM_OPERATIONS, io::ITEM_OPERATIONS) {
        return Err(Error::Protocol(
            "ItemOperations body must start with <ItemOperations>".to_string(),
        ));
    }

    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_ITEM_OPERATIONS, io::ITEM_OPERATIONS);
    writer.text_element(PAGE_ITEM_OPERATIONS, io::STATUS, &status::SUCCESS.to_string())?;
    writer.start_tag(PAGE_ITEM_OPERATIONS, io::RESPONSE);

    for node in &document.children {
        let Node::Element(operation) = node else {
            continue;
        };
        if operation.is(PAGE_ITEM_OPERATIONS, io::FETCH) {
            write_fetch(ctx, principal, strategy, operation, &mut writer)?;
        } else if operation.is(PAGE_ITEM_OPERATIONS, io::EMPTY_FOLDER_CONTENTS) {
            write_empty_folder(ctx, principal, device, operation, &mut writer).await?;
        }
    }

    writer.end_tag()?; // Response
    writer.end_tag()?; // ItemOperations
    Ok(CommandResponse::wbxml(writer.finish()?))
}

fn write_fetch(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    strategy: &'static ClientStrategy,
    fetch: &Element,
    writer: &mut WbxmlWriter,
) -> Result<()> {
    let server_id = fetch
        .child_text(PAGE_AIRSYNC, airsync::SERVER_ID)
        .ok_or_else(|| Error::Protocol("Fetch without a <ServerId>".to_string()))?;

    writer.start_tag(PAGE_ITEM_OPERATIONS, io::FETCH);

    let item = match resolve_item(ctx, principal, &server_id) {
        Ok(Some(item)) => item,
        Ok(None) => {
            debug!(server_id = %server_id, "fetch target not found");
            writer.text_element(
                PAGE_ITEM_OPERATIONS,
                io::STATUS,
                &status::OBJECT_NOT_FOUND.to_string(),
            )?;
            writer.text_element(PAGE_AIRSYNC, airsync::SERVER_ID, &server_id)?;
            return writer.end_tag();
        }
        Err(err) => {
            warn!(%err, "fetch failed against the store");
            writer.text_element(
                PAGE_ITEM_OPERATIONS,
                io::STATUS,
                &status::SERVER_ERROR.to_string(),
            )?;
            writer.text_element(PAGE_AIRSYNC, airsync::SERVER_ID, &server_id)?;
            return writer.end_tag();
        }
    };

    // On-demand fetches use the explicitly requested preference; MIME is
    // the default, and the 512 KB ceiling holds unless AllOrNone=0
    let preferences =
        parse_body_preferences(fetch.find(PAGE_ITEM_OPERATIONS, io::OPTIONS));
    let (body_type, requested, all_or_none) = preferences
        .first()
        .map(|pref| (pref.body_type, pref.truncation_size, pref.all_or_none))
        .unwrap_or((BodyType::Mime, None, true));
    let limit = match body_type {
        BodyType::Mime if all_or_none => {
            Some(requested.unwrap_or(MIME_TRUNCATION_CAP).min(MIME_TRUNCATION_CAP))
        }
        _ => strategy.truncation(body_type, requested, false).filter(|_| requested.is_some()),
    };

    let prepared = prepare_item_body(ctx.mail_store.as_ref(), &item, body_type, limit)?;

    writer.text_element(PAGE_ITEM_OPERATIONS, io::STATUS, &status::SUCCESS.to_string())?;
    writer.text_element(PAGE_AIRSYNC, airsync::SERVER_ID, &server_id)?;
    writer.text_element(PAGE_AIRSYNC, airsync::CLASS, "Email")?;
    writer.start_tag(PAGE_ITEM_OPERATIONS, io::PROPERTIES);
    write_application_data(writer, &item, &prepared)?;
    writer.end_tag()?; // Properties
    info!(server_id = %server_id, body_type = body_type.as_u8(), "item fetched");
    writer.end_tag() // Fetch
}

async fn write_empty_folder(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    device: &Device,
    operation: &Element,
    writer: &mut WbxmlWriter,
) -> Result<()> {
    let collection_id = operation
        .child_text(PAGE_AIRSYNC, airsync::COLLECTION_ID)
        .ok_or_else(|| Error::Protocol("EmptyFolderContents without a <CollectionId>".to_string()))?;

    writer.start_tag(PAGE_ITEM_OPERATIONS, io::EMPTY_FOLDER_CONTENTS);

    let outcome = if ctx.mail_store.collection_exists(principal, &collection_id)? {
        let _guard = ctx
            .lock_collection(principal.id, &device.device_id, &collection_id)
            .await;
        let removed = ctx.mail_store.empty_folder(principal, &collection_id)?;
        let mut state =
            ctx.state_store
                .load_state(principal.id, &device.device_id, &collection_id)?;
        state.reset();
        ctx.state_store.save_state(&state)?;
        info!(collection_id = %collection_id, removed, "folder emptied");
        status::SUCCESS
    } else {
        debug!(collection_id = %collection_id, "empty of unknown collection");
        status::OBJECT_NOT_FOUND
    };

    writer.text_element(PAGE_ITEM_OPERATIONS, io::STATUS, &outcome.to_string())?;
    writer.text_element(PAGE_AIRSYNC, airsync::COLLECTION_ID, &collection_id)?;
    writer.end_tag() // EmptyFolderContents
}

/// ServerIds have the shape `collection:item_id`
fn resolve_item(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    server_id: &str,
) -> Result<Option<StoredItem>> {
    let Some((_collection, raw_id)) = server_id.split_once(':') else {
        return Ok(None);
    };
    let Ok(item_id) = raw_id.parse::<i64>() else {
        return Ok(None);
    };
    ctx.mail_store.get_item(principal, item_id)
}
