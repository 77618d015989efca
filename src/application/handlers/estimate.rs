//! The GetItemEstimate command
//!
//! Reports how many items a Sync would deliver right now, without moving
//! any state. Runs under the same per-collection lock as Sync so the count
//! cannot interleave with a batch being staged.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::dispatcher::{AppContext, CommandResponse};
use crate::common::types::{status, Principal, SyncKey};
use crate::common::{Error, Result};
use crate::data::state_store::Device;
use crate::service::wbxml::tokens::{airsync, estimate as est, PAGE_AIRSYNC, PAGE_GET_ITEM_ESTIMATE};
use crate::service::wbxml::{Element, WbxmlWriter};

/// GetItemEstimate in-band statuses
mod estimate_status {
    pub const SUCCESS: u8 = 1;
    pub const INVALID_SYNC_KEY: u8 = 4;
}

pub async fn handle(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    device: &Device,
    document: &Element,
) -> Result<CommandResponse> {
    if !document.is(PAGE_GET_ITEM_ESTIMATE, est::GET_ITEM_ESTIMATE) {
        return Err(Error::Protocol(
            "GetItemEstimate body must start with <GetItemEstimate>".to_string(),
        ));
    }
    let collection = document
        .find(PAGE_GET_ITEM_ESTIMATE, est::COLLECTIONS)
        .and_then(|collections| collections.find(PAGE_GET_ITEM_ESTIMATE, est::COLLECTION))
        .ok_or_else(|| Error::Protocol("GetItemEstimate without a <Collection>".to_string()))?;

    // Protocol 14.x carries SyncKey in the AirSync namespace and the
    // collection id in either namespace; accept both
    let collection_id = collection
        .child_text(PAGE_GET_ITEM_ESTIMATE, est::COLLECTION_ID)
        .or_else(|| collection.child_text(PAGE_AIRSYNC, airsync::COLLECTION_ID))
        .ok_or_else(|| Error::Protocol("GetItemEstimate without a <CollectionId>".to_string()))?;
    let raw_sync_key = collection
        .child_text(PAGE_AIRSYNC, airsync::SYNC_KEY)
        .ok_or_else(|| Error::Protocol("GetItemEstimate without a <SyncKey>".to_string()))?;

    let _guard = ctx
        .lock_collection(principal.id, &device.device_id, &collection_id)
        .await;
    let state = ctx
        .state_store
        .load_state(principal.id, &device.device_id, &collection_id)?;

    let key_is_valid = match SyncKey::parse(&raw_sync_key) {
        Ok(key) => {
            key.is_zero()
                || key.matches(&state.current_sync_key)
                || state
                    .pending_sync_key
                    .as_ref()
                    .is_some_and(|pending| key.matches(pending))
        }
        Err(_) => false,
    };
    if !key_is_valid {
        warn!(raw = %raw_sync_key, "estimate with invalid sync key");
        return respond(&collection_id, estimate_status::INVALID_SYNC_KEY, None);
    }

    if !ctx.mail_store.collection_exists(principal, &collection_id)? {
        debug!(collection_id = %collection_id, "estimate for unknown collection");
        return respond(&collection_id, status::OBJECT_NOT_FOUND, None);
    }

    let estimate = match ctx.mail_store.count_new(
        principal,
        &collection_id,
        state.last_acked_item_id,
        &state.acked_item_ids,
    ) {
        Ok(count) => count,
        Err(err) => {
            warn!(%err, "estimate count failed");
            return respond(&collection_id, status::SERVER_ERROR, None);
        }
    };

    debug!(collection_id = %collection_id, estimate, "estimate computed");
    respond(&collection_id, estimate_status::SUCCESS, Some(estimate))
}

fn respond(collection_id: &str, status_value: u8, estimate: Option<usize>) -> Result<CommandResponse> {
    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_GET_ITEM_ESTIMATE, est::GET_ITEM_ESTIMATE);
    writer.start_tag(PAGE_GET_ITEM_ESTIMATE, est::RESPONSE);
    writer.text_element(PAGE_GET_ITEM_ESTIMATE, est::STATUS, &status_value.to_string())?;
    writer.start_tag(PAGE_GET_ITEM_ESTIMATE, est::COLLECTION);
    writer.text_element(PAGE_GET_ITEM_ESTIMATE, est::COLLECTION_ID, collection_id)?;
    if let Some(estimate) = estimate {
        writer.text_element(PAGE_GET_ITEM_ESTIMATE, est::ESTIMATE, &estimate.to_string())?;
    }
    writer.end_tag()?; // Collection
    writer.end_tag()?; // Response
    writer.end_tag()?; // GetItemEstimate
    Ok(CommandResponse::wbxml(writer.finish()?))
}
