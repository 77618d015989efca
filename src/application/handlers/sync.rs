//! The Sync command
//!
//! Validates the client SyncKey against the per-collection state, selects
//! and truncates bodies per the client strategy, projects a batch of items
//! as `<Add>` commands, and stages or commits the batch depending on the
//! client's commit discipline.
//!
//! SyncKey handling, per the state invariants:
//! - `"0"` resets the relationship.
//! - K matching `current_sync_key` with a pending batch is a retry of the
//!   request that produced the pending batch; the staged bytes go out again
//!   verbatim.
//! - K matching `current_sync_key` with no pending batch advances normally.
//! - K matching `pending_sync_key` confirms the pending batch, which is
//!   committed before the next batch is computed.
//! - Anything else is answered with Status 3 and a state reset.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::dispatcher::{AppContext, CommandResponse};
use crate::application::handlers::{
    parse_body_preferences, payload_len, prepare_item_body, write_application_data, BodyPreference,
};
use crate::application::strategy::ClientStrategy;
use crate::common::types::{status, Principal, SyncKey};
use crate::common::{Error, Result};
use crate::data::mail_store::StoredItem;
use crate::data::state_store::{Device, SyncState};
use crate::service::body::select_body_type;
use crate::service::wbxml::tokens::{airsync, PAGE_AIRSYNC};
use crate::service::wbxml::{Element, WbxmlWriter};

pub async fn handle(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    device: &Device,
    strategy: &'static ClientStrategy,
    document: &Element,
) -> Result<CommandResponse> {
    if !document.is(PAGE_AIRSYNC, airsync::SYNC) {
        return Err(Error::Protocol("Sync body must start with <Sync>".to_string()));
    }
    let collection = document
        .find(PAGE_AIRSYNC, airsync::COLLECTIONS)
        .and_then(|collections| collections.find(PAGE_AIRSYNC, airsync::COLLECTION))
        .ok_or_else(|| Error::Protocol("Sync without a <Collection>".to_string()))?;
    let collection_id = collection
        .child_text(PAGE_AIRSYNC, airsync::COLLECTION_ID)
        .ok_or_else(|| Error::Protocol("Sync without a <CollectionId>".to_string()))?;
    let raw_sync_key = collection
        .child_text(PAGE_AIRSYNC, airsync::SYNC_KEY)
        .ok_or_else(|| Error::Protocol("Sync without a <SyncKey>".to_string()))?;

    let _guard = ctx
        .lock_collection(principal.id, &device.device_id, &collection_id)
        .await;

    // A Sync is the "intervening Sync" that ends FolderSync loop detection
    ctx.state_store
        .clear_foldersync_attempts(principal.id, &device.device_id)?;

    let mut state = ctx
        .state_store
        .load_state(principal.id, &device.device_id, &collection_id)?;

    let client_key = match SyncKey::parse(&raw_sync_key) {
        Ok(key) => key,
        Err(_) => {
            warn!(raw = %raw_sync_key, "unparsable sync key");
            return invalid_sync_key(ctx, &mut state, &collection_id);
        }
    };

    match ctx.mail_store.collection_exists(principal, &collection_id) {
        Ok(true) => {}
        Ok(false) => {
            debug!(collection_id = %collection_id, "unknown collection");
            return object_not_found(&collection_id, &client_key);
        }
        Err(err) => {
            warn!(%err, "collection lookup failed");
            return store_error(&collection_id, &client_key);
        }
    }

    if let Some(commands) = collection.find(PAGE_AIRSYNC, airsync::COMMANDS) {
        // Client-originated changes are acknowledged, not applied; the
        // store contract is read-only.
        debug!(count = commands.children.len(), "ignoring client changes");
    }

    if client_key.is_zero() {
        state.reset();
        if strategy.needs_empty_initial_response(&client_key) {
            return empty_initial_response(ctx, &mut state, &collection_id);
        }
        return build_batch(ctx, principal, strategy, &mut state, collection, true);
    }

    if client_key.matches(&state.current_sync_key) {
        if state.has_pending() {
            if let Some(bytes) = state.pending_response.clone() {
                info!(sync_key = %client_key, "idempotent resend of staged batch");
                return Ok(CommandResponse::wbxml(bytes));
            }
            // Staged bytes are written with the batch; a bare pending key
            // means the row predates this server. Drop it and rebuild.
            state.discard_pending();
        }
        return build_batch(ctx, principal, strategy, &mut state, collection, false);
    }

    if state
        .pending_sync_key
        .as_ref()
        .is_some_and(|pending| client_key.matches(pending))
    {
        debug!(sync_key = %client_key, "pending batch confirmed");
        state.confirm_pending();
        return build_batch(ctx, principal, strategy, &mut state, collection, false);
    }

    warn!(
        presented = %client_key,
        current = %state.current_sync_key,
        "invalid sync key, forcing client reset"
    );
    invalid_sync_key(ctx, &mut state, &collection_id)
}

/// Outlook's 0->1 exchange: advance the key, send nothing
fn empty_initial_response(
    ctx: &Arc<AppContext>,
    state: &mut SyncState,
    collection_id: &str,
) -> Result<CommandResponse> {
    let new_key = SyncKey::Counter(1);
    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_AIRSYNC, airsync::SYNC);
    writer.start_tag(PAGE_AIRSYNC, airsync::COLLECTIONS);
    writer.start_tag(PAGE_AIRSYNC, airsync::COLLECTION);
    writer.text_element(PAGE_AIRSYNC, airsync::SYNC_KEY, &new_key.to_string())?;
    writer.text_element(PAGE_AIRSYNC, airsync::COLLECTION_ID, collection_id)?;
    writer.text_element(PAGE_AIRSYNC, airsync::STATUS, &status::SUCCESS.to_string())?;
    writer.text_element(PAGE_AIRSYNC, airsync::CLASS, "Email")?;
    writer.end_tag()?;
    writer.end_tag()?;
    writer.end_tag()?;
    let bytes = writer.finish()?;

    state.current_sync_key = new_key;
    ctx.state_store.save_state(state)?;
    info!("initial sync answered with empty response");
    Ok(CommandResponse::wbxml(bytes))
}

fn build_batch(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    strategy: &'static ClientStrategy,
    state: &mut SyncState,
    collection: &Element,
    is_initial: bool,
) -> Result<CommandResponse> {
    let collection_id = state.collection_id.clone();
    let window = strategy.clamp_window(
        collection
            .child_text(PAGE_AIRSYNC, airsync::WINDOW_SIZE)
            .and_then(|raw| raw.parse::<usize>().ok()),
    );
    let preferences = parse_body_preferences(collection.find(PAGE_AIRSYNC, airsync::OPTIONS));
    let offered: Vec<_> = preferences.iter().map(|p| p.body_type).collect();
    let body_type = select_body_type(&offered, &strategy.body_type_order);
    let requested_truncation = preferences
        .iter()
        .find(|p: &&BodyPreference| p.body_type == body_type)
        .and_then(|p| p.truncation_size);
    let truncation = strategy.truncation(body_type, requested_truncation, is_initial);

    let candidates = match ctx.mail_store.list_items(
        principal,
        &collection_id,
        state.last_acked_item_id,
        &state.acked_item_ids,
        window,
    ) {
        Ok(items) => items,
        Err(err) => {
            warn!(%err, "item listing failed");
            return store_error(&collection_id, &state.current_sync_key);
        }
    };

    // Prepare bodies up front so Outlook's byte budget can cut the batch
    // before anything is written
    let mut batch: Vec<(StoredItem, crate::service::body::PreparedBody)> = Vec::new();
    let mut payload_bytes = 0usize;
    for item in candidates {
        let prepared = match prepare_item_body(ctx.mail_store.as_ref(), &item, body_type, truncation)
        {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(item_id = item.id, %err, "item projection failed");
                return store_error(&collection_id, &state.current_sync_key);
            }
        };
        let size = payload_len(&prepared);
        if let Some(budget) = strategy.batch_byte_budget {
            if !batch.is_empty() && payload_bytes + size > budget {
                debug!(
                    sent = batch.len(),
                    payload_bytes, "batch cut by byte budget"
                );
                break;
            }
        }
        payload_bytes += size;
        batch.push((item, prepared));
    }

    let new_key = state.current_sync_key.next();
    let included: BTreeSet<i64> = batch.iter().map(|(item, _)| item.id).collect();

    // Anything beyond this batch, counting neither acked nor just-sent items
    let mut seen = state.acked_item_ids.clone();
    seen.extend(included.iter().copied());
    let more_available = match ctx
        .mail_store
        .count_new(principal, &collection_id, state.last_acked_item_id, &seen)
    {
        Ok(count) => count > 0,
        Err(err) => {
            warn!(%err, "count lookup failed");
            return store_error(&collection_id, &state.current_sync_key);
        }
    };

    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_AIRSYNC, airsync::SYNC);
    writer.start_tag(PAGE_AIRSYNC, airsync::COLLECTIONS);
    writer.start_tag(PAGE_AIRSYNC, airsync::COLLECTION);
    writer.text_element(PAGE_AIRSYNC, airsync::SYNC_KEY, &new_key.to_string())?;
    writer.text_element(PAGE_AIRSYNC, airsync::COLLECTION_ID, &collection_id)?;
    writer.text_element(PAGE_AIRSYNC, airsync::STATUS, &status::SUCCESS.to_string())?;
    writer.text_element(PAGE_AIRSYNC, airsync::CLASS, "Email")?;

    if !batch.is_empty() {
        writer.start_tag(PAGE_AIRSYNC, airsync::COMMANDS);
        for (item, prepared) in &batch {
            writer.start_tag(PAGE_AIRSYNC, airsync::ADD);
            writer.text_element(
                PAGE_AIRSYNC,
                airsync::SERVER_ID,
                &format!("{}:{}", collection_id, item.id),
            )?;
            writer.start_tag(PAGE_AIRSYNC, airsync::APPLICATION_DATA);
            write_application_data(&mut writer, item, prepared)?;
            writer.end_tag()?; // ApplicationData
            writer.end_tag()?; // Add
        }
        writer.end_tag()?; // Commands
    }

    if more_available {
        writer.empty_tag(PAGE_AIRSYNC, airsync::MORE_AVAILABLE);
    }

    writer.end_tag()?;
    writer.end_tag()?;
    writer.end_tag()?;
    let bytes = writer.finish()?;

    if strategy.two_phase_commit {
        state.stage_batch(new_key.clone(), included, bytes.clone());
    } else {
        // Outlook advances the SyncKey unilaterally; commit at issue time
        state.current_sync_key = new_key.clone();
        if let Some(max_id) = included.iter().max().copied() {
            state.last_acked_item_id = state.last_acked_item_id.max(max_id);
        }
        state.acked_item_ids.extend(included.iter().copied());
        state.discard_pending();
    }
    ctx.state_store.save_state(state)?;

    info!(
        sync_key = %new_key,
        items = batch.len(),
        more_available,
        "sync batch issued"
    );
    Ok(CommandResponse::wbxml(bytes))
}

/// Status 3: wipe state so the client restarts from SyncKey 0
fn invalid_sync_key(
    ctx: &Arc<AppContext>,
    state: &mut SyncState,
    collection_id: &str,
) -> Result<CommandResponse> {
    state.reset();
    ctx.state_store.save_state(state)?;
    status_only_response(collection_id, &SyncKey::Zero, status::INVALID_SYNC_KEY)
}

/// Status 8 inside a well-formed response; no state change
fn object_not_found(collection_id: &str, client_key: &SyncKey) -> Result<CommandResponse> {
    status_only_response(collection_id, client_key, status::OBJECT_NOT_FOUND)
}

/// Status 6: transient store failure, state untouched, client retries
fn store_error(collection_id: &str, client_key: &SyncKey) -> Result<CommandResponse> {
    status_only_response(collection_id, client_key, status::SERVER_ERROR)
}

fn status_only_response(
    collection_id: &str,
    sync_key: &SyncKey,
    status_value: u8,
) -> Result<CommandResponse> {
    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_AIRSYNC, airsync::SYNC);
    writer.start_tag(PAGE_AIRSYNC, airsync::COLLECTIONS);
    writer.start_tag(PAGE_AIRSYNC, airsync::COLLECTION);
    writer.text_element(PAGE_AIRSYNC, airsync::SYNC_KEY, &sync_key.to_string())?;
    writer.text_element(PAGE_AIRSYNC, airsync::COLLECTION_ID, collection_id)?;
    writer.text_element(PAGE_AIRSYNC, airsync::STATUS, &status_value.to_string())?;
    writer.end_tag()?;
    writer.end_tag()?;
    writer.end_tag()?;
    Ok(CommandResponse::wbxml(writer.finish()?))
}
