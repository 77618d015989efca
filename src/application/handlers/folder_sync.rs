//! The FolderSync command
//!
//! Emits the folder hierarchy as a flat list under the synthetic root "0".
//! The hierarchy is static, so a non-initial FolderSync returns Count=0
//! with an advanced SyncKey. Repeated SyncKey=0 requests without an
//! intervening Sync are the classic client reset loop; after three the
//! state is reset and a warning logged, but the response stays valid.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::dispatcher::{AppContext, CommandResponse};
use crate::common::types::{status, Principal, SyncKey};
use crate::common::{Error, Result};
use crate::data::mail_store::Folder;
use crate::data::state_store::{Device, SyncState};
use crate::service::wbxml::tokens::{folder_hierarchy as fh, PAGE_FOLDER_HIERARCHY};
use crate::service::wbxml::{Element, WbxmlWriter};

/// Synthetic collection id carrying the FolderSync state
pub const FOLDER_SYNC_COLLECTION: &str = "folders";

/// Consecutive SyncKey=0 FolderSyncs tolerated before a forced reset
const LOOP_DETECTION_THRESHOLD: i64 = 3;

pub async fn handle(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    device: &Device,
    document: &Element,
) -> Result<CommandResponse> {
    if !document.is(PAGE_FOLDER_HIERARCHY, fh::FOLDER_SYNC) {
        return Err(Error::Protocol(
            "FolderSync body must start with <FolderSync>".to_string(),
        ));
    }
    let raw_sync_key = document
        .child_text(PAGE_FOLDER_HIERARCHY, fh::SYNC_KEY)
        .ok_or_else(|| Error::Protocol("FolderSync without a <SyncKey>".to_string()))?;

    let _guard = ctx
        .lock_collection(principal.id, &device.device_id, FOLDER_SYNC_COLLECTION)
        .await;
    let mut state =
        ctx.state_store
            .load_state(principal.id, &device.device_id, FOLDER_SYNC_COLLECTION)?;

    let client_key = match SyncKey::parse(&raw_sync_key) {
        Ok(key) => key,
        Err(_) => return invalid_sync_key(ctx, &mut state),
    };

    if client_key.is_zero() {
        let attempts = state.foldersync_attempts + 1;
        state.reset();
        state.foldersync_attempts = attempts;
        if attempts >= LOOP_DETECTION_THRESHOLD {
            warn!(
                attempts,
                device_id = %device.device_id,
                "FolderSync loop detected, state forced back to initial"
            );
            state.foldersync_attempts = 0;
        }

        let folders = match ctx.mail_store.list_folders(principal) {
            Ok(folders) => folders,
            Err(err) => {
                warn!(%err, "folder listing failed");
                return status_only_response(&SyncKey::Zero, status::SERVER_ERROR);
            }
        };
        let new_key = SyncKey::Counter(1);
        let bytes = hierarchy_response(&new_key, &folders)?;
        state.current_sync_key = new_key;
        ctx.state_store.save_state(&state)?;
        info!(count = folders.len(), "full folder hierarchy sent");
        return Ok(CommandResponse::wbxml(bytes));
    }

    if client_key.matches(&state.current_sync_key) {
        // Static hierarchy: nothing changed, but the key still advances
        let new_key = state.current_sync_key.next();
        let bytes = hierarchy_response(&new_key, &[])?;
        state.current_sync_key = new_key;
        state.foldersync_attempts = 0;
        ctx.state_store.save_state(&state)?;
        debug!("no folder changes");
        return Ok(CommandResponse::wbxml(bytes));
    }

    warn!(
        presented = %client_key,
        current = %state.current_sync_key,
        "invalid FolderSync key"
    );
    invalid_sync_key(ctx, &mut state)
}

fn hierarchy_response(sync_key: &SyncKey, folders: &[Folder]) -> Result<Vec<u8>> {
    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_FOLDER_HIERARCHY, fh::FOLDER_SYNC);
    writer.text_element(PAGE_FOLDER_HIERARCHY, fh::STATUS, &status::SUCCESS.to_string())?;
    writer.text_element(PAGE_FOLDER_HIERARCHY, fh::SYNC_KEY, &sync_key.to_string())?;
    writer.start_tag(PAGE_FOLDER_HIERARCHY, fh::CHANGES);
    writer.text_element(PAGE_FOLDER_HIERARCHY, fh::COUNT, &folders.len().to_string())?;
    for folder in folders {
        writer.start_tag(PAGE_FOLDER_HIERARCHY, fh::ADD);
        writer.text_element(PAGE_FOLDER_HIERARCHY, fh::SERVER_ID, &folder.collection_id)?;
        writer.text_element(PAGE_FOLDER_HIERARCHY, fh::PARENT_ID, &folder.parent_id)?;
        writer.text_element(PAGE_FOLDER_HIERARCHY, fh::DISPLAY_NAME, &folder.display_name)?;
        writer.text_element(
            PAGE_FOLDER_HIERARCHY,
            fh::TYPE,
            &folder.folder_type.as_u8().to_string(),
        )?;
        writer.end_tag()?;
    }
    writer.end_tag()?; // Changes
    writer.end_tag()?; // FolderSync
    writer.finish()
}

fn invalid_sync_key(ctx: &Arc<AppContext>, state: &mut SyncState) -> Result<CommandResponse> {
    state.reset();
    ctx.state_store.save_state(state)?;
    status_only_response(&SyncKey::Zero, status::INVALID_SYNC_KEY)
}

fn status_only_response(sync_key: &SyncKey, status_value: u8) -> Result<CommandResponse> {
    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_FOLDER_HIERARCHY, fh::FOLDER_SYNC);
    writer.text_element(PAGE_FOLDER_HIERARCHY, fh::STATUS, &status_value.to_string())?;
    writer.text_element(PAGE_FOLDER_HIERARCHY, fh::SYNC_KEY, &sync_key.to_string())?;
    writer.end_tag()?;
    Ok(CommandResponse::wbxml(writer.finish()?))
}
