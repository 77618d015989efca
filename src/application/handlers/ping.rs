//! The Ping command
//!
//! Long-poll: suspend until a watched collection changes, the heartbeat
//! elapses, or a newer Ping from the same device takes over. The handler
//! never holds the per-collection mutex while suspended; it only watches
//! the change hub.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::application::dispatcher::{AppContext, CommandResponse, PingParams};
use crate::common::types::Principal;
use crate::common::{Error, Result};
use crate::data::state_store::Device;
use crate::service::wbxml::tokens::{ping as pg, PAGE_PING};
use crate::service::wbxml::{Element, WbxmlWriter};

/// Ping in-band statuses
mod ping_status {
    pub const HEARTBEAT_EXPIRED: u8 = 1;
    pub const CHANGES: u8 = 2;
    pub const MISSING_PARAMETERS: u8 = 3;
}

pub async fn handle(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    device: &Device,
    document: Option<&Element>,
) -> Result<CommandResponse> {
    let params = match document {
        Some(document) => {
            let params = parse_params(ctx, document)?;
            ctx.remember_ping_params(principal.id, &device.device_id, params.clone());
            params
        }
        // An empty Ping reuses the parameters of the previous one
        None => match ctx.recall_ping_params(principal.id, &device.device_id) {
            Some(params) => params,
            None => {
                debug!("empty ping without remembered parameters");
                return respond(ping_status::MISSING_PARAMETERS, &[]);
            }
        },
    };
    if params.collection_ids.is_empty() {
        return respond(ping_status::MISSING_PARAMETERS, &[]);
    }

    info!(
        heartbeat = params.heartbeat_secs,
        folders = params.collection_ids.len(),
        "ping suspended"
    );

    // Register for cancellation before subscribing so a racing second Ping
    // cannot slip between the two
    let token = ctx.change_hub.register_ping(principal.id, &device.device_id);
    let mut cancelled = std::pin::pin!(token.notified());
    cancelled.as_mut().enable();
    let changes = ctx.change_hub.subscribe(principal.id, &params.collection_ids);

    let outcome = tokio::select! {
        changed = changes.recv() => match changed {
            Ok(collection_id) => {
                // Gather any further notifications that are already queued
                let mut all = BTreeSet::from([collection_id]);
                while let Ok(more) = changes.try_recv() {
                    all.insert(more);
                }
                Some(all)
            }
            Err(_) => None,
        },
        () = tokio::time::sleep(Duration::from_secs(params.heartbeat_secs)) => None,
        () = &mut cancelled => {
            debug!("ping cancelled by newer ping from same device");
            None
        }
    };
    ctx.change_hub
        .deregister_ping(principal.id, &device.device_id, &token);

    match outcome {
        Some(changed) => {
            let changed: Vec<String> = changed.into_iter().collect();
            info!(folders = ?changed, "ping reporting changes");
            respond(ping_status::CHANGES, &changed)
        }
        None => {
            debug!("ping heartbeat expired");
            respond(ping_status::HEARTBEAT_EXPIRED, &[])
        }
    }
}

fn parse_params(ctx: &Arc<AppContext>, document: &Element) -> Result<PingParams> {
    if !document.is(PAGE_PING, pg::PING) {
        return Err(Error::Protocol("Ping body must start with <Ping>".to_string()));
    }
    let heartbeat_secs = document
        .child_text(PAGE_PING, pg::HEARTBEAT_INTERVAL)
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(|requested| ctx.config.clamp_heartbeat(requested))
        .unwrap_or(ctx.config.heartbeat_min_secs);

    let collection_ids = document
        .find(PAGE_PING, pg::FOLDERS)
        .map(|folders| {
            folders
                .find_all(PAGE_PING, pg::FOLDER)
                .filter_map(|folder| folder.child_text(PAGE_PING, pg::ID))
                .collect()
        })
        .unwrap_or_default();

    Ok(PingParams {
        heartbeat_secs,
        collection_ids,
    })
}

fn respond(status_value: u8, changed: &[String]) -> Result<CommandResponse> {
    let mut writer = WbxmlWriter::new();
    writer.start_tag(PAGE_PING, pg::PING);
    writer.text_element(PAGE_PING, pg::STATUS, &status_value.to_string())?;
    if !changed.is_empty() {
        writer.start_tag(PAGE_PING, pg::FOLDERS);
        for collection_id in changed {
            writer.text_element(PAGE_PING, pg::FOLDER, collection_id)?;
        }
        writer.end_tag()?;
    }
    writer.end_tag()?;
    Ok(CommandResponse::wbxml(writer.finish()?))
}
