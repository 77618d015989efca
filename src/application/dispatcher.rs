//! Command dispatch
//!
//! Parses the ActiveSync query string, applies the provisioning gate,
//! serializes per-(device, collection) work, routes to the command handler
//! and frames the response for the HTTP surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info_span, trace, warn, Instrument};

use crate::common::config::ServerConfig;
use crate::common::logging::mask_email;
use crate::common::types::Principal;
use crate::common::{Error, Result};
use crate::data::change_hub::ChangeHub;
use crate::data::mail_store::MailStore;
use crate::data::state_store::{Device, StateStore};
use crate::service::wbxml::{parse_document, to_hex, Element};

use crate::application::handlers;
use crate::application::strategy::{select_strategy, ClientStrategy};

/// Parameters remembered from the last Ping with a body, so an empty
/// re-Ping can reuse them
#[derive(Debug, Clone)]
pub struct PingParams {
    pub heartbeat_secs: u64,
    pub collection_ids: Vec<String>,
}

/// Shared application state threaded through every handler
pub struct AppContext {
    pub config: ServerConfig,
    pub state_store: Arc<StateStore>,
    pub mail_store: Arc<dyn MailStore>,
    pub change_hub: Arc<ChangeHub>,
    collection_locks: Mutex<HashMap<(i64, String, String), Arc<tokio::sync::Mutex<()>>>>,
    ping_params: Mutex<HashMap<(i64, String), PingParams>>,
}

impl AppContext {
    pub fn new(
        config: ServerConfig,
        state_store: Arc<StateStore>,
        mail_store: Arc<dyn MailStore>,
        change_hub: Arc<ChangeHub>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            state_store,
            mail_store,
            change_hub,
            collection_locks: Mutex::new(HashMap::new()),
            ping_params: Mutex::new(HashMap::new()),
        })
    }

    /// Serialize request handling per (principal, device, collection).
    /// Sync and GetItemEstimate hold this for their whole handler; Ping
    /// must never hold it across a suspension.
    pub(crate) async fn lock_collection(
        &self,
        principal_id: i64,
        device_id: &str,
        collection_id: &str,
    ) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.collection_locks.lock().unwrap();
            locks
                .entry((principal_id, device_id.to_string(), collection_id.to_string()))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub(crate) fn remember_ping_params(&self, principal_id: i64, device_id: &str, params: PingParams) {
        self.ping_params
            .lock()
            .unwrap()
            .insert((principal_id, device_id.to_string()), params);
    }

    pub(crate) fn recall_ping_params(&self, principal_id: i64, device_id: &str) -> Option<PingParams> {
        self.ping_params
            .lock()
            .unwrap()
            .get(&(principal_id, device_id.to_string()))
            .cloned()
    }
}

/// An authenticated ActiveSync request, before query parsing
pub struct RawRequest {
    pub query: String,
    pub user_agent: String,
    pub policy_key_header: Option<String>,
    pub body: Vec<u8>,
}

/// Framed handler outcome for the HTTP surface
pub struct CommandResponse {
    pub http_status: u16,
    pub policy_key: Option<String>,
    pub body: Vec<u8>,
}

impl CommandResponse {
    pub fn wbxml(body: Vec<u8>) -> Self {
        Self {
            http_status: 200,
            policy_key: None,
            body,
        }
    }

    pub fn http(status: u16) -> Self {
        Self {
            http_status: status,
            policy_key: None,
            body: Vec::new(),
        }
    }

    /// HTTP 449: run Provision, then retry
    pub fn retry_after_provision() -> Self {
        Self {
            http_status: 449,
            policy_key: Some("0".to_string()),
            body: Vec::new(),
        }
    }
}

/// Query parameters of `POST /Microsoft-Server-ActiveSync?...`
#[derive(Debug, Default)]
struct QueryParams {
    cmd: Option<String>,
    user: Option<String>,
    device_id: Option<String>,
    device_type: Option<String>,
}

fn parse_query(query: &str) -> QueryParams {
    let mut params = QueryParams::default();
    for pair in query.trim_start_matches('?').split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = percent_decode(value);
        match key {
            k if k.eq_ignore_ascii_case("Cmd") => params.cmd = Some(value),
            k if k.eq_ignore_ascii_case("User") => params.user = Some(value),
            k if k.eq_ignore_ascii_case("DeviceId") => params.device_id = Some(value),
            k if k.eq_ignore_ascii_case("DeviceType") => params.device_type = Some(value),
            _ => {}
        }
    }
    params
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match raw
                    .get(i + 1..i + 3)
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Route one authenticated request to its handler
pub async fn dispatch(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    request: RawRequest,
) -> CommandResponse {
    let params = parse_query(&request.query);
    let Some(cmd) = params.cmd else {
        warn!("request without Cmd parameter");
        return CommandResponse::http(400);
    };
    let Some(device_id) = params.device_id else {
        warn!(%cmd, "request without DeviceId parameter");
        return CommandResponse::http(400);
    };

    // The authenticated principal must be the mailbox named in the query
    if let Some(user) = &params.user {
        if !user.eq_ignore_ascii_case(&principal.email)
            && !principal
                .email
                .split('@')
                .next()
                .is_some_and(|local| user.eq_ignore_ascii_case(local))
        {
            warn!(
                %cmd,
                user = %mask_email(user),
                principal = %mask_email(&principal.email),
                "User parameter does not match authenticated principal"
            );
            return CommandResponse::http(401);
        }
    }

    let span = info_span!(
        "eas_command",
        cmd = %cmd,
        device_id = %device_id,
        principal = %mask_email(&principal.email)
    );
    handle_command(ctx, principal, &cmd, &device_id, params.device_type, request)
        .instrument(span)
        .await
}

async fn handle_command(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    cmd: &str,
    device_id: &str,
    device_type: Option<String>,
    request: RawRequest,
) -> CommandResponse {
    let device = match ctx
        .state_store
        .load_or_create_device(principal, device_id, device_type.as_deref())
    {
        Ok(device) => device,
        Err(err) => {
            error!(%err, "failed to load device");
            return CommandResponse::http(500);
        }
    };

    // Everything except Provision is gated on a provisioned device
    if !device.is_provisioned && cmd != "Provision" {
        debug!("unprovisioned device, answering 449");
        return CommandResponse::retry_after_provision();
    }

    let strategy = select_strategy(&request.user_agent, device.device_type.as_deref().unwrap_or(""));
    debug!(strategy = strategy.name, "selected client strategy");

    // An empty body is only meaningful for Ping (parameter reuse)
    let document = if request.body.is_empty() {
        None
    } else {
        trace!(body = %to_hex(&request.body), "request WBXML");
        match parse_document(&request.body) {
            Ok(document) => Some(document),
            Err(err) => {
                warn!(%err, "undecodable request body");
                return CommandResponse::http(400);
            }
        }
    };

    let outcome = route(ctx, principal, &device, strategy, cmd, document.as_ref(), &request).await;

    match outcome {
        Ok(response) => {
            trace!(body = %to_hex(&response.body), "response WBXML");
            response
        }
        Err(Error::Codec(err)) => {
            warn!(%err, "malformed request");
            CommandResponse::http(400)
        }
        Err(Error::Protocol(err)) => {
            warn!(%err, "protocol violation");
            CommandResponse::http(400)
        }
        Err(Error::Store(err)) => {
            error!(%err, "mail store unavailable");
            CommandResponse::http(503)
        }
        Err(err) => {
            error!(%err, "command failed");
            CommandResponse::http(500)
        }
    }
}

async fn route(
    ctx: &Arc<AppContext>,
    principal: &Principal,
    device: &Device,
    strategy: &'static ClientStrategy,
    cmd: &str,
    document: Option<&Element>,
    request: &RawRequest,
) -> Result<CommandResponse> {
    let require_document = || {
        document.ok_or_else(|| Error::Protocol(format!("{} requires a request body", cmd)))
    };

    match cmd {
        "Provision" => {
            handlers::provision::handle(
                ctx,
                principal,
                device,
                require_document()?,
                request.policy_key_header.as_deref(),
            )
            .await
        }
        "FolderSync" => handlers::folder_sync::handle(ctx, principal, device, require_document()?).await,
        "Sync" => handlers::sync::handle(ctx, principal, device, strategy, require_document()?).await,
        "GetItemEstimate" => {
            handlers::estimate::handle(ctx, principal, device, require_document()?).await
        }
        "Ping" => handlers::ping::handle(ctx, principal, device, document).await,
        "ItemOperations" => {
            handlers::item_ops::handle(ctx, principal, device, strategy, require_document()?).await
        }
        other => Err(Error::Protocol(format!("unsupported command: {}", other))),
    }
}
