//! ActiveSync HTTP listener
//!
//! A small tiny_http front end: each accepted request runs on its own
//! thread and bridges onto the tokio runtime for the async handlers. TLS
//! termination belongs to whatever sits in front of this process.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server};
use tracing::{debug, error, info, warn};

use crate::application::dispatcher::{dispatch, AppContext, CommandResponse, RawRequest};
use crate::common::logging::mask_email;
use crate::common::types::Principal;
use crate::common::{Error, Result};

const ENDPOINT: &str = "/Microsoft-Server-ActiveSync";
const SERVER_VERSION: &str = "14.1";
const PROTOCOL_VERSIONS: &str = "2.5,12.0,12.1,14.0,14.1,16.0,16.1";
const PROTOCOL_COMMANDS: &str = "Provision,FolderSync,Sync,GetItemEstimate,Ping,ItemOperations";
const CONTENT_TYPE_WBXML: &str = "application/vnd.ms-sync.wbxml";

/// Credential validation seam. The gateway core only ever sees the
/// resulting principal.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> Option<Principal>;
}

/// Fixed user table, fed from configuration
pub struct StaticAuthenticator {
    users: HashMap<String, (String, Principal)>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
        }
    }

    /// Register a user under both the full address and its local part
    pub fn add_user(&mut self, principal: Principal, password: &str) {
        if let Some(local) = principal.email.split('@').next() {
            self.users.insert(
                local.to_lowercase(),
                (password.to_string(), principal.clone()),
            );
        }
        self.users.insert(
            principal.email.to_lowercase(),
            (password.to_string(), principal),
        );
    }
}

impl Default for StaticAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        let (expected, principal) = self.users.get(&username.to_lowercase())?;
        if expected == password {
            Some(principal.clone())
        } else {
            None
        }
    }
}

/// Accept loop. Blocks the calling thread; handlers run on the provided
/// tokio runtime.
pub fn run(
    ctx: Arc<AppContext>,
    authenticator: Arc<dyn Authenticator>,
    runtime: tokio::runtime::Handle,
) -> Result<()> {
    let server = Server::http(ctx.config.bind_addr.as_str())
        .map_err(|e| Error::Config(format!("Failed to bind {}: {}", ctx.config.bind_addr, e)))?;
    info!(bind = %ctx.config.bind_addr, "ActiveSync endpoint listening");

    loop {
        let request = match server.recv() {
            Ok(request) => request,
            Err(err) => {
                error!(%err, "accept failed");
                continue;
            }
        };
        let ctx = ctx.clone();
        let authenticator = authenticator.clone();
        let runtime = runtime.clone();
        std::thread::spawn(move || handle_connection(ctx, authenticator, runtime, request));
    }
}

fn handle_connection(
    ctx: Arc<AppContext>,
    authenticator: Arc<dyn Authenticator>,
    runtime: tokio::runtime::Handle,
    mut request: tiny_http::Request,
) {
    let url = request.url().to_string();
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (url.clone(), String::new()),
    };

    if *request.method() == Method::Options {
        let _ = request.respond(options_response());
        return;
    }

    if path != ENDPOINT || *request.method() != Method::Post {
        debug!(%path, method = %request.method(), "not an ActiveSync request");
        let _ = request.respond(plain_response(404));
        return;
    }

    let Some(principal) = authenticate(&request, authenticator.as_ref()) else {
        let mut response = plain_response(401);
        response.add_header(header("WWW-Authenticate", "Basic realm=\"ActiveSync\""));
        let _ = request.respond(response);
        return;
    };
    debug!(principal = %mask_email(&principal.email), "authenticated");

    let user_agent = header_value(&request, "User-Agent").unwrap_or_default();
    let policy_key_header = header_value(&request, "X-MS-PolicyKey");

    let mut body = Vec::new();
    if let Err(err) = request.as_reader().read_to_end(&mut body) {
        warn!(%err, "failed to read request body");
        let _ = request.respond(plain_response(400));
        return;
    }

    let raw = RawRequest {
        query,
        user_agent,
        policy_key_header,
        body,
    };
    let outcome = runtime.block_on(dispatch(&ctx, &principal, raw));
    let _ = request.respond(frame(outcome));
}

fn authenticate(
    request: &tiny_http::Request,
    authenticator: &dyn Authenticator,
) -> Option<Principal> {
    let raw = header_value(request, "Authorization")?;
    let encoded = raw.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (username, password) = credentials.split_once(':')?;
    authenticator.authenticate(username, password)
}

fn header_value(request: &tiny_http::Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_string())
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("static header")
}

fn frame(outcome: CommandResponse) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = Response::from_data(outcome.body).with_status_code(outcome.http_status);
    response.add_header(header("MS-Server-ActiveSync", SERVER_VERSION));
    response.add_header(header("Cache-Control", "private"));
    response.add_header(header("Content-Type", CONTENT_TYPE_WBXML));
    if let Some(policy_key) = outcome.policy_key {
        response.add_header(header("X-MS-PolicyKey", &policy_key));
    }
    response
}

fn plain_response(status: u16) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_data(Vec::new()).with_status_code(status)
}

fn options_response() -> Response<std::io::Cursor<Vec<u8>>> {
    let mut response = plain_response(200);
    response.add_header(header("MS-Server-ActiveSync", SERVER_VERSION));
    response.add_header(header("MS-ASProtocolVersions", PROTOCOL_VERSIONS));
    response.add_header(header("MS-ASProtocolCommands", PROTOCOL_COMMANDS));
    response.add_header(header("Cache-Control", "private"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_authenticator() {
        let mut auth = StaticAuthenticator::new();
        auth.add_user(Principal::new(1, "alice@example.com".to_string()), "secret");

        assert!(auth.authenticate("alice@example.com", "secret").is_some());
        assert!(auth.authenticate("ALICE@EXAMPLE.COM", "secret").is_some());
        assert!(auth.authenticate("alice", "secret").is_some());
        assert!(auth.authenticate("alice@example.com", "wrong").is_none());
        assert!(auth.authenticate("nobody", "secret").is_none());
    }
}
