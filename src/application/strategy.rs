//! Client strategy dispatch
//!
//! Outlook, iOS and Android disagree on initial-sync emptiness, batch
//! sizing, body-type preference and commit discipline. Each family is a
//! plain capability record; the factory is a pure function of the
//! User-Agent and DeviceType strings.

use crate::common::types::{BodyType, SyncKey};

/// MIME bodies are never sent larger than this, regardless of the client's
/// TruncationSize
pub const MIME_TRUNCATION_CAP: usize = 512_000;

/// Outlook floor for text-body truncation; some builds request sizes too
/// small to render anything
const OUTLOOK_MIN_TEXT_TRUNCATION: usize = 32_768;

/// Outlook per-batch byte budget
const OUTLOOK_BATCH_BYTE_BUDGET: usize = 51_200;

/// Behavior capabilities for one client family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStrategy {
    pub name: &'static str,
    /// Respond to SyncKey=0 with an empty collection
    pub empty_initial_response: bool,
    pub default_window_size: usize,
    pub max_window_size: usize,
    /// Body types in descending preference
    pub body_type_order: [BodyType; 3],
    /// Stage batches as pending until the client advances the key
    pub two_phase_commit: bool,
    /// Floor applied to client-requested text truncation
    min_text_truncation: Option<usize>,
    /// Stop a batch early once it carries this many payload bytes
    pub batch_byte_budget: Option<usize>,
}

/// Microsoft Outlook Desktop. Requires the empty 0->1 response and advances
/// the SyncKey unilaterally, so batches are committed at response time.
pub const OUTLOOK: ClientStrategy = ClientStrategy {
    name: "Outlook",
    empty_initial_response: true,
    default_window_size: 3,
    max_window_size: 512,
    body_type_order: [BodyType::Html, BodyType::Plain, BodyType::Mime],
    two_phase_commit: false,
    min_text_truncation: Some(OUTLOOK_MIN_TEXT_TRUNCATION),
    batch_byte_budget: Some(OUTLOOK_BATCH_BYTE_BUDGET),
};

/// Apple iOS Mail. Takes items immediately on the initial sync.
pub const IOS: ClientStrategy = ClientStrategy {
    name: "iOS",
    empty_initial_response: false,
    default_window_size: 50,
    max_window_size: 100,
    body_type_order: [BodyType::Plain, BodyType::Html, BodyType::Mime],
    two_phase_commit: true,
    min_text_truncation: None,
    batch_byte_budget: None,
};

/// Android Mail / Gmail.
pub const ANDROID: ClientStrategy = ClientStrategy {
    name: "Android",
    empty_initial_response: false,
    default_window_size: 25,
    max_window_size: 100,
    body_type_order: [BodyType::Html, BodyType::Plain, BodyType::Mime],
    two_phase_commit: true,
    min_text_truncation: None,
    batch_byte_budget: None,
};

/// Deterministic slot for unit tests: tiny windows, no special casing
pub const TESTING: ClientStrategy = ClientStrategy {
    name: "Testing",
    empty_initial_response: false,
    default_window_size: 2,
    max_window_size: 4,
    body_type_order: [BodyType::Plain, BodyType::Html, BodyType::Mime],
    two_phase_commit: true,
    min_text_truncation: None,
    batch_byte_budget: None,
};

impl ClientStrategy {
    /// Whether the client expects an empty response for this sync key
    pub fn needs_empty_initial_response(&self, client_sync_key: &SyncKey) -> bool {
        self.empty_initial_response && client_sync_key.is_zero()
    }

    /// Effective window size: absent -> default, 0 -> 1, above max -> max
    pub fn clamp_window(&self, requested: Option<usize>) -> usize {
        match requested {
            None => self.default_window_size,
            Some(0) => 1,
            Some(n) => n.min(self.max_window_size),
        }
    }

    /// Effective truncation size for a body type. MIME is always capped;
    /// text bodies honor the client's request, subject to the family floor.
    /// None means unlimited.
    pub fn truncation(
        &self,
        body_type: BodyType,
        requested: Option<usize>,
        _is_initial_sync: bool,
    ) -> Option<usize> {
        match body_type {
            BodyType::Mime => Some(requested.unwrap_or(MIME_TRUNCATION_CAP).min(MIME_TRUNCATION_CAP)),
            BodyType::Plain | BodyType::Html => match (requested, self.min_text_truncation) {
                (Some(size), Some(floor)) => Some(size.max(floor)),
                (Some(size), None) => Some(size),
                (None, _) => None,
            },
        }
    }
}

/// Pick the strategy for a client. Unknown clients get the iOS strategy,
/// the most permissive of the three.
pub fn select_strategy(user_agent: &str, device_type: &str) -> &'static ClientStrategy {
    let ua = user_agent.to_lowercase();
    let dt = device_type.to_lowercase();

    if ua.contains("outlook") || dt.contains("windowsoutlook") {
        &OUTLOOK
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
        &IOS
    } else if ua.contains("android") {
        &ANDROID
    } else {
        &IOS
    }
}
