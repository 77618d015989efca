//! Integration tests for Airgate
//!
//! End-to-end ActiveSync scenarios run against the dispatcher with
//! in-memory stores: provisioning, the Outlook and iOS initial-sync
//! divergence, idempotent resend, invalid-key recovery, estimates and the
//! Ping long-poll.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use airgate::application::dispatcher::{dispatch, AppContext, CommandResponse, RawRequest};
use airgate::common::config::ServerConfig;
use airgate::common::types::{Principal, SyncKey};
use airgate::data::change_hub::ChangeHub;
use airgate::data::mail_store::{MailStore, SqliteMailStore, StoredItem};
use airgate::data::state_store::StateStore;
use airgate::service::wbxml::tokens::{
    airsync, airsyncbase, estimate as est, folder_hierarchy as fh, ping as pg, provision as pv,
    PAGE_AIRSYNC, PAGE_AIRSYNCBASE, PAGE_FOLDER_HIERARCHY, PAGE_GET_ITEM_ESTIMATE,
    PAGE_ITEM_OPERATIONS, PAGE_PING, PAGE_PROVISION,
};
use airgate::service::wbxml::{parse_document, Element, Node, WbxmlWriter};

const OUTLOOK_UA: &str = "Outlook/16.0 (16.0.10730; MSExchange)";
const IOS_UA: &str = "Apple-iPhone13C2/1905.258";

struct Harness {
    ctx: Arc<AppContext>,
    mail: Arc<SqliteMailStore>,
    principal: Principal,
}

fn harness() -> Harness {
    let config = ServerConfig::default();
    let state = Arc::new(StateStore::open_in_memory().unwrap());
    let mail = Arc::new(SqliteMailStore::open_in_memory().unwrap());
    let hub = Arc::new(ChangeHub::new());
    let ctx = AppContext::new(config, state, mail.clone(), hub);
    Harness {
        ctx,
        mail,
        principal: Principal::new(1, "alice@example.com".to_string()),
    }
}

impl Harness {
    fn seed_inbox(&self, count: usize) -> Vec<i64> {
        (0..count)
            .map(|i| {
                let item = StoredItem {
                    id: 0,
                    subject: format!("Message {}", i + 1),
                    sender: "bob@example.com".to_string(),
                    recipient: "alice@example.com".to_string(),
                    received_at: Utc.with_ymd_and_hms(2024, 5, 4, 9, i as u32, 0).unwrap(),
                    is_read: false,
                    body_plain: Some(format!("plain body {}", i + 1)),
                    body_html: Some(format!("<p>html body {}</p>", i + 1)),
                    mime: None,
                };
                self.mail.add_item(&self.principal, "1", &item).unwrap()
            })
            .collect()
    }

    async fn send(&self, cmd: &str, user_agent: &str, body: Vec<u8>) -> CommandResponse {
        self.send_with_policy_key(cmd, user_agent, body, None).await
    }

    async fn send_with_policy_key(
        &self,
        cmd: &str,
        user_agent: &str,
        body: Vec<u8>,
        policy_key: Option<&str>,
    ) -> CommandResponse {
        let request = RawRequest {
            query: format!(
                "Cmd={}&User=alice@example.com&DeviceId=DEV1&DeviceType=SmartPhone",
                cmd
            ),
            user_agent: user_agent.to_string(),
            policy_key_header: policy_key.map(str::to_string),
            body,
        };
        dispatch(&self.ctx, &self.principal, request).await
    }

    /// Run the two-step Provision exchange so other commands pass the gate
    async fn provision(&self, user_agent: &str) -> String {
        let step1 = self
            .send("Provision", user_agent, provision_request(None))
            .await;
        assert_eq!(step1.http_status, 200);
        let key = step1.policy_key.clone().expect("policy key issued");
        assert_ne!(key, "0");

        let step2 = self
            .send_with_policy_key(
                "Provision",
                user_agent,
                provision_request(Some(&key)),
                Some(&key),
            )
            .await;
        assert_eq!(step2.http_status, 200);
        let root = parse_document(&step2.body).unwrap();
        assert_eq!(
            root.child_text(PAGE_PROVISION, pv::STATUS).as_deref(),
            Some("1")
        );
        key
    }
}

// -- request builders --

fn provision_request(policy_key: Option<&str>) -> Vec<u8> {
    let mut w = WbxmlWriter::new();
    w.start_tag(PAGE_PROVISION, pv::PROVISION);
    w.start_tag(PAGE_PROVISION, pv::POLICIES);
    w.start_tag(PAGE_PROVISION, pv::POLICY);
    w.text_element(PAGE_PROVISION, pv::POLICY_TYPE, "MS-EAS-Provisioning-WBXML")
        .unwrap();
    if let Some(key) = policy_key {
        w.text_element(PAGE_PROVISION, pv::POLICY_KEY, key).unwrap();
    }
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.finish().unwrap()
}

fn sync_request(sync_key: &str, collection_id: &str, window: Option<u32>) -> Vec<u8> {
    let mut w = WbxmlWriter::new();
    w.start_tag(PAGE_AIRSYNC, airsync::SYNC);
    w.start_tag(PAGE_AIRSYNC, airsync::COLLECTIONS);
    w.start_tag(PAGE_AIRSYNC, airsync::COLLECTION);
    w.text_element(PAGE_AIRSYNC, airsync::SYNC_KEY, sync_key).unwrap();
    w.text_element(PAGE_AIRSYNC, airsync::COLLECTION_ID, collection_id)
        .unwrap();
    w.start_tag(PAGE_AIRSYNC, airsync::GET_CHANGES);
    w.end_tag().unwrap();
    if let Some(window) = window {
        w.text_element(PAGE_AIRSYNC, airsync::WINDOW_SIZE, &window.to_string())
            .unwrap();
    }
    w.start_tag(PAGE_AIRSYNC, airsync::OPTIONS);
    w.start_tag(PAGE_AIRSYNCBASE, airsyncbase::BODY_PREFERENCE);
    w.text_element(PAGE_AIRSYNCBASE, airsyncbase::TYPE, "1").unwrap();
    w.text_element(PAGE_AIRSYNCBASE, airsyncbase::TRUNCATION_SIZE, "32768")
        .unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.finish().unwrap()
}

fn foldersync_request(sync_key: &str) -> Vec<u8> {
    let mut w = WbxmlWriter::new();
    w.start_tag(PAGE_FOLDER_HIERARCHY, fh::FOLDER_SYNC);
    w.text_element(PAGE_FOLDER_HIERARCHY, fh::SYNC_KEY, sync_key).unwrap();
    w.end_tag().unwrap();
    w.finish().unwrap()
}

fn estimate_request(sync_key: &str, collection_id: &str) -> Vec<u8> {
    let mut w = WbxmlWriter::new();
    w.start_tag(PAGE_GET_ITEM_ESTIMATE, est::GET_ITEM_ESTIMATE);
    w.start_tag(PAGE_GET_ITEM_ESTIMATE, est::COLLECTIONS);
    w.start_tag(PAGE_GET_ITEM_ESTIMATE, est::COLLECTION);
    w.text_element(PAGE_AIRSYNC, airsync::SYNC_KEY, sync_key).unwrap();
    w.text_element(PAGE_GET_ITEM_ESTIMATE, est::COLLECTION_ID, collection_id)
        .unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.finish().unwrap()
}

fn ping_request(heartbeat: u64, folders: &[&str]) -> Vec<u8> {
    let mut w = WbxmlWriter::new();
    w.start_tag(PAGE_PING, pg::PING);
    w.text_element(PAGE_PING, pg::HEARTBEAT_INTERVAL, &heartbeat.to_string())
        .unwrap();
    w.start_tag(PAGE_PING, pg::FOLDERS);
    for folder in folders {
        w.start_tag(PAGE_PING, pg::FOLDER);
        w.text_element(PAGE_PING, pg::ID, folder).unwrap();
        w.text_element(PAGE_PING, pg::CLASS, "Email").unwrap();
        w.end_tag().unwrap();
    }
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.finish().unwrap()
}

fn fetch_request(server_id: &str, body_type: &str) -> Vec<u8> {
    use airgate::service::wbxml::tokens::item_operations as io;
    let mut w = WbxmlWriter::new();
    w.start_tag(PAGE_ITEM_OPERATIONS, io::ITEM_OPERATIONS);
    w.start_tag(PAGE_ITEM_OPERATIONS, io::FETCH);
    w.text_element(PAGE_ITEM_OPERATIONS, io::STORE, "Mailbox").unwrap();
    w.text_element(PAGE_AIRSYNC, airsync::SERVER_ID, server_id).unwrap();
    w.start_tag(PAGE_ITEM_OPERATIONS, io::OPTIONS);
    w.start_tag(PAGE_AIRSYNCBASE, airsyncbase::BODY_PREFERENCE);
    w.text_element(PAGE_AIRSYNCBASE, airsyncbase::TYPE, body_type).unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.finish().unwrap()
}

// -- response helpers --

fn sync_collection(response: &CommandResponse) -> Element {
    let root = parse_document(&response.body).unwrap();
    root.find(PAGE_AIRSYNC, airsync::COLLECTIONS)
        .and_then(|c| c.find(PAGE_AIRSYNC, airsync::COLLECTION))
        .expect("sync response has a collection")
        .clone()
}

fn adds_in(collection: &Element) -> usize {
    collection
        .find(PAGE_AIRSYNC, airsync::COMMANDS)
        .map(|commands| commands.find_all(PAGE_AIRSYNC, airsync::ADD).count())
        .unwrap_or(0)
}

fn sync_key_of(collection: &Element) -> String {
    collection.child_text(PAGE_AIRSYNC, airsync::SYNC_KEY).unwrap()
}

// ── Provisioning ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_provision_gate_and_two_step_exchange() {
    let h = harness();

    // Unprovisioned device: any non-Provision command gets 449
    let gated = h.send("Sync", IOS_UA, sync_request("0", "1", None)).await;
    assert_eq!(gated.http_status, 449);
    assert_eq!(gated.policy_key.as_deref(), Some("0"));
    assert!(gated.body.is_empty());

    let key = h.provision(IOS_UA).await;
    assert!(key.parse::<u32>().unwrap() > 0);

    // The gate is open now
    let synced = h.send("Sync", IOS_UA, sync_request("0", "1", None)).await;
    assert_eq!(synced.http_status, 200);
}

#[tokio::test]
async fn test_provision_wrong_key_rejected() {
    let h = harness();
    let step1 = h.send("Provision", IOS_UA, provision_request(None)).await;
    assert!(step1.policy_key.is_some());

    let bad = h
        .send_with_policy_key("Provision", IOS_UA, provision_request(Some("12345")), Some("12345"))
        .await;
    let root = parse_document(&bad.body).unwrap();
    assert_eq!(root.child_text(PAGE_PROVISION, pv::STATUS).as_deref(), Some("5"));

    // Still gated
    let gated = h.send("FolderSync", IOS_UA, foldersync_request("0")).await;
    assert_eq!(gated.http_status, 449);
}

// ── FolderSync ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_foldersync_initial_and_followup() {
    let h = harness();
    h.provision(IOS_UA).await;

    let initial = h.send("FolderSync", IOS_UA, foldersync_request("0")).await;
    let root = parse_document(&initial.body).unwrap();
    assert_eq!(root.child_text(PAGE_FOLDER_HIERARCHY, fh::STATUS).as_deref(), Some("1"));
    assert_eq!(root.child_text(PAGE_FOLDER_HIERARCHY, fh::SYNC_KEY).as_deref(), Some("1"));
    let changes = root.find(PAGE_FOLDER_HIERARCHY, fh::CHANGES).unwrap();
    assert_eq!(changes.child_text(PAGE_FOLDER_HIERARCHY, fh::COUNT).as_deref(), Some("7"));
    let adds: Vec<_> = changes.find_all(PAGE_FOLDER_HIERARCHY, fh::ADD).collect();
    assert_eq!(adds.len(), 7);
    assert_eq!(
        adds[0].child_text(PAGE_FOLDER_HIERARCHY, fh::SERVER_ID).as_deref(),
        Some("1")
    );
    assert_eq!(
        adds[0].child_text(PAGE_FOLDER_HIERARCHY, fh::TYPE).as_deref(),
        Some("2")
    );

    // Prior key: empty change set, key still advances
    let followup = h.send("FolderSync", IOS_UA, foldersync_request("1")).await;
    let root = parse_document(&followup.body).unwrap();
    assert_eq!(root.child_text(PAGE_FOLDER_HIERARCHY, fh::SYNC_KEY).as_deref(), Some("2"));
    let changes = root.find(PAGE_FOLDER_HIERARCHY, fh::CHANGES).unwrap();
    assert_eq!(changes.child_text(PAGE_FOLDER_HIERARCHY, fh::COUNT).as_deref(), Some("0"));
}

#[tokio::test]
async fn test_foldersync_loop_stays_valid() {
    let h = harness();
    h.provision(IOS_UA).await;

    // A client stuck re-sending SyncKey=0 keeps getting valid hierarchies
    for _ in 0..5 {
        let response = h.send("FolderSync", IOS_UA, foldersync_request("0")).await;
        assert_eq!(response.http_status, 200);
        let root = parse_document(&response.body).unwrap();
        assert_eq!(root.child_text(PAGE_FOLDER_HIERARCHY, fh::STATUS).as_deref(), Some("1"));
    }
}

// ── Sync scenarios ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_outlook_initial_sync_zero_one_two() {
    let h = harness();
    h.provision(OUTLOOK_UA).await;
    h.seed_inbox(5);

    // 0 -> 1: empty response regardless of inventory
    let first = h.send("Sync", OUTLOOK_UA, sync_request("0", "1", Some(3))).await;
    let collection = sync_collection(&first);
    assert_eq!(sync_key_of(&collection), "1");
    assert_eq!(
        collection.child_text(PAGE_AIRSYNC, airsync::STATUS).as_deref(),
        Some("1")
    );
    assert_eq!(
        collection.child_text(PAGE_AIRSYNC, airsync::CLASS).as_deref(),
        Some("Email")
    );
    assert!(collection.find(PAGE_AIRSYNC, airsync::COMMANDS).is_none());
    assert!(collection.find(PAGE_AIRSYNC, airsync::MORE_AVAILABLE).is_none());

    // 1 -> 2: first real batch, windowed to 3, more available
    let second = h.send("Sync", OUTLOOK_UA, sync_request("1", "1", Some(3))).await;
    let collection = sync_collection(&second);
    assert_eq!(sync_key_of(&collection), "2");
    assert_eq!(adds_in(&collection), 3);
    assert!(collection.find(PAGE_AIRSYNC, airsync::MORE_AVAILABLE).is_some());

    // 2 -> 3: the rest, nothing more
    let third = h.send("Sync", OUTLOOK_UA, sync_request("2", "1", Some(3))).await;
    let collection = sync_collection(&third);
    assert_eq!(sync_key_of(&collection), "3");
    assert_eq!(adds_in(&collection), 2);
    assert!(collection.find(PAGE_AIRSYNC, airsync::MORE_AVAILABLE).is_none());
}

#[tokio::test]
async fn test_ios_initial_sync_gets_items_immediately() {
    let h = harness();
    h.provision(IOS_UA).await;
    h.seed_inbox(5);

    let response = h.send("Sync", IOS_UA, sync_request("0", "1", Some(50))).await;
    let collection = sync_collection(&response);
    assert_eq!(sync_key_of(&collection), "1");
    assert_eq!(adds_in(&collection), 5);
    assert!(collection.find(PAGE_AIRSYNC, airsync::MORE_AVAILABLE).is_none());
}

#[tokio::test]
async fn test_sync_canonical_collection_child_order() {
    let h = harness();
    h.provision(IOS_UA).await;
    h.seed_inbox(3);

    let response = h.send("Sync", IOS_UA, sync_request("0", "1", Some(2))).await;
    let collection = sync_collection(&response);
    let order: Vec<u8> = collection
        .children
        .iter()
        .filter_map(|node| match node {
            Node::Element(el) if el.page == PAGE_AIRSYNC => Some(el.token),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec![
            airsync::SYNC_KEY,
            airsync::COLLECTION_ID,
            airsync::STATUS,
            airsync::CLASS,
            airsync::COMMANDS,
            airsync::MORE_AVAILABLE,
        ]
    );
}

#[tokio::test]
async fn test_sync_response_round_trips_through_codec() {
    let h = harness();
    h.provision(IOS_UA).await;
    h.seed_inbox(2);

    let response = h.send("Sync", IOS_UA, sync_request("0", "1", None)).await;
    let root = parse_document(&response.body).unwrap();
    let mut writer = WbxmlWriter::new();
    writer.write_element(&root).unwrap();
    assert_eq!(writer.finish().unwrap(), response.body);
}

#[tokio::test]
async fn test_idempotent_resend_is_byte_identical() {
    let h = harness();
    h.provision(IOS_UA).await;
    let ids = h.seed_inbox(6);

    // 0 -> 1: first batch of 2 staged as pending
    let first = h.send("Sync", IOS_UA, sync_request("0", "1", Some(2))).await;
    assert_eq!(adds_in(&sync_collection(&first)), 2);

    // Confirm 1, receive batch 2
    let second = h.send("Sync", IOS_UA, sync_request("1", "1", Some(2))).await;
    let second_collection = sync_collection(&second);
    assert_eq!(sync_key_of(&second_collection), "2");

    // The client lost batch 2 and retries with key 1: byte-identical resend
    let resent = h.send("Sync", IOS_UA, sync_request("1", "1", Some(2))).await;
    assert_eq!(resent.body, second.body);

    // Confirming 2 moves on to the third batch
    let third = h.send("Sync", IOS_UA, sync_request("2", "1", Some(2))).await;
    let third_collection = sync_collection(&third);
    assert_eq!(sync_key_of(&third_collection), "3");
    assert_eq!(adds_in(&third_collection), 2);

    // After the confirms, the first four ids are acked with no duplicates
    let state = h.ctx.state_store.load_state(1, "DEV1", "1").unwrap();
    assert_eq!(state.current_sync_key, SyncKey::Counter(2));
    let acked: Vec<i64> = state.acked_item_ids.iter().copied().collect();
    assert_eq!(acked, ids[..4].to_vec());
    let pending = state.pending_item_ids.unwrap();
    assert!(pending.is_disjoint(&state.acked_item_ids));
}

#[tokio::test]
async fn test_invalid_sync_key_resets_state() {
    let h = harness();
    h.provision(IOS_UA).await;
    h.seed_inbox(3);

    // Establish some state
    h.send("Sync", IOS_UA, sync_request("0", "1", Some(2))).await;
    h.send("Sync", IOS_UA, sync_request("1", "1", Some(2))).await;

    let response = h.send("Sync", IOS_UA, sync_request("99", "1", None)).await;
    assert_eq!(response.http_status, 200);
    let collection = sync_collection(&response);
    assert_eq!(
        collection.child_text(PAGE_AIRSYNC, airsync::STATUS).as_deref(),
        Some("3")
    );
    assert_eq!(adds_in(&collection), 0);

    let state = h.ctx.state_store.load_state(1, "DEV1", "1").unwrap();
    assert_eq!(state.current_sync_key, SyncKey::Zero);
    assert!(state.acked_item_ids.is_empty());
    assert!(!state.has_pending());
}

#[tokio::test]
async fn test_unknown_collection_is_in_band_status_8() {
    let h = harness();
    h.provision(IOS_UA).await;

    let response = h.send("Sync", IOS_UA, sync_request("0", "999", None)).await;
    assert_eq!(response.http_status, 200);
    let collection = sync_collection(&response);
    assert_eq!(
        collection.child_text(PAGE_AIRSYNC, airsync::STATUS).as_deref(),
        Some("8")
    );
}

#[tokio::test]
async fn test_window_size_zero_treated_as_one() {
    let h = harness();
    h.provision(IOS_UA).await;
    h.seed_inbox(3);

    let response = h.send("Sync", IOS_UA, sync_request("0", "1", Some(0))).await;
    let collection = sync_collection(&response);
    assert_eq!(adds_in(&collection), 1);
    assert!(collection.find(PAGE_AIRSYNC, airsync::MORE_AVAILABLE).is_some());
}

#[tokio::test]
async fn test_malformed_wbxml_is_http_400() {
    let h = harness();
    h.provision(IOS_UA).await;

    let response = h.send("Sync", IOS_UA, vec![0xDE, 0xAD, 0xBE, 0xEF]).await;
    assert_eq!(response.http_status, 400);

    // State was not touched by the bad request
    let state = h.ctx.state_store.load_state(1, "DEV1", "1").unwrap();
    assert_eq!(state.current_sync_key, SyncKey::Zero);
}

// ── GetItemEstimate ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_estimate_counts_unsynced_items() {
    let h = harness();
    h.provision(IOS_UA).await;
    h.seed_inbox(5);

    let response = h
        .send("GetItemEstimate", IOS_UA, estimate_request("0", "1"))
        .await;
    let root = parse_document(&response.body).unwrap();
    let resp = root.find(PAGE_GET_ITEM_ESTIMATE, est::RESPONSE).unwrap();
    assert_eq!(
        resp.child_text(PAGE_GET_ITEM_ESTIMATE, est::STATUS).as_deref(),
        Some("1")
    );
    let collection = resp.find(PAGE_GET_ITEM_ESTIMATE, est::COLLECTION).unwrap();
    assert_eq!(
        collection.child_text(PAGE_GET_ITEM_ESTIMATE, est::ESTIMATE).as_deref(),
        Some("5")
    );

    // Sync two and confirm; the estimate shrinks
    h.send("Sync", IOS_UA, sync_request("0", "1", Some(2))).await;
    h.send("Sync", IOS_UA, sync_request("1", "1", Some(2))).await;
    let response = h
        .send("GetItemEstimate", IOS_UA, estimate_request("2", "1"))
        .await;
    let root = parse_document(&response.body).unwrap();
    let resp = root.find(PAGE_GET_ITEM_ESTIMATE, est::RESPONSE).unwrap();
    let collection = resp.find(PAGE_GET_ITEM_ESTIMATE, est::COLLECTION).unwrap();
    // Two confirmed, two staged pending, one untouched: a Sync now would
    // resend the staged two and then the last one
    assert_eq!(
        collection.child_text(PAGE_GET_ITEM_ESTIMATE, est::ESTIMATE).as_deref(),
        Some("3")
    );
}

#[tokio::test]
async fn test_estimate_invalid_key_is_status_4() {
    let h = harness();
    h.provision(IOS_UA).await;

    let response = h
        .send("GetItemEstimate", IOS_UA, estimate_request("42", "1"))
        .await;
    let root = parse_document(&response.body).unwrap();
    let resp = root.find(PAGE_GET_ITEM_ESTIMATE, est::RESPONSE).unwrap();
    assert_eq!(
        resp.child_text(PAGE_GET_ITEM_ESTIMATE, est::STATUS).as_deref(),
        Some("4")
    );
}

// ── Ping ────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_ping_times_out_with_status_1() {
    let h = harness();
    h.provision(IOS_UA).await;

    let started = tokio::time::Instant::now();
    let response = h.send("Ping", IOS_UA, ping_request(60, &["1"])).await;
    let elapsed = started.elapsed();

    let root = parse_document(&response.body).unwrap();
    assert_eq!(root.child_text(PAGE_PING, pg::STATUS).as_deref(), Some("1"));
    assert!(root.find(PAGE_PING, pg::FOLDERS).is_none());
    assert!(elapsed >= std::time::Duration::from_secs(60));
    assert!(elapsed < std::time::Duration::from_secs(61));
}

#[tokio::test(start_paused = true)]
async fn test_ping_reports_changed_collection() {
    let h = harness();
    h.provision(IOS_UA).await;

    let hub = h.ctx.change_hub.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        hub.publish(1, "1");
    });

    let response = h.send("Ping", IOS_UA, ping_request(120, &["1", "4"])).await;
    let root = parse_document(&response.body).unwrap();
    assert_eq!(root.child_text(PAGE_PING, pg::STATUS).as_deref(), Some("2"));
    let folders = root.find(PAGE_PING, pg::FOLDERS).unwrap();
    let changed: Vec<_> = folders
        .find_all(PAGE_PING, pg::FOLDER)
        .filter_map(Element::text)
        .collect();
    assert_eq!(changed, vec!["1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_ping_ignores_unwatched_collection() {
    let h = harness();
    h.provision(IOS_UA).await;

    let hub = h.ctx.change_hub.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        hub.publish(1, "4"); // Sent Items, not watched
    });

    let response = h.send("Ping", IOS_UA, ping_request(60, &["1"])).await;
    let root = parse_document(&response.body).unwrap();
    assert_eq!(root.child_text(PAGE_PING, pg::STATUS).as_deref(), Some("1"));
}

// ── ItemOperations ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_returns_mime_properties() {
    use airgate::service::wbxml::tokens::item_operations as io;
    let h = harness();
    h.provision(IOS_UA).await;
    let ids = h.seed_inbox(1);

    let response = h
        .send(
            "ItemOperations",
            IOS_UA,
            fetch_request(&format!("1:{}", ids[0]), "4"),
        )
        .await;
    let root = parse_document(&response.body).unwrap();
    assert_eq!(
        root.child_text(PAGE_ITEM_OPERATIONS, io::STATUS).as_deref(),
        Some("1")
    );
    let fetch = root
        .find(PAGE_ITEM_OPERATIONS, io::RESPONSE)
        .and_then(|r| r.find(PAGE_ITEM_OPERATIONS, io::FETCH))
        .unwrap();
    assert_eq!(
        fetch.child_text(PAGE_ITEM_OPERATIONS, io::STATUS).as_deref(),
        Some("1")
    );
    assert_eq!(
        fetch.child_text(PAGE_AIRSYNC, airsync::SERVER_ID).as_deref(),
        Some(format!("1:{}", ids[0]).as_str())
    );
    let properties = fetch.find(PAGE_ITEM_OPERATIONS, io::PROPERTIES).unwrap();
    let body = properties.find(PAGE_AIRSYNCBASE, airsyncbase::BODY).unwrap();
    assert_eq!(
        body.child_text(PAGE_AIRSYNCBASE, airsyncbase::TYPE).as_deref(),
        Some("4")
    );
    let mime = body
        .find(PAGE_AIRSYNCBASE, airsyncbase::DATA)
        .unwrap()
        .opaque()
        .expect("MIME data is opaque")
        .to_vec();
    assert!(String::from_utf8_lossy(&mime).contains("Subject: Message 1"));
}

#[tokio::test]
async fn test_fetch_unknown_item_is_status_8() {
    use airgate::service::wbxml::tokens::item_operations as io;
    let h = harness();
    h.provision(IOS_UA).await;

    let response = h
        .send("ItemOperations", IOS_UA, fetch_request("1:4242", "4"))
        .await;
    let root = parse_document(&response.body).unwrap();
    let fetch = root
        .find(PAGE_ITEM_OPERATIONS, io::RESPONSE)
        .and_then(|r| r.find(PAGE_ITEM_OPERATIONS, io::FETCH))
        .unwrap();
    assert_eq!(
        fetch.child_text(PAGE_ITEM_OPERATIONS, io::STATUS).as_deref(),
        Some("8")
    );
}

#[tokio::test]
async fn test_empty_folder_contents_clears_and_resets() {
    use airgate::service::wbxml::tokens::item_operations as io;
    let h = harness();
    h.provision(IOS_UA).await;
    h.seed_inbox(3);

    // Sync once so there is state to reset
    h.send("Sync", IOS_UA, sync_request("0", "1", None)).await;

    let mut w = WbxmlWriter::new();
    w.start_tag(PAGE_ITEM_OPERATIONS, io::ITEM_OPERATIONS);
    w.start_tag(PAGE_ITEM_OPERATIONS, io::EMPTY_FOLDER_CONTENTS);
    w.text_element(PAGE_AIRSYNC, airsync::COLLECTION_ID, "1").unwrap();
    w.start_tag(PAGE_ITEM_OPERATIONS, io::OPTIONS);
    w.start_tag(PAGE_ITEM_OPERATIONS, io::DELETE_SUB_FOLDERS);
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    w.end_tag().unwrap();
    let response = h.send("ItemOperations", IOS_UA, w.finish().unwrap()).await;

    let root = parse_document(&response.body).unwrap();
    let op = root
        .find(PAGE_ITEM_OPERATIONS, io::RESPONSE)
        .and_then(|r| r.find(PAGE_ITEM_OPERATIONS, io::EMPTY_FOLDER_CONTENTS))
        .unwrap();
    assert_eq!(
        op.child_text(PAGE_ITEM_OPERATIONS, io::STATUS).as_deref(),
        Some("1")
    );

    assert_eq!(
        h.mail
            .count_new(&h.principal, "1", 0, &BTreeSet::new())
            .unwrap(),
        0
    );
    let state = h.ctx.state_store.load_state(1, "DEV1", "1").unwrap();
    assert_eq!(state.current_sync_key, SyncKey::Zero);
}

// ── Dispatcher edges ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_query_params_rejected() {
    let h = harness();
    let request = RawRequest {
        query: "User=alice@example.com&DeviceId=DEV1".to_string(),
        user_agent: IOS_UA.to_string(),
        policy_key_header: None,
        body: Vec::new(),
    };
    let response = dispatch(&h.ctx, &h.principal, request).await;
    assert_eq!(response.http_status, 400);
}

#[tokio::test]
async fn test_user_mismatch_rejected() {
    let h = harness();
    let request = RawRequest {
        query: "Cmd=FolderSync&User=mallory@example.com&DeviceId=DEV1".to_string(),
        user_agent: IOS_UA.to_string(),
        policy_key_header: None,
        body: foldersync_request("0"),
    };
    let response = dispatch(&h.ctx, &h.principal, request).await;
    assert_eq!(response.http_status, 401);
}
