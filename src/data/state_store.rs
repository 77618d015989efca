//! Sync State Database
//!
//! Persistent per-device ActiveSync state using SQLite: device records with
//! provisioning status, and per-collection SyncState rows implementing the
//! two-phase commit discipline. All mutation happens load-modify-store
//! within a single request; the dispatcher serializes requests per
//! (principal, device, collection).

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use crate::common::types::{Principal, SyncKey};
use crate::common::{Error, Result};

/// Device provisioning lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Unprovisioned,
    Pending,
    Provisioned,
}

/// A known (principal, device_id) pair
#[derive(Debug, Clone)]
pub struct Device {
    pub principal_id: i64,
    pub device_id: String,
    pub device_type: Option<String>,
    pub policy_key: String,
    pub is_provisioned: bool,
}

impl Device {
    pub fn provision_state(&self) -> ProvisionState {
        if self.is_provisioned {
            ProvisionState::Provisioned
        } else if self.policy_key != "0" {
            ProvisionState::Pending
        } else {
            ProvisionState::Unprovisioned
        }
    }
}

/// Per-(device, collection) synchronization state
#[derive(Debug, Clone)]
pub struct SyncState {
    pub principal_id: i64,
    pub device_id: String,
    pub collection_id: String,
    /// Last key the client confirmed
    pub current_sync_key: SyncKey,
    /// Highest item id in any confirmed batch
    pub last_acked_item_id: i64,
    /// Every item id ever included in a confirmed batch
    pub acked_item_ids: BTreeSet<i64>,
    /// Issued-but-unconfirmed batch, if any
    pub pending_sync_key: Option<SyncKey>,
    pub pending_item_ids: Option<BTreeSet<i64>>,
    pub pending_max_item_id: Option<i64>,
    /// Staged response bytes, resent verbatim when the client retries
    pub pending_response: Option<Vec<u8>>,
    /// Consecutive SyncKey=0 FolderSyncs, for loop detection
    pub foldersync_attempts: i64,
}

impl SyncState {
    fn new(principal_id: i64, device_id: &str, collection_id: &str) -> Self {
        Self {
            principal_id,
            device_id: device_id.to_string(),
            collection_id: collection_id.to_string(),
            current_sync_key: SyncKey::Zero,
            last_acked_item_id: 0,
            acked_item_ids: BTreeSet::new(),
            pending_sync_key: None,
            pending_item_ids: None,
            pending_max_item_id: None,
            pending_response: None,
            foldersync_attempts: 0,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_sync_key.is_some()
    }

    /// Stage an issued batch. Any prior pending batch is replaced; at most
    /// one exists per state.
    pub fn stage_batch(&mut self, sync_key: SyncKey, item_ids: BTreeSet<i64>, response: Vec<u8>) {
        self.pending_max_item_id = item_ids.iter().max().copied();
        self.pending_sync_key = Some(sync_key);
        self.pending_item_ids = Some(item_ids);
        self.pending_response = Some(response);
    }

    /// The client confirmed the pending batch: advance the current key and
    /// fold the batch into the acked set.
    pub fn confirm_pending(&mut self) {
        if let Some(key) = self.pending_sync_key.take() {
            self.current_sync_key = key;
        }
        if let Some(ids) = self.pending_item_ids.take() {
            self.acked_item_ids.extend(ids);
        }
        if let Some(max_id) = self.pending_max_item_id.take() {
            self.last_acked_item_id = self.last_acked_item_id.max(max_id);
        }
        self.pending_response = None;
    }

    /// The client never saw the pending batch: forget it.
    pub fn discard_pending(&mut self) {
        self.pending_sync_key = None;
        self.pending_item_ids = None;
        self.pending_max_item_id = None;
        self.pending_response = None;
    }

    /// SyncKey=0 from the client: wipe everything.
    pub fn reset(&mut self) {
        let (principal_id, device_id, collection_id) = (
            self.principal_id,
            std::mem::take(&mut self.device_id),
            std::mem::take(&mut self.collection_id),
        );
        *self = SyncState::new(principal_id, &device_id, &collection_id);
    }
}

/// SQLite-backed store for devices and sync state
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (and migrate) the state database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::Database(format!("Failed to create state dir: {}", e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open state database: {}", e)))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open memory database: {}", e)))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                principal_id INTEGER NOT NULL,
                device_id TEXT NOT NULL,
                device_type TEXT,
                policy_key TEXT NOT NULL DEFAULT '0',
                is_provisioned INTEGER NOT NULL DEFAULT 0,
                last_seen TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(principal_id, device_id)
            )",
            [],
        )
        .map_err(|e| Error::Database(format!("Failed to create devices table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sync_states (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                principal_id INTEGER NOT NULL,
                device_id TEXT NOT NULL,
                collection_id TEXT NOT NULL,
                current_sync_key TEXT NOT NULL DEFAULT '0',
                last_acked_item_id INTEGER NOT NULL DEFAULT 0,
                acked_item_ids TEXT NOT NULL DEFAULT '[]',
                pending_sync_key TEXT,
                pending_item_ids TEXT,
                pending_max_item_id INTEGER,
                pending_response BLOB,
                foldersync_attempts INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                UNIQUE(principal_id, device_id, collection_id)
            )",
            [],
        )
        .map_err(|e| Error::Database(format!("Failed to create sync_states table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sync_states_device
             ON sync_states(principal_id, device_id)",
            [],
        )
        .map_err(|e| Error::Database(format!("Failed to create index: {}", e)))?;

        // Schema migration support for existing databases
        Self::ensure_column_exists(&conn, "sync_states", "pending_response", "BLOB")?;
        Self::ensure_column_exists(
            &conn,
            "sync_states",
            "foldersync_attempts",
            "INTEGER NOT NULL DEFAULT 0",
        )?;

        Ok(())
    }

    fn ensure_column_exists(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .map_err(|e| Error::Database(format!("Failed to inspect {}: {}", table, e)))?;
        let exists = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| Error::Database(format!("Failed to inspect {}: {}", table, e)))?
            .filter_map(std::result::Result::ok)
            .any(|name| name == column);
        if !exists {
            conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
                [],
            )
            .map_err(|e| Error::Database(format!("Failed to add column {}: {}", column, e)))?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // -- devices --

    /// Load the device record, creating it on first contact. Updates
    /// last_seen and (when newly supplied) device_type.
    pub fn load_or_create_device(
        &self,
        principal: &Principal,
        device_id: &str,
        device_type: Option<&str>,
    ) -> Result<Device> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO devices (principal_id, device_id, device_type, last_seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(principal_id, device_id) DO UPDATE SET
                 last_seen = ?4,
                 device_type = COALESCE(?3, device_type)",
            params![principal.id, device_id, device_type, now],
        )
        .map_err(|e| Error::Database(format!("Failed to upsert device: {}", e)))?;

        let device = conn
            .query_row(
                "SELECT principal_id, device_id, device_type, policy_key, is_provisioned
                 FROM devices WHERE principal_id = ?1 AND device_id = ?2",
                params![principal.id, device_id],
                |row| {
                    Ok(Device {
                        principal_id: row.get(0)?,
                        device_id: row.get(1)?,
                        device_type: row.get(2)?,
                        policy_key: row.get(3)?,
                        is_provisioned: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .map_err(|e| Error::Database(format!("Failed to load device: {}", e)))?;
        Ok(device)
    }

    /// Record a freshly issued policy key (provisioning step 1)
    pub fn set_policy_key(&self, principal_id: i64, device_id: &str, policy_key: &str) -> Result<()> {
        self.lock()
            .execute(
                "UPDATE devices SET policy_key = ?3, is_provisioned = 0
                 WHERE principal_id = ?1 AND device_id = ?2",
                params![principal_id, device_id, policy_key],
            )
            .map_err(|e| Error::Database(format!("Failed to set policy key: {}", e)))?;
        Ok(())
    }

    /// Mark the device provisioned (provisioning step 2)
    pub fn mark_provisioned(&self, principal_id: i64, device_id: &str) -> Result<()> {
        self.lock()
            .execute(
                "UPDATE devices SET is_provisioned = 1
                 WHERE principal_id = ?1 AND device_id = ?2",
                params![principal_id, device_id],
            )
            .map_err(|e| Error::Database(format!("Failed to mark provisioned: {}", e)))?;
        Ok(())
    }

    // -- sync state --

    /// Load the sync state for a collection, creating a fresh record in
    /// memory when none is persisted yet.
    pub fn load_state(
        &self,
        principal_id: i64,
        device_id: &str,
        collection_id: &str,
    ) -> Result<SyncState> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT current_sync_key, last_acked_item_id, acked_item_ids,
                        pending_sync_key, pending_item_ids, pending_max_item_id,
                        pending_response, foldersync_attempts
                 FROM sync_states
                 WHERE principal_id = ?1 AND device_id = ?2 AND collection_id = ?3",
                params![principal_id, device_id, collection_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<Vec<u8>>>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to load sync state: {}", e)))?;

        let Some((current, last_acked, acked_json, pending_key, pending_json, pending_max, pending_response, attempts)) =
            row
        else {
            return Ok(SyncState::new(principal_id, device_id, collection_id));
        };

        let acked_item_ids: BTreeSet<i64> = serde_json::from_str(&acked_json)
            .map_err(|e| Error::Database(format!("Corrupt acked_item_ids: {}", e)))?;
        let pending_item_ids = pending_json
            .map(|json| serde_json::from_str::<BTreeSet<i64>>(&json))
            .transpose()
            .map_err(|e| Error::Database(format!("Corrupt pending_item_ids: {}", e)))?;

        Ok(SyncState {
            principal_id,
            device_id: device_id.to_string(),
            collection_id: collection_id.to_string(),
            current_sync_key: SyncKey::parse(&current)?,
            last_acked_item_id: last_acked,
            acked_item_ids,
            pending_sync_key: pending_key.as_deref().map(SyncKey::parse).transpose()?,
            pending_item_ids,
            pending_max_item_id: pending_max,
            pending_response,
            foldersync_attempts: attempts,
        })
    }

    /// A Sync arrived: FolderSync loop detection starts over for the device
    pub fn clear_foldersync_attempts(&self, principal_id: i64, device_id: &str) -> Result<()> {
        self.lock()
            .execute(
                "UPDATE sync_states SET foldersync_attempts = 0
                 WHERE principal_id = ?1 AND device_id = ?2 AND foldersync_attempts != 0",
                params![principal_id, device_id],
            )
            .map_err(|e| Error::Database(format!("Failed to clear foldersync attempts: {}", e)))?;
        Ok(())
    }

    /// Persist a sync state, replacing any prior row
    pub fn save_state(&self, state: &SyncState) -> Result<()> {
        let acked_json = serde_json::to_string(&state.acked_item_ids)
            .map_err(|e| Error::Database(format!("Failed to serialize acked ids: {}", e)))?;
        let pending_json = state
            .pending_item_ids
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Database(format!("Failed to serialize pending ids: {}", e)))?;
        let now = Utc::now().to_rfc3339();

        self.lock()
            .execute(
                "INSERT INTO sync_states
                     (principal_id, device_id, collection_id, current_sync_key,
                      last_acked_item_id, acked_item_ids, pending_sync_key,
                      pending_item_ids, pending_max_item_id, pending_response,
                      foldersync_attempts, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(principal_id, device_id, collection_id) DO UPDATE SET
                     current_sync_key = ?4,
                     last_acked_item_id = ?5,
                     acked_item_ids = ?6,
                     pending_sync_key = ?7,
                     pending_item_ids = ?8,
                     pending_max_item_id = ?9,
                     pending_response = ?10,
                     foldersync_attempts = ?11,
                     updated_at = ?12",
                params![
                    state.principal_id,
                    state.device_id,
                    state.collection_id,
                    state.current_sync_key.to_string(),
                    state.last_acked_item_id,
                    acked_json,
                    state.pending_sync_key.as_ref().map(ToString::to_string),
                    pending_json,
                    state.pending_max_item_id,
                    state.pending_response,
                    state.foldersync_attempts,
                    now
                ],
            )
            .map_err(|e| Error::Database(format!("Failed to save sync state: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal::new(1, "alice@example.com".to_string())
    }

    #[test]
    fn test_device_created_on_first_contact() {
        let store = StateStore::open_in_memory().unwrap();
        let device = store
            .load_or_create_device(&principal(), "DEV1", Some("iPhone"))
            .unwrap();
        assert_eq!(device.policy_key, "0");
        assert_eq!(device.provision_state(), ProvisionState::Unprovisioned);

        // Second contact reuses the row and keeps the device type
        let again = store.load_or_create_device(&principal(), "DEV1", None).unwrap();
        assert_eq!(again.device_type.as_deref(), Some("iPhone"));
    }

    #[test]
    fn test_provisioning_lifecycle() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .load_or_create_device(&principal(), "DEV1", None)
            .unwrap();
        store.set_policy_key(1, "DEV1", "346785294").unwrap();
        let device = store.load_or_create_device(&principal(), "DEV1", None).unwrap();
        assert_eq!(device.provision_state(), ProvisionState::Pending);

        store.mark_provisioned(1, "DEV1").unwrap();
        let device = store.load_or_create_device(&principal(), "DEV1", None).unwrap();
        assert_eq!(device.provision_state(), ProvisionState::Provisioned);
    }

    #[test]
    fn test_fresh_state_defaults() {
        let store = StateStore::open_in_memory().unwrap();
        let state = store.load_state(1, "DEV1", "1").unwrap();
        assert_eq!(state.current_sync_key, SyncKey::Zero);
        assert!(!state.has_pending());
        assert!(state.acked_item_ids.is_empty());
    }

    #[test]
    fn test_stage_confirm_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        let mut state = store.load_state(1, "DEV1", "1").unwrap();

        state.stage_batch(
            SyncKey::Counter(1),
            BTreeSet::from([17, 18, 19]),
            vec![0xAA, 0xBB],
        );
        store.save_state(&state).unwrap();

        let mut reloaded = store.load_state(1, "DEV1", "1").unwrap();
        assert_eq!(reloaded.pending_sync_key, Some(SyncKey::Counter(1)));
        assert_eq!(reloaded.pending_max_item_id, Some(19));
        assert_eq!(reloaded.pending_response, Some(vec![0xAA, 0xBB]));

        reloaded.confirm_pending();
        assert_eq!(reloaded.current_sync_key, SyncKey::Counter(1));
        assert_eq!(reloaded.last_acked_item_id, 19);
        assert!(reloaded.acked_item_ids.contains(&17));
        assert!(!reloaded.has_pending());
        assert!(reloaded.pending_response.is_none());
        store.save_state(&reloaded).unwrap();

        let final_state = store.load_state(1, "DEV1", "1").unwrap();
        assert_eq!(final_state.acked_item_ids.len(), 3);
    }

    #[test]
    fn test_discard_pending_keeps_current() {
        let mut state = SyncState::new(1, "DEV1", "1");
        state.current_sync_key = SyncKey::Counter(5);
        state.stage_batch(SyncKey::Counter(6), BTreeSet::from([7]), vec![1]);
        state.discard_pending();
        assert_eq!(state.current_sync_key, SyncKey::Counter(5));
        assert!(!state.has_pending());
        assert!(state.acked_item_ids.is_empty());
    }

    #[test]
    fn test_acked_and_pending_never_overlap() {
        let mut state = SyncState::new(1, "DEV1", "1");
        state.stage_batch(SyncKey::Counter(1), BTreeSet::from([1, 2]), vec![]);
        state.confirm_pending();
        state.stage_batch(SyncKey::Counter(2), BTreeSet::from([3, 4]), vec![]);
        let overlap: Vec<_> = state
            .pending_item_ids
            .as_ref()
            .unwrap()
            .intersection(&state.acked_item_ids)
            .collect();
        assert!(overlap.is_empty());
        state.confirm_pending();
        assert_eq!(state.acked_item_ids.len(), 4);
    }

    #[test]
    fn test_reset_wipes_everything() {
        let mut state = SyncState::new(7, "DEV9", "2");
        state.stage_batch(SyncKey::Counter(3), BTreeSet::from([5]), vec![1]);
        state.confirm_pending();
        state.foldersync_attempts = 2;
        state.reset();
        assert_eq!(state.principal_id, 7);
        assert_eq!(state.device_id, "DEV9");
        assert_eq!(state.collection_id, "2");
        assert_eq!(state.current_sync_key, SyncKey::Zero);
        assert_eq!(state.foldersync_attempts, 0);
        assert!(state.acked_item_ids.is_empty());
    }

    #[test]
    fn test_replacing_pending_batch() {
        let mut state = SyncState::new(1, "DEV1", "1");
        state.stage_batch(SyncKey::Counter(1), BTreeSet::from([1]), vec![1]);
        state.stage_batch(SyncKey::Counter(1), BTreeSet::from([2, 3]), vec![2]);
        assert_eq!(state.pending_item_ids.as_ref().unwrap().len(), 2);
        assert_eq!(state.pending_max_item_id, Some(3));
        assert_eq!(state.pending_response, Some(vec![2]));
    }

    #[test]
    fn test_tagged_keys_survive_persistence() {
        let store = StateStore::open_in_memory().unwrap();
        let mut state = store.load_state(1, "DEV1", "1").unwrap();
        state.current_sync_key =
            SyncKey::parse("{6ba7b810-9dad-11d1-80b4-00c04fd430c8}4").unwrap();
        store.save_state(&state).unwrap();
        let reloaded = store.load_state(1, "DEV1", "1").unwrap();
        assert_eq!(reloaded.current_sync_key.counter(), 4);
    }
}
