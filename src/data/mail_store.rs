//! Mail store facade
//!
//! Thin read contract over the mailbox backend the gateway syncs against.
//! Item ids are opaque positive integers with no ordering guarantee, which
//! is why pagination carries an explicit exclusion set next to the floor id.
//! The single mutation, `empty_folder`, exists for
//! ItemOperations::EmptyFolderContents.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use crate::common::types::{FolderType, Principal};
use crate::common::{Error, Result};
use crate::service::mime::{self, MimeSource};

/// A mail item projected into Sync responses
#[derive(Debug, Clone)]
pub struct StoredItem {
    pub id: i64,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub body_plain: Option<String>,
    pub body_html: Option<String>,
    pub mime: Option<Vec<u8>>,
}

/// A folder in the exposed hierarchy
#[derive(Debug, Clone)]
pub struct Folder {
    pub collection_id: String,
    pub parent_id: String,
    pub display_name: String,
    pub folder_type: FolderType,
}

/// Read-only mailbox contract consumed by the command handlers
pub trait MailStore: Send + Sync {
    /// Items in a collection with `id > min_id_exclusive`, minus the
    /// exclusion set, ascending by id, at most `limit`
    fn list_items(
        &self,
        principal: &Principal,
        collection_id: &str,
        min_id_exclusive: i64,
        exclude_ids: &BTreeSet<i64>,
        limit: usize,
    ) -> Result<Vec<StoredItem>>;

    /// How many items `list_items` could still return
    fn count_new(
        &self,
        principal: &Principal,
        collection_id: &str,
        min_id_exclusive: i64,
        exclude_ids: &BTreeSet<i64>,
    ) -> Result<usize>;

    /// A single item by id
    fn get_item(&self, principal: &Principal, item_id: i64) -> Result<Option<StoredItem>>;

    /// The folder hierarchy exposed to FolderSync
    fn list_folders(&self, principal: &Principal) -> Result<Vec<Folder>>;

    /// Delete every item in a collection; returns how many went away
    fn empty_folder(&self, principal: &Principal, collection_id: &str) -> Result<usize>;

    /// Whether a collection id names a known folder
    fn collection_exists(&self, principal: &Principal, collection_id: &str) -> Result<bool> {
        Ok(self
            .list_folders(principal)?
            .iter()
            .any(|folder| folder.collection_id == collection_id))
    }

    /// Raw MIME for an item, synthesizing a minimal RFC 5322 message from
    /// the stored fields when the backend has none
    fn build_or_fetch_mime(&self, item: &StoredItem) -> Result<Vec<u8>> {
        if let Some(raw) = &item.mime {
            return Ok(raw.clone());
        }
        mime::build_mime(&MimeSource {
            from: &item.sender,
            to: &item.recipient,
            subject: &item.subject,
            date: item.received_at,
            body_plain: item.body_plain.as_deref(),
            body_html: item.body_html.as_deref(),
        })
    }
}

/// SQLite-backed mail store adapter
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    /// Open (and migrate) the mailbox database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::Store(format!("Failed to create mail dir: {}", e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Store(format!("Failed to open mail database: {}", e)))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Store(format!("Failed to open memory database: {}", e)))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                principal_id INTEGER NOT NULL,
                collection_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                received_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                body_plain TEXT,
                body_html TEXT,
                mime BLOB
            )",
            [],
        )
        .map_err(|e| Error::Store(format!("Failed to create emails table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS folders (
                collection_id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL DEFAULT '0',
                display_name TEXT NOT NULL,
                folder_type INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::Store(format!("Failed to create folders table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_emails_collection
             ON emails(principal_id, collection_id, id)",
            [],
        )
        .map_err(|e| Error::Store(format!("Failed to create index: {}", e)))?;

        // The hierarchy is static; seed it once
        let defaults: [(&str, &str, FolderType); 7] = [
            ("1", "Inbox", FolderType::Inbox),
            ("2", "Drafts", FolderType::Drafts),
            ("3", "Deleted Items", FolderType::DeletedItems),
            ("4", "Sent Items", FolderType::SentItems),
            ("5", "Outbox", FolderType::Outbox),
            ("calendar", "Calendar", FolderType::Calendar),
            ("contacts", "Contacts", FolderType::Contacts),
        ];
        for (collection_id, name, folder_type) in defaults {
            conn.execute(
                "INSERT OR IGNORE INTO folders (collection_id, parent_id, display_name, folder_type)
                 VALUES (?1, '0', ?2, ?3)",
                params![collection_id, name, folder_type.as_u8()],
            )
            .map_err(|e| Error::Store(format!("Failed to seed folder {}: {}", name, e)))?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert an item; used by ingestion and by tests
    pub fn add_item(
        &self,
        principal: &Principal,
        collection_id: &str,
        item: &StoredItem,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO emails
                 (principal_id, collection_id, subject, sender, recipient,
                  received_at, is_read, body_plain, body_html, mime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                principal.id,
                collection_id,
                item.subject,
                item.sender,
                item.recipient,
                item.received_at.to_rfc3339(),
                item.is_read,
                item.body_plain,
                item.body_html,
                item.mime
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to insert item: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredItem> {
        let received: String = row.get(5)?;
        Ok(StoredItem {
            id: row.get(0)?,
            subject: row.get(1)?,
            sender: row.get(2)?,
            recipient: row.get(3)?,
            is_read: row.get::<_, i64>(4)? != 0,
            received_at: DateTime::parse_from_rfc3339(&received)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            body_plain: row.get(6)?,
            body_html: row.get(7)?,
            mime: row.get(8)?,
        })
    }
}

const ITEM_COLUMNS: &str =
    "id, subject, sender, recipient, is_read, received_at, body_plain, body_html, mime";

impl MailStore for SqliteMailStore {
    fn list_items(
        &self,
        principal: &Principal,
        collection_id: &str,
        min_id_exclusive: i64,
        exclude_ids: &BTreeSet<i64>,
        limit: usize,
    ) -> Result<Vec<StoredItem>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM emails
                 WHERE principal_id = ?1 AND collection_id = ?2
                   AND is_deleted = 0 AND id > ?3
                 ORDER BY id ASC",
                ITEM_COLUMNS
            ))
            .map_err(|e| Error::Store(format!("Failed to prepare listing: {}", e)))?;
        let rows = stmt
            .query_map(
                params![principal.id, collection_id, min_id_exclusive],
                Self::row_to_item,
            )
            .map_err(|e| Error::Store(format!("Failed to list items: {}", e)))?;

        let mut items = Vec::new();
        for row in rows {
            let item = row.map_err(|e| Error::Store(format!("Failed to read item row: {}", e)))?;
            if exclude_ids.contains(&item.id) {
                continue;
            }
            items.push(item);
            if items.len() >= limit {
                break;
            }
        }
        Ok(items)
    }

    fn count_new(
        &self,
        principal: &Principal,
        collection_id: &str,
        min_id_exclusive: i64,
        exclude_ids: &BTreeSet<i64>,
    ) -> Result<usize> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id FROM emails
                 WHERE principal_id = ?1 AND collection_id = ?2
                   AND is_deleted = 0 AND id > ?3",
            )
            .map_err(|e| Error::Store(format!("Failed to prepare count: {}", e)))?;
        let rows = stmt
            .query_map(
                params![principal.id, collection_id, min_id_exclusive],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| Error::Store(format!("Failed to count items: {}", e)))?;

        let mut count = 0;
        for row in rows {
            let id = row.map_err(|e| Error::Store(format!("Failed to read id: {}", e)))?;
            if !exclude_ids.contains(&id) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn get_item(&self, principal: &Principal, item_id: i64) -> Result<Option<StoredItem>> {
        use rusqlite::OptionalExtension;
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM emails
                 WHERE principal_id = ?1 AND id = ?2 AND is_deleted = 0",
                ITEM_COLUMNS
            ),
            params![principal.id, item_id],
            Self::row_to_item,
        )
        .optional()
        .map_err(|e| Error::Store(format!("Failed to load item {}: {}", item_id, e)))
    }

    fn list_folders(&self, _principal: &Principal) -> Result<Vec<Folder>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT collection_id, parent_id, display_name, folder_type
                 FROM folders ORDER BY rowid",
            )
            .map_err(|e| Error::Store(format!("Failed to prepare folder listing: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Folder {
                    collection_id: row.get(0)?,
                    parent_id: row.get(1)?,
                    display_name: row.get(2)?,
                    folder_type: FolderType::from_u8(row.get::<_, i64>(3)? as u8),
                })
            })
            .map_err(|e| Error::Store(format!("Failed to list folders: {}", e)))?;

        let mut folders = Vec::new();
        for row in rows {
            folders.push(row.map_err(|e| Error::Store(format!("Failed to read folder: {}", e)))?);
        }
        Ok(folders)
    }

    fn empty_folder(&self, principal: &Principal, collection_id: &str) -> Result<usize> {
        let conn = self.lock();
        let removed = conn
            .execute(
                "UPDATE emails SET is_deleted = 1
                 WHERE principal_id = ?1 AND collection_id = ?2 AND is_deleted = 0",
                params![principal.id, collection_id],
            )
            .map_err(|e| Error::Store(format!("Failed to empty folder: {}", e)))?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn principal() -> Principal {
        Principal::new(1, "alice@example.com".to_string())
    }

    pub(crate) fn item(subject: &str) -> StoredItem {
        StoredItem {
            id: 0,
            subject: subject.to_string(),
            sender: "bob@example.com".to_string(),
            recipient: "alice@example.com".to_string(),
            received_at: Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap(),
            is_read: false,
            body_plain: Some(format!("body of {}", subject)),
            body_html: None,
            mime: None,
        }
    }

    #[test]
    fn test_default_folder_hierarchy() {
        let store = SqliteMailStore::open_in_memory().unwrap();
        let folders = store.list_folders(&principal()).unwrap();
        assert_eq!(folders.len(), 7);
        assert_eq!(folders[0].collection_id, "1");
        assert_eq!(folders[0].folder_type, FolderType::Inbox);
        assert!(folders.iter().all(|f| f.parent_id == "0"));
        assert!(store.collection_exists(&principal(), "1").unwrap());
        assert!(!store.collection_exists(&principal(), "999").unwrap());
    }

    #[test]
    fn test_list_items_pagination_with_exclusions() {
        let store = SqliteMailStore::open_in_memory().unwrap();
        let ids: Vec<i64> = (0..5)
            .map(|i| store.add_item(&principal(), "1", &item(&format!("m{}", i))).unwrap())
            .collect();

        // floor below everything, exclude the second item
        let exclude = BTreeSet::from([ids[1]]);
        let listed = store.list_items(&principal(), "1", 0, &exclude, 10).unwrap();
        assert_eq!(listed.len(), 4);
        assert!(listed.iter().all(|i| i.id != ids[1]));

        // limit applies after exclusion
        let listed = store.list_items(&principal(), "1", 0, &exclude, 2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[0]);
        assert_eq!(listed[1].id, ids[2]);

        assert_eq!(store.count_new(&principal(), "1", 0, &exclude).unwrap(), 4);
        assert_eq!(
            store.count_new(&principal(), "1", ids[2], &BTreeSet::new()).unwrap(),
            2
        );
    }

    #[test]
    fn test_items_scoped_by_principal_and_collection() {
        let store = SqliteMailStore::open_in_memory().unwrap();
        store.add_item(&principal(), "1", &item("inbox")).unwrap();
        store.add_item(&principal(), "4", &item("sent")).unwrap();
        let other = Principal::new(2, "carol@example.com".to_string());
        store.add_item(&other, "1", &item("not mine")).unwrap();

        let listed = store
            .list_items(&principal(), "1", 0, &BTreeSet::new(), 10)
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].subject, "inbox");
    }

    #[test]
    fn test_empty_folder_hides_items() {
        let store = SqliteMailStore::open_in_memory().unwrap();
        let id = store.add_item(&principal(), "1", &item("gone")).unwrap();
        assert_eq!(store.empty_folder(&principal(), "1").unwrap(), 1);
        assert!(store.get_item(&principal(), id).unwrap().is_none());
        assert_eq!(
            store.count_new(&principal(), "1", 0, &BTreeSet::new()).unwrap(),
            0
        );
    }

    #[test]
    fn test_build_or_fetch_mime_prefers_stored() {
        let store = SqliteMailStore::open_in_memory().unwrap();
        let mut stored = item("raw");
        stored.mime = Some(b"From: x@y\r\n\r\nraw body".to_vec());
        let id = store.add_item(&principal(), "1", &stored).unwrap();
        let loaded = store.get_item(&principal(), id).unwrap().unwrap();
        let raw = store.build_or_fetch_mime(&loaded).unwrap();
        assert_eq!(raw, stored.mime.unwrap());
    }

    #[test]
    fn test_build_or_fetch_mime_synthesizes() {
        let store = SqliteMailStore::open_in_memory().unwrap();
        let id = store.add_item(&principal(), "1", &item("synth")).unwrap();
        let loaded = store.get_item(&principal(), id).unwrap().unwrap();
        let raw = store.build_or_fetch_mime(&loaded).unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.contains("Subject: synth"));
        assert!(text.contains("bob@example.com"));
    }
}
