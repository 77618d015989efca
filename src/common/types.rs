//! Common protocol types used throughout the application

use std::fmt;
use uuid::Uuid;

use crate::common::{Error, Result};

/// Authenticated mailbox owner, produced by the authentication seam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub email: String,
}

impl Principal {
    /// Create a new principal
    pub fn new(id: i64, email: String) -> Self {
        Self { id, email }
    }
}

/// ActiveSync folder types (FolderSync `<Type>` values)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderType {
    UserGeneric,
    Inbox,
    Drafts,
    DeletedItems,
    SentItems,
    Outbox,
    Calendar,
    Contacts,
}

impl FolderType {
    /// Wire value per MS-ASCMD
    pub fn as_u8(self) -> u8 {
        match self {
            FolderType::UserGeneric => 1,
            FolderType::Inbox => 2,
            FolderType::Drafts => 3,
            FolderType::DeletedItems => 4,
            FolderType::SentItems => 5,
            FolderType::Outbox => 6,
            FolderType::Calendar => 8,
            FolderType::Contacts => 9,
        }
    }

    /// Parse a wire value; unknown values map to the generic user folder
    pub fn from_u8(value: u8) -> Self {
        match value {
            2 => FolderType::Inbox,
            3 => FolderType::Drafts,
            4 => FolderType::DeletedItems,
            5 => FolderType::SentItems,
            6 => FolderType::Outbox,
            8 => FolderType::Calendar,
            9 => FolderType::Contacts,
            _ => FolderType::UserGeneric,
        }
    }
}

/// AirSyncBase body types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BodyType {
    Plain,
    Html,
    Mime,
}

impl BodyType {
    pub fn as_u8(self) -> u8 {
        match self {
            BodyType::Plain => 1,
            BodyType::Html => 2,
            BodyType::Mime => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(BodyType::Plain),
            2 => Some(BodyType::Html),
            4 => Some(BodyType::Mime),
            _ => None,
        }
    }
}

/// In-band WBXML status values shared by the command responses
pub mod status {
    pub const SUCCESS: u8 = 1;
    pub const INVALID_SYNC_KEY: u8 = 3;
    pub const PROTOCOL_ERROR: u8 = 4;
    pub const SERVER_ERROR: u8 = 6;
    pub const OBJECT_NOT_FOUND: u8 = 8;
    pub const HIERARCHY_CHANGED: u8 = 12;
}

/// A synchronization snapshot token for one (Device, Collection).
///
/// The server issues plain decimal counters but accepts the grommunio-style
/// `{UUID}N` shape from clients that were migrated from another deployment.
/// `"0"` is the reset sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncKey {
    Zero,
    Counter(u64),
    Tagged { tag: Uuid, counter: u64 },
}

impl SyncKey {
    /// Parse either key shape. Rejects anything else.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value == "0" {
            return Ok(SyncKey::Zero);
        }
        if let Ok(counter) = value.parse::<u64>() {
            if counter > 0 {
                return Ok(SyncKey::Counter(counter));
            }
        }
        if let Some(rest) = value.strip_prefix('{') {
            if let Some((tag, counter)) = rest.split_once('}') {
                let tag = Uuid::parse_str(tag)
                    .map_err(|_| Error::Protocol(format!("invalid sync key: {}", value)))?;
                let counter = counter
                    .parse::<u64>()
                    .map_err(|_| Error::Protocol(format!("invalid sync key: {}", value)))?;
                if counter > 0 {
                    return Ok(SyncKey::Tagged { tag, counter });
                }
            }
        }
        Err(Error::Protocol(format!("invalid sync key: {}", value)))
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, SyncKey::Zero)
    }

    /// Counter component; the reset sentinel counts as 0.
    pub fn counter(&self) -> u64 {
        match self {
            SyncKey::Zero => 0,
            SyncKey::Counter(n) => *n,
            SyncKey::Tagged { counter, .. } => *counter,
        }
    }

    /// The key the next issued batch will carry.
    pub fn next(&self) -> SyncKey {
        match self {
            SyncKey::Zero => SyncKey::Counter(1),
            SyncKey::Counter(n) => SyncKey::Counter(n + 1),
            SyncKey::Tagged { tag, counter } => SyncKey::Tagged {
                tag: *tag,
                counter: counter + 1,
            },
        }
    }

    /// Whether a client-presented key identifies the same snapshot.
    ///
    /// Counters must agree; tags only when both sides carry one (a client
    /// echoing a bare counter for a tagged key is accepted).
    pub fn matches(&self, other: &SyncKey) -> bool {
        if self.counter() != other.counter() {
            return false;
        }
        match (self, other) {
            (SyncKey::Tagged { tag: a, .. }, SyncKey::Tagged { tag: b, .. }) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKey::Zero => write!(f, "0"),
            SyncKey::Counter(n) => write!(f, "{}", n),
            SyncKey::Tagged { tag, counter } => write!(f, "{{{}}}{}", tag, counter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_key_parse_zero() {
        assert_eq!(SyncKey::parse("0").unwrap(), SyncKey::Zero);
        assert!(SyncKey::parse("0").unwrap().is_zero());
    }

    #[test]
    fn test_sync_key_parse_counter() {
        let key = SyncKey::parse("42").unwrap();
        assert_eq!(key, SyncKey::Counter(42));
        assert_eq!(key.to_string(), "42");
    }

    #[test]
    fn test_sync_key_parse_tagged() {
        let key = SyncKey::parse("{6ba7b810-9dad-11d1-80b4-00c04fd430c8}7").unwrap();
        assert_eq!(key.counter(), 7);
        assert_eq!(
            key.to_string(),
            "{6ba7b810-9dad-11d1-80b4-00c04fd430c8}7"
        );
    }

    #[test]
    fn test_sync_key_parse_rejects_garbage() {
        assert!(SyncKey::parse("").is_err());
        assert!(SyncKey::parse("-3").is_err());
        assert!(SyncKey::parse("{not-a-uuid}5").is_err());
        assert!(SyncKey::parse("{6ba7b810-9dad-11d1-80b4-00c04fd430c8}").is_err());
    }

    #[test]
    fn test_sync_key_next() {
        assert_eq!(SyncKey::Zero.next(), SyncKey::Counter(1));
        assert_eq!(SyncKey::Counter(9).next(), SyncKey::Counter(10));
        let tagged = SyncKey::parse("{6ba7b810-9dad-11d1-80b4-00c04fd430c8}7").unwrap();
        assert_eq!(tagged.next().counter(), 8);
    }

    #[test]
    fn test_sync_key_matches_across_shapes() {
        let tagged = SyncKey::parse("{6ba7b810-9dad-11d1-80b4-00c04fd430c8}7").unwrap();
        assert!(tagged.matches(&SyncKey::Counter(7)));
        assert!(!tagged.matches(&SyncKey::Counter(8)));
    }

    #[test]
    fn test_folder_type_round_trip() {
        assert_eq!(FolderType::from_u8(FolderType::Inbox.as_u8()), FolderType::Inbox);
        assert_eq!(FolderType::from_u8(99), FolderType::UserGeneric);
    }

    #[test]
    fn test_body_type_values() {
        assert_eq!(BodyType::Mime.as_u8(), 4);
        assert_eq!(BodyType::from_u8(3), None);
    }
}
