//! Data layer - persistence and store boundaries
//!
//! This layer owns the sync-state database, the read facade over the mail
//! store, and the in-process change hub feeding Ping.

pub mod change_hub;
pub mod mail_store;
pub mod state_store;

pub use change_hub::ChangeHub;
pub use mail_store::{Folder, MailStore, SqliteMailStore, StoredItem};
pub use state_store::{Device, ProvisionState, StateStore, SyncState};
