//! Application layer - command handling
//!
//! Command routing, per-client strategy selection, and the six ActiveSync
//! command handlers.

pub mod dispatcher;
pub mod handlers;
pub mod strategy;

pub use dispatcher::{dispatch, AppContext, CommandResponse, RawRequest};
pub use strategy::{select_strategy, ClientStrategy};
