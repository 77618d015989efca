//! Presentation layer - the HTTP surface
//!
//! Terminates `POST /Microsoft-Server-ActiveSync`, answers OPTIONS with the
//! protocol capabilities, and applies HTTP Basic authentication before
//! anything reaches the dispatcher.

pub mod http_server;

pub use http_server::{run, Authenticator, StaticAuthenticator};
