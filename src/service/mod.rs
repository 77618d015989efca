//! Service layer - protocol plumbing
//!
//! WBXML encoding/decoding, MIME assembly and body preparation. Nothing in
//! this layer touches sync state or the HTTP surface.

pub mod body;
pub mod mime;
pub mod wbxml;
