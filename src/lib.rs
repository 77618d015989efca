//! Airgate - an Exchange ActiveSync gateway core
//!
//! This crate terminates Microsoft Exchange ActiveSync (EAS) traffic from
//! mobile and desktop mail clients and reconciles per-device sync state with
//! a backing mail store. It is organized into four main layers: presentation,
//! application, service, and data.

// Presentation Layer - HTTP surface
pub mod presentation;

// Application Layer - command handlers, strategy dispatch, routing
pub mod application;

// Service Layer - WBXML codec, MIME assembly, body preparation
pub mod service;

// Data Layer - sync state persistence, mail store facade, change hub
pub mod data;

// Common types and utilities
pub mod common;
