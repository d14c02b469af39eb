//! Atelier Core - Shared types library.
//!
//! This crate provides the types shared by every Atelier component:
//! - `site` - Portfolio web app, asset proxy and offline cache worker
//! - `cli` - Command-line tools for migrations, caching runs and the offline proxy
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. The offline cache protocol (commands, events,
//! progress) lives here so both sides of the channel agree on one shape.
//!
//! # Modules
//!
//! - [`types`] - Ids, media URLs, cache records, progress, wire messages, byte ranges
//! - [`format`] - Human-readable byte sizes

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod format;
pub mod types;

pub use types::*;
