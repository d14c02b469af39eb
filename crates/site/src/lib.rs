//! Atelier site library.
//!
//! Serves the portfolio site's offline caching: the asset proxy, the cache
//! worker and its interceptor, and the JSON/SSE API the offline page uses.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cms;
pub mod config;
pub mod db;
pub mod error;
pub mod offline;
pub mod routes;
pub mod state;
