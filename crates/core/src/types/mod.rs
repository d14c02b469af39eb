//! Core types for Atelier.
//!
//! This module provides type-safe wrappers for the offline cache domain.

pub mod id;
pub mod media;
pub mod message;
pub mod progress;
pub mod range;
pub mod record;

pub use id::*;
pub use media::{MediaUrl, dedup_media_urls};
pub use message::{ArtworkRef, CacheStatus, PortfolioData, WorkerCommand, WorkerEvent};
pub use progress::{CacheProgress, CacheStage};
pub use range::{ByteRange, RangeError, unsatisfied_content_range};
pub use record::PortfolioCacheRecord;
