//! Project version resolution and request statistics
//!
//! This module resolves the latest version of a forge project, caches it on
//! disk, and aggregates served requests into weekly counts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Stats    │────▶│  Resolver   │────▶│    Cache    │
//! │ (aggregate) │     │ (fallbacks) │     │   (files)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Request Log │     │    Forge    │────▶│    Gate     │
//! │  (SQLite)   │     │  (GitHub)   │     │ (admission) │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: One JSON record per project with time-based staleness
//! - [`forge`]: Forge trait and typed views of forge responses
//! - [`forges`]: Concrete forge clients (GitHub)
//! - [`gate`]: Bound on simultaneous outbound forge requests
//! - [`resolver`]: Release, tags and metadata-file fallback chain
//! - [`request_log`]: SQLite log of served requests
//! - [`stats`]: Weekly request counts derived from the log
//! - [`error`]: Error types for cache, log and forge client
//! - [`types`]: Common types like `ProjectKey` and `ProjectInfo`

pub mod cache;
pub mod error;
pub mod forge;
pub mod forges;
pub mod gate;
pub mod request_log;
pub mod resolver;
pub mod stats;
pub mod types;
