// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rust SDK for MetaRouter analytics ingestion.
//!
//! Applications emit semantic events (`track`, `identify`, `group`, `screen`,
//! `page`, `alias`); the SDK enriches them with identity and context, buffers
//! them in a bounded in-memory queue, and delivers them in batches to the
//! collector with ordering, backoff and at-most-once-per-batch semantics
//! under partial failure.
//!
//! # Quick Start
//!
//! ```ignore
//! use metarouter_analytics::{Analytics, InitOptions, Properties};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analytics = Analytics::builder().build();
//!
//!     // Calls made before initialisation are buffered and replayed.
//!     analytics
//!         .initialize(InitOptions::new("wk_live_abc", "https://ingest.example.com"))
//!         .await?;
//!
//!     analytics
//!         .track("Order Completed", Properties::new()
//!             .insert("total", 42.5)
//!             .insert("currency", "USD"))
//!         .await;
//!
//!     analytics.identify("user_123", Properties::new().insert("plan", "pro")).await;
//!
//!     // Deliver everything still queued before shutdown.
//!     analytics.flush().await;
//!     Ok(())
//! }
//! ```
//!
//! # Delivery semantics
//!
//! Events flow through a bounded FIFO (capacity `max_queue_events`, oldest
//! dropped on overflow) and are POSTed as `{"batch": [...]}` payloads. The
//! dispatcher reacts per status class: 2xx resolves the batch, 408/5xx/429
//! requeue it at the front and back off (honouring `Retry-After`), 413 halves
//! the batch size, 401/403/404 disable the pipeline, and other 4xx drop the
//! batch. A circuit breaker with exponential jittered cooldown short-circuits
//! attempts during sustained failure.
//!
//! Delivery failures never surface to callers; observe them through logs and
//! [`Analytics::debug_info`].

pub mod breaker;
pub mod client;
pub mod context;
pub mod dispatcher;
pub mod enrich;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod options;
pub mod proxy;
pub mod queue;
pub mod store;
pub mod transport;

pub use client::{Analytics, AnalyticsBuilder, Client, DebugInfo};
pub use error::{ConfigError, Result, StoreError};
pub use lifecycle::LifecycleState;
pub use options::InitOptions;

// Re-export the core data model users touch directly.
pub use metarouter_analytics_core::{
	Call, CallKind, Context, EnrichedEvent, Properties,
};
