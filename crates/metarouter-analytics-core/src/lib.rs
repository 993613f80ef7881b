// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core data model for the MetaRouter analytics SDK.
//!
//! This crate holds the pure types shared between the SDK and its tests: the
//! semantic calls accepted by the public API, the enriched wire events POSTed
//! to the collector, the context record stamped onto every event, and message
//! id minting/validation. It performs no I/O and has no runtime dependency.

pub mod call;
pub mod context;
pub mod event;
pub mod message_id;
pub mod properties;

pub use call::{Call, CallKind};
pub use context::{
	AppInfo, Context, DeviceInfo, LibraryInfo, NetworkInfo, OsInfo, ScreenInfo,
};
pub use event::{wire_timestamp, BatchPayload, EnrichedEvent};
pub use message_id::{embedded_millis, is_valid_message_id, message_id};
pub use properties::Properties;
