// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The immutable context record stamped onto every enriched event.
//!
//! Context describes the host the event originated from: application, device,
//! operating system, screen, network and locale. The delivery pipeline treats
//! the record as opaque beyond its structure; populating it from real platform
//! probes is the embedder's job.

use serde::{Deserialize, Serialize};

/// SDK name reported in [`LibraryInfo`].
pub const LIBRARY_NAME: &str = "metarouter-analytics-rust";
/// SDK version reported in [`LibraryInfo`].
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The application the SDK is embedded in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
	pub name: String,
	pub version: String,
	pub build: String,
	pub namespace: String,
}

/// The physical device, including the opt-in advertising identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
	pub manufacturer: String,
	pub model: String,
	pub name: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub advertising_id: Option<String>,
}

/// This SDK, as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryInfo {
	pub name: String,
	pub version: String,
}

impl LibraryInfo {
	/// Returns the identity of this crate.
	pub fn current() -> Self {
		Self {
			name: LIBRARY_NAME.to_string(),
			version: LIBRARY_VERSION.to_string(),
		}
	}
}

impl Default for LibraryInfo {
	fn default() -> Self {
		Self::current()
	}
}

/// Operating system name and version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsInfo {
	pub name: String,
	pub version: String,
}

/// Display geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
	pub density: f64,
	pub width: i32,
	pub height: i32,
}

/// Network reachability at enrichment time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
	pub wifi: bool,
}

/// The full context record attached to every wire event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
	pub app: AppInfo,
	pub device: DeviceInfo,
	pub library: LibraryInfo,
	pub os: OsInfo,
	pub screen: ScreenInfo,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub network: Option<NetworkInfo>,
	pub locale: String,
	pub timezone: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_context() -> Context {
		Context {
			app: AppInfo {
				name: "Shop".to_string(),
				version: "2.1.0".to_string(),
				build: "210".to_string(),
				namespace: "com.example.shop".to_string(),
			},
			device: DeviceInfo {
				manufacturer: "Acme".to_string(),
				model: "Phone 12".to_string(),
				name: "phone".to_string(),
				kind: "ios".to_string(),
				advertising_id: Some("ad-123".to_string()),
			},
			library: LibraryInfo::current(),
			os: OsInfo {
				name: "iOS".to_string(),
				version: "17.4".to_string(),
			},
			screen: ScreenInfo {
				density: 3.0,
				width: 390,
				height: 844,
			},
			network: Some(NetworkInfo { wifi: true }),
			locale: "en-US".to_string(),
			timezone: "America/New_York".to_string(),
		}
	}

	#[test]
	fn serialises_camel_case_and_type_rename() {
		let json = serde_json::to_value(sample_context()).unwrap();

		assert_eq!(json["device"]["advertisingId"], "ad-123");
		assert_eq!(json["device"]["type"], "ios");
		assert_eq!(json["network"]["wifi"], true);
		assert_eq!(json["screen"]["width"], 390);
		assert_eq!(json["library"]["name"], LIBRARY_NAME);
	}

	#[test]
	fn absent_network_and_advertising_id_are_omitted() {
		let mut ctx = sample_context();
		ctx.network = None;
		ctx.device.advertising_id = None;

		let json = serde_json::to_value(ctx).unwrap();
		assert!(json.get("network").is_none());
		assert!(json["device"].get("advertisingId").is_none());
	}

	#[test]
	fn roundtrip_is_lossless() {
		let ctx = sample_context();
		let json = serde_json::to_string(&ctx).unwrap();
		let back: Context = serde_json::from_str(&json).unwrap();
		assert_eq!(ctx, back);
	}

	#[test]
	fn library_info_reports_this_crate() {
		let lib = LibraryInfo::current();
		assert_eq!(lib.name, "metarouter-analytics-rust");
		assert!(!lib.version.is_empty());
	}
}
