// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

use crate::sections::{
	DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer, WireguardConfigLayer,
	WorkerConfigLayer,
};

/// Partial configuration from one source. Later layers override earlier ones
/// field by field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PikotunnelConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub wireguard: Option<WireguardConfigLayer>,
	#[serde(default)]
	pub worker: Option<WorkerConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

fn merge_section<T>(current: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (current.as_mut(), other) {
		(Some(existing), Some(incoming)) => merge(existing, incoming),
		(None, Some(incoming)) => *current = Some(incoming),
		(_, None) => {}
	}
}

impl PikotunnelConfigLayer {
	pub fn merge(&mut self, other: PikotunnelConfigLayer) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.wireguard, other.wireguard, WireguardConfigLayer::merge);
		merge_section(&mut self.worker, other.worker, WorkerConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn later_layer_wins_per_field() {
		let mut base = PikotunnelConfigLayer {
			http: Some(HttpConfigLayer {
				host: Some("127.0.0.1".to_string()),
				port: Some(9000),
				api_token: None,
			}),
			..Default::default()
		};
		base.merge(PikotunnelConfigLayer {
			http: Some(HttpConfigLayer {
				host: None,
				port: Some(9100),
				api_token: None,
			}),
			..Default::default()
		});

		let http = base.http.unwrap();
		assert_eq!(http.host.as_deref(), Some("127.0.0.1"));
		assert_eq!(http.port, Some(9100));
	}

	#[test]
	fn missing_section_is_adopted() {
		let mut base = PikotunnelConfigLayer::default();
		base.merge(PikotunnelConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("sqlite::memory:".to_string()),
			}),
			..Default::default()
		});
		assert_eq!(
			base.database.unwrap().url.as_deref(),
			Some("sqlite::memory:")
		);
	}
}
