// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP listener and API authentication.

use pikotunnel_common::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct HttpConfig {
	pub host: String,
	pub port: u16,
	/// Static token every request must present.
	pub api_token: SecretString,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfigLayer {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub api_token: Option<SecretString>,
}

impl HttpConfigLayer {
	pub fn merge(&mut self, other: HttpConfigLayer) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.api_token.is_some() {
			self.api_token = other.api_token;
		}
	}

	pub fn finalize(self) -> Result<HttpConfig, ConfigError> {
		let api_token = self
			.api_token
			.ok_or(ConfigError::Missing("http.api_token"))?;
		if api_token.expose().trim().is_empty() {
			return Err(ConfigError::InvalidValue {
				key: "http.api_token".to_string(),
				message: "must not be empty".to_string(),
			});
		}

		Ok(HttpConfig {
			host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
			port: self.port.unwrap_or(8080),
			api_token,
		})
	}
}
