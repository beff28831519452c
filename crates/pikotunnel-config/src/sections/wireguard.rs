// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Relay interface, filter chain and key material.

use ipnet::Ipv4Net;
use pikotunnel_common::{IpAllocator, SecretString, WgKeyPair};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct WireguardConfig {
	pub interface: String,
	pub chain: String,
	/// Relay address with the peer subnet prefix, e.g. `10.8.0.1/24`.
	pub subnet: Ipv4Net,
	pub listen_port: u16,
	pub private_key: SecretString,
	pub public_key: String,
	/// Address clients dial, without the port.
	pub relay_public_ip: String,
}

impl WireguardConfig {
	/// The network peers are drawn from, e.g. `10.8.0.0/24`.
	pub fn client_subnet(&self) -> Ipv4Net {
		self.subnet.trunc()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireguardConfigLayer {
	#[serde(default)]
	pub interface: Option<String>,
	#[serde(default)]
	pub chain: Option<String>,
	#[serde(default)]
	pub subnet: Option<String>,
	#[serde(default)]
	pub listen_port: Option<u16>,
	#[serde(default)]
	pub private_key: Option<SecretString>,
	#[serde(default)]
	pub public_key: Option<String>,
	#[serde(default)]
	pub relay_public_ip: Option<String>,
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
	ConfigError::InvalidValue {
		key: key.to_string(),
		message: message.into(),
	}
}

impl WireguardConfigLayer {
	pub fn merge(&mut self, other: WireguardConfigLayer) {
		if other.interface.is_some() {
			self.interface = other.interface;
		}
		if other.chain.is_some() {
			self.chain = other.chain;
		}
		if other.subnet.is_some() {
			self.subnet = other.subnet;
		}
		if other.listen_port.is_some() {
			self.listen_port = other.listen_port;
		}
		if other.private_key.is_some() {
			self.private_key = other.private_key;
		}
		if other.public_key.is_some() {
			self.public_key = other.public_key;
		}
		if other.relay_public_ip.is_some() {
			self.relay_public_ip = other.relay_public_ip;
		}
	}

	pub fn finalize(self) -> Result<WireguardConfig, ConfigError> {
		let subnet_str = self.subnet.ok_or(ConfigError::Missing("wireguard.subnet"))?;
		let subnet: Ipv4Net = subnet_str
			.trim()
			.parse()
			.map_err(|e| invalid("wireguard.subnet", format!("'{subnet_str}': {e}")))?;
		IpAllocator::from_relay_cidr(subnet, 1)
			.map_err(|e| invalid("wireguard.subnet", e.to_string()))?;

		let private_key = self
			.private_key
			.ok_or(ConfigError::Missing("wireguard.private_key"))?;
		let keypair = WgKeyPair::from_private_base64(private_key.expose())
			.map_err(|e| invalid("wireguard.private_key", e.to_string()))?;
		let derived_public = keypair.public_key_base64();
		let public_key = match self.public_key {
			Some(configured) if configured.trim() != derived_public => {
				return Err(invalid(
					"wireguard.public_key",
					"does not match the configured private key",
				));
			}
			_ => derived_public,
		};

		let relay_public_ip = self
			.relay_public_ip
			.filter(|ip| !ip.trim().is_empty())
			.ok_or(ConfigError::Missing("wireguard.relay_public_ip"))?;

		let interface = self.interface.unwrap_or_else(|| "wg0".to_string());
		if interface.is_empty() || interface.len() > 15 {
			return Err(invalid("wireguard.interface", "must be 1 to 15 characters"));
		}

		Ok(WireguardConfig {
			interface,
			chain: self.chain.unwrap_or_else(|| "WG_RULES".to_string()),
			subnet,
			listen_port: self.listen_port.unwrap_or(51820),
			private_key,
			public_key,
			relay_public_ip,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_layer() -> (WireguardConfigLayer, WgKeyPair) {
		let keypair = WgKeyPair::generate();
		let layer = WireguardConfigLayer {
			subnet: Some("10.8.0.1/24".to_string()),
			private_key: Some(keypair.private_key_base64()),
			relay_public_ip: Some("203.0.113.10".to_string()),
			..Default::default()
		};
		(layer, keypair)
	}

	#[test]
	fn defaults_and_derived_public_key() {
		let (layer, keypair) = base_layer();
		let config = layer.finalize().unwrap();
		assert_eq!(config.interface, "wg0");
		assert_eq!(config.chain, "WG_RULES");
		assert_eq!(config.listen_port, 51820);
		assert_eq!(config.public_key, keypair.public_key_base64());
		assert_eq!(config.client_subnet().to_string(), "10.8.0.0/24");
	}

	#[test]
	fn mismatched_public_key_rejected() {
		let (mut layer, _) = base_layer();
		layer.public_key = Some(WgKeyPair::generate().public_key_base64());
		let err = layer.finalize().unwrap_err();
		assert!(err.to_string().contains("wireguard.public_key"));
	}

	#[test]
	fn subnet_must_name_a_host_address() {
		let (mut layer, _) = base_layer();
		layer.subnet = Some("10.8.0.0/24".to_string());
		let err = layer.finalize().unwrap_err();
		assert!(err.to_string().contains("wireguard.subnet"));
	}

	#[test]
	fn missing_required_fields() {
		let (mut layer, _) = base_layer();
		layer.relay_public_ip = None;
		assert!(matches!(
			layer.finalize().unwrap_err(),
			ConfigError::Missing("wireguard.relay_public_ip")
		));

		let (mut layer, _) = base_layer();
		layer.private_key = None;
		assert!(matches!(
			layer.finalize().unwrap_err(),
			ConfigError::Missing("wireguard.private_key")
		));
	}
}
