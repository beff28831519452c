// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the pikotunnel relay.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`PIKOTUNNEL_*`)
//!
//! # Usage
//!
//! ```ignore
//! use pikotunnel_config::load_config;
//!
//! let config = load_config()?;
//! println!("API listening on {}", config.socket_addr());
//! ```

pub mod backup;
pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use backup::{backup_config_file, config_backup_path};
pub use error::ConfigError;
pub use layer::PikotunnelConfigLayer;
pub use sections::*;
pub use sources::{
	load_secret_env, ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource,
	SYSTEM_CONFIG_PATH,
};

use tracing::{debug, info};

/// Fully resolved relay configuration.
#[derive(Debug, Clone)]
pub struct PikotunnelConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub wireguard: WireguardConfig,
	pub worker: WorkerConfig,
	pub logging: LoggingConfig,
}

impl PikotunnelConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`PIKOTUNNEL_*`)
/// 2. Config file (`/etc/pikotunnel/pikotunnel.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<PikotunnelConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<PikotunnelConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge `sources` in precedence order and resolve the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<PikotunnelConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = PikotunnelConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: PikotunnelConfigLayer) -> Result<PikotunnelConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize()?;
	let database = layer.database.unwrap_or_default().finalize();
	let wireguard = layer.wireguard.unwrap_or_default().finalize()?;
	let worker = layer.worker.unwrap_or_default().finalize()?;
	let logging = layer.logging.unwrap_or_default().finalize();

	info!(
		host = %http.host,
		port = http.port,
		database = %database.url,
		interface = %wireguard.interface,
		subnet = %wireguard.subnet,
		listen_port = wireguard.listen_port,
		queue_capacity = worker.queue_capacity,
		"relay configuration loaded"
	);

	Ok(PikotunnelConfig {
		http,
		database,
		wireguard,
		worker,
		logging,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use pikotunnel_common::WgKeyPair;

	struct FixedSource(Precedence, PikotunnelConfigLayer);

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.0
		}

		fn load(&self) -> Result<PikotunnelConfigLayer, ConfigError> {
			Ok(self.1.clone())
		}
	}

	fn complete_layer() -> PikotunnelConfigLayer {
		PikotunnelConfigLayer {
			http: Some(HttpConfigLayer {
				api_token: Some("token".into()),
				..Default::default()
			}),
			wireguard: Some(WireguardConfigLayer {
				subnet: Some("10.8.0.1/24".to_string()),
				private_key: Some(WgKeyPair::generate().private_key_base64()),
				relay_public_ip: Some("203.0.113.10".to_string()),
				..Default::default()
			}),
			..Default::default()
		}
	}

	#[test]
	fn test_socket_addr() {
		let config = finalize(complete_layer()).unwrap();
		assert_eq!(config.socket_addr(), "0.0.0.0:8080");
	}

	#[test]
	fn test_higher_precedence_wins_regardless_of_order() {
		let env = PikotunnelConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(7000),
				..Default::default()
			}),
			..Default::default()
		};
		let file = PikotunnelConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(6000),
				host: Some("127.0.0.1".to_string()),
				api_token: Some("token".into()),
			}),
			..complete_layer()
		};

		let config = load_from_sources(vec![
			Box::new(FixedSource(Precedence::Environment, env)),
			Box::new(FixedSource(Precedence::ConfigFile, file)),
		])
		.unwrap();
		assert_eq!(config.http.port, 7000);
		assert_eq!(config.http.host, "127.0.0.1");
	}

	#[test]
	fn test_missing_token_fails() {
		let mut layer = complete_layer();
		layer.http = None;
		let err = finalize(layer).unwrap_err();
		assert!(err.to_string().contains("http.api_token"));
	}
}
