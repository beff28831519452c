// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, TOML files and environment
//! variables.

use std::path::PathBuf;

use pikotunnel_common::SecretString;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::PikotunnelConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer, WireguardConfigLayer,
	WorkerConfigLayer,
};

/// Default location of the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/pikotunnel/pikotunnel.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<PikotunnelConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<PikotunnelConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(PikotunnelConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<PikotunnelConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(PikotunnelConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: PikotunnelConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: PIKOTUNNEL_<SECTION>_<FIELD>. Secrets also accept
/// `<NAME>_FILE` pointing at a file holding the value.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<PikotunnelConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(PikotunnelConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()),
			wireguard: Some(load_wireguard_from_env()?),
			worker: Some(load_worker_from_env()?),
			logging: Some(load_logging_from_env()),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

/// Load a secret from `name`, or from the file named by `name_FILE`.
///
/// Setting both is an error; trailing newlines in the file are trimmed.
pub fn load_secret_env(name: &str) -> Result<Option<SecretString>, ConfigError> {
	let file_var = format!("{name}_FILE");
	match (env_var(name), env_var(&file_var)) {
		(Some(_), Some(_)) => Err(ConfigError::Secret(format!(
			"both {name} and {file_var} are set"
		))),
		(Some(value), None) => Ok(Some(SecretString::new(value))),
		(None, Some(path)) => read_secret_file(&path)
			.map(Some)
			.map_err(|e| ConfigError::Secret(format!("{file_var}: {e}"))),
		(None, None) => Ok(None),
	}
}

fn read_secret_file(path: &str) -> std::io::Result<SecretString> {
	let content = std::fs::read_to_string(path)?;
	Ok(SecretString::new(
		content.trim_end_matches(['\r', '\n']).to_string(),
	))
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("PIKOTUNNEL_HTTP_HOST"),
		port: env_parse("PIKOTUNNEL_HTTP_PORT", "u16")?,
		api_token: load_secret_env("PIKOTUNNEL_HTTP_API_TOKEN")?,
	})
}

fn load_database_from_env() -> DatabaseConfigLayer {
	DatabaseConfigLayer {
		url: env_var("PIKOTUNNEL_DATABASE_URL"),
	}
}

fn load_wireguard_from_env() -> Result<WireguardConfigLayer, ConfigError> {
	Ok(WireguardConfigLayer {
		interface: env_var("PIKOTUNNEL_WIREGUARD_INTERFACE"),
		chain: env_var("PIKOTUNNEL_WIREGUARD_CHAIN"),
		subnet: env_var("PIKOTUNNEL_WIREGUARD_SUBNET"),
		listen_port: env_parse("PIKOTUNNEL_WIREGUARD_LISTEN_PORT", "u16")?,
		private_key: load_secret_env("PIKOTUNNEL_WIREGUARD_PRIVATE_KEY")?,
		public_key: env_var("PIKOTUNNEL_WIREGUARD_PUBLIC_KEY"),
		relay_public_ip: env_var("PIKOTUNNEL_WIREGUARD_RELAY_PUBLIC_IP"),
	})
}

fn load_worker_from_env() -> Result<WorkerConfigLayer, ConfigError> {
	Ok(WorkerConfigLayer {
		queue_capacity: env_parse("PIKOTUNNEL_WORKER_QUEUE_CAPACITY", "usize")?,
		max_allocation_attempts: env_parse("PIKOTUNNEL_WORKER_MAX_ALLOCATION_ATTEMPTS", "u32")?,
	})
}

fn load_logging_from_env() -> LoggingConfigLayer {
	LoggingConfigLayer {
		level: env_var("PIKOTUNNEL_LOG_LEVEL"),
	}
}
