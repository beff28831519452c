// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ConfigError;

/// Where the config copy for `snapshot` goes: same directory and stem, with a
/// `.toml` extension.
pub fn config_backup_path(snapshot: &Path) -> PathBuf {
	snapshot.with_extension("toml")
}

/// Copy the config file at `source` next to a database snapshot.
///
/// The config holds the relay private key, so a database snapshot alone
/// cannot bring the relay back. Returns `None` when `source` does not exist,
/// i.e. the relay is configured from the environment only.
#[tracing::instrument(skip_all, fields(source = %source.display(), snapshot = %snapshot.display()))]
pub fn backup_config_file(source: &Path, snapshot: &Path) -> Result<Option<PathBuf>, ConfigError> {
	if !source.exists() {
		debug!("no config file to back up");
		return Ok(None);
	}

	let destination = config_backup_path(snapshot);
	if destination.exists() {
		return Err(ConfigError::FileWrite {
			path: destination,
			source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "file exists"),
		});
	}

	std::fs::copy(source, &destination).map_err(|e| ConfigError::FileWrite {
		path: destination.clone(),
		source: e,
	})?;

	info!(destination = %destination.display(), "config backup written");
	Ok(Some(destination))
}
