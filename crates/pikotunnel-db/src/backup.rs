// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::path::{Path, PathBuf};

use crate::error::{DbError, Result};

/// Default snapshot name, `backup_<unix seconds>.db`.
pub fn default_backup_path() -> PathBuf {
	PathBuf::from(format!("backup_{}.db", Utc::now().timestamp()))
}

/// Write a consistent snapshot of the live database to `destination`.
///
/// Uses `VACUUM INTO`, so the copy is taken inside a read transaction and
/// does not block writers for longer than the copy itself.
#[tracing::instrument(skip(pool), fields(destination = %destination.display()))]
pub async fn backup_database(pool: &SqlitePool, destination: &Path) -> Result<()> {
	if destination.exists() {
		return Err(DbError::Conflict(format!(
			"{} already exists",
			destination.display()
		)));
	}
	let target = destination
		.to_str()
		.ok_or_else(|| DbError::Internal("backup path is not valid UTF-8".to_string()))?;

	sqlx::query("VACUUM INTO ?")
		.bind(target)
		.execute(pool)
		.await?;

	tracing::info!("database backup written");
	Ok(())
}
