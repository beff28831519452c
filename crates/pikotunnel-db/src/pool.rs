// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::str::FromStr;

use crate::error::DbError;
use crate::schema::run_migrations;

/// Create a SqlitePool with WAL mode and foreign keys enforced, then apply
/// the schema.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./pikotunnel.db")
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid, or the underlying error
/// if the connection or migration fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;
	run_migrations(&pool).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn creates_file_database() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("pikotunnel.db").display());
		let pool = create_pool(&url).await.unwrap();

		let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM peers")
			.fetch_one(&pool)
			.await
			.unwrap();
		assert_eq!(count.0, 0);
	}
}
