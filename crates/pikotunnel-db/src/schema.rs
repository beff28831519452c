// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS peers (
		id TEXT PRIMARY KEY,
		ip TEXT NOT NULL UNIQUE,
		public_key TEXT NOT NULL,
		private_key TEXT NOT NULL,
		status TEXT NOT NULL CHECK (status IN ('pending', 'created', 'deleting')),
		created_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_peers_status ON peers(status)",
	r#"
	CREATE TABLE IF NOT EXISTS access_rules (
		id TEXT PRIMARY KEY,
		peer_a_id TEXT NOT NULL REFERENCES peers(id),
		peer_b_id TEXT NOT NULL REFERENCES peers(id),
		status TEXT NOT NULL CHECK (status IN ('pending', 'created')),
		created_at TEXT NOT NULL,
		CHECK (peer_a_id <> peer_b_id)
	)
	"#,
	// One rule per unordered pair.
	r#"
	CREATE UNIQUE INDEX IF NOT EXISTS idx_access_rules_pair
		ON access_rules(min(peer_a_id, peer_b_id), max(peer_a_id, peer_b_id))
	"#,
	"CREATE INDEX IF NOT EXISTS idx_access_rules_peer_a ON access_rules(peer_a_id)",
	"CREATE INDEX IF NOT EXISTS idx_access_rules_peer_b ON access_rules(peer_b_id)",
	"CREATE INDEX IF NOT EXISTS idx_access_rules_status ON access_rules(status)",
];

/// Create tables and indexes if they do not exist yet.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	for statement in STATEMENTS {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!(statements = STATEMENTS.len(), "schema applied");
	Ok(())
}
