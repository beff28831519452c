// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer repository.

use chrono::{DateTime, SecondsFormat, Utc};
use pikotunnel_common::{Peer, PeerId, PeerStatus, SecretString};
use sqlx::{sqlite::SqlitePool, Row};
use std::net::Ipv4Addr;

use crate::error::{DbError, Result};

const PEER_COLUMNS: &str = "id, ip, public_key, private_key, status, created_at";

#[derive(Clone)]
pub struct PeerRepository {
	pool: SqlitePool,
}

impl PeerRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	/// Insert a new peer. An address already owned by another peer yields
	/// [`DbError::Conflict`].
	#[tracing::instrument(skip(self, peer), fields(peer_id = %peer.id, ip = %peer.ip))]
	pub async fn insert(&self, peer: &Peer) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO peers (id, ip, public_key, private_key, status, created_at)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(peer.id.to_string())
		.bind(peer.ip.to_string())
		.bind(&peer.public_key)
		.bind(peer.private_key.expose())
		.bind(peer.status.as_str())
		.bind(peer.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
		.execute(&self.pool)
		.await?;

		tracing::debug!("peer inserted");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(peer_id = %id))]
	pub async fn get(&self, id: PeerId) -> Result<Option<Peer>> {
		let row = sqlx::query(&format!("SELECT {PEER_COLUMNS} FROM peers WHERE id = ?"))
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		row.as_ref().map(parse_peer_row).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list(&self) -> Result<Vec<Peer>> {
		let rows = sqlx::query(&format!(
			"SELECT {PEER_COLUMNS} FROM peers ORDER BY created_at, id"
		))
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_peer_row).collect()
	}

	#[tracing::instrument(skip(self), fields(%status))]
	pub async fn list_by_status(&self, status: PeerStatus) -> Result<Vec<Peer>> {
		let rows = sqlx::query(&format!(
			"SELECT {PEER_COLUMNS} FROM peers WHERE status = ? ORDER BY created_at, id"
		))
		.bind(status.as_str())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_peer_row).collect()
	}

	/// Addresses of every peer still in the store, whatever its status.
	#[tracing::instrument(skip(self))]
	pub async fn used_ips(&self) -> Result<Vec<Ipv4Addr>> {
		let rows: Vec<(String,)> = sqlx::query_as("SELECT ip FROM peers")
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(|(ip,)| parse_ip(&ip)).collect()
	}

	/// Move a peer to Deleting unless it already is. Returns the number of rows
	/// changed, so 0 means "missing or already Deleting".
	#[tracing::instrument(skip(self), fields(peer_id = %id))]
	pub async fn mark_deleting(&self, id: PeerId) -> Result<u64> {
		let result = sqlx::query("UPDATE peers SET status = ? WHERE id = ? AND status <> ?")
			.bind(PeerStatus::Deleting.as_str())
			.bind(id.to_string())
			.bind(PeerStatus::Deleting.as_str())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	/// Compare-and-set the status. Returns false if the peer is gone or no
	/// longer in `from`.
	#[tracing::instrument(skip(self), fields(peer_id = %id, %from, %to))]
	pub async fn transition_status(&self, id: PeerId, from: PeerStatus, to: PeerStatus) -> Result<bool> {
		let result = sqlx::query("UPDATE peers SET status = ? WHERE id = ? AND status = ?")
			.bind(to.as_str())
			.bind(id.to_string())
			.bind(from.as_str())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	/// Remove the record. Fails with [`DbError::Constraint`] while access rules
	/// still reference it.
	#[tracing::instrument(skip(self), fields(peer_id = %id))]
	pub async fn delete(&self, id: PeerId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM peers WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}
}

fn parse_ip(value: &str) -> Result<Ipv4Addr> {
	value
		.parse()
		.map_err(|e| DbError::Internal(format!("Invalid ip {value}: {e}")))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid created_at: {e}")))
}

fn parse_peer_row(row: &sqlx::sqlite::SqliteRow) -> Result<Peer> {
	let id_str: String = row.get("id");
	let ip_str: String = row.get("ip");
	let public_key: String = row.get("public_key");
	let private_key: String = row.get("private_key");
	let status_str: String = row.get("status");
	let created_at_str: String = row.get("created_at");

	let id: PeerId = id_str
		.parse()
		.map_err(|e| DbError::Internal(format!("Invalid peer id: {e}")))?;
	let status: PeerStatus = status_str
		.parse()
		.map_err(|e| DbError::Internal(format!("{e}")))?;

	Ok(Peer {
		id,
		ip: parse_ip(&ip_str)?,
		public_key,
		private_key: SecretString::new(private_key),
		status,
		created_at: parse_timestamp(&created_at_str)?,
	})
}
