// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access rule repository.
//!
//! Rules are keyed by id but looked up by unordered pair; the unique index on
//! `(min(a, b), max(a, b))` makes a second rule for the same pair a
//! [`DbError::Conflict`] regardless of the order the ids arrive in.

use chrono::SecondsFormat;
use pikotunnel_common::{AccessRule, AccessRuleId, AccessRuleStatus, PeerId};
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::{DbError, Result};
use crate::peer::parse_timestamp;

const RULE_COLUMNS: &str = "id, peer_a_id, peer_b_id, status, created_at";

#[derive(Clone)]
pub struct AccessRuleRepository {
	pool: SqlitePool,
}

impl AccessRuleRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id, peer_a = %rule.peer_a_id, peer_b = %rule.peer_b_id))]
	pub async fn insert(&self, rule: &AccessRule) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO access_rules (id, peer_a_id, peer_b_id, status, created_at)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(rule.id.to_string())
		.bind(rule.peer_a_id.to_string())
		.bind(rule.peer_b_id.to_string())
		.bind(rule.status.as_str())
		.bind(rule.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
		.execute(&self.pool)
		.await?;

		tracing::debug!("access rule inserted");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(rule_id = %id))]
	pub async fn get(&self, id: AccessRuleId) -> Result<Option<AccessRule>> {
		let row = sqlx::query(&format!(
			"SELECT {RULE_COLUMNS} FROM access_rules WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_rule_row).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list(&self) -> Result<Vec<AccessRule>> {
		let rows = sqlx::query(&format!(
			"SELECT {RULE_COLUMNS} FROM access_rules ORDER BY created_at, id"
		))
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_rule_row).collect()
	}

	/// Find the rule for `{a, b}` in either order.
	#[tracing::instrument(skip(self), fields(peer_a = %a, peer_b = %b))]
	pub async fn find_by_pair(&self, a: PeerId, b: PeerId) -> Result<Option<AccessRule>> {
		let row = sqlx::query(&format!(
			r#"
			SELECT {RULE_COLUMNS} FROM access_rules
			WHERE (peer_a_id = ?1 AND peer_b_id = ?2) OR (peer_a_id = ?2 AND peer_b_id = ?1)
			"#
		))
		.bind(a.to_string())
		.bind(b.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(parse_rule_row).transpose()
	}

	/// Every rule with `peer` on either side.
	#[tracing::instrument(skip(self), fields(peer_id = %peer))]
	pub async fn list_for_peer(&self, peer: PeerId) -> Result<Vec<AccessRule>> {
		let rows = sqlx::query(&format!(
			r#"
			SELECT {RULE_COLUMNS} FROM access_rules
			WHERE peer_a_id = ?1 OR peer_b_id = ?1
			ORDER BY created_at, id
			"#
		))
		.bind(peer.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_rule_row).collect()
	}

	#[tracing::instrument(skip(self), fields(%status))]
	pub async fn list_by_status(&self, status: AccessRuleStatus) -> Result<Vec<AccessRule>> {
		let rows = sqlx::query(&format!(
			"SELECT {RULE_COLUMNS} FROM access_rules WHERE status = ? ORDER BY created_at, id"
		))
		.bind(status.as_str())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_rule_row).collect()
	}

	#[tracing::instrument(skip(self), fields(rule_id = %id, %from, %to))]
	pub async fn transition_status(
		&self,
		id: AccessRuleId,
		from: AccessRuleStatus,
		to: AccessRuleStatus,
	) -> Result<bool> {
		let result = sqlx::query("UPDATE access_rules SET status = ? WHERE id = ? AND status = ?")
			.bind(to.as_str())
			.bind(id.to_string())
			.bind(from.as_str())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self), fields(rule_id = %id))]
	pub async fn delete(&self, id: AccessRuleId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM access_rules WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}
}

fn parse_rule_row(row: &sqlx::sqlite::SqliteRow) -> Result<AccessRule> {
	let id_str: String = row.get("id");
	let peer_a_str: String = row.get("peer_a_id");
	let peer_b_str: String = row.get("peer_b_id");
	let status_str: String = row.get("status");
	let created_at_str: String = row.get("created_at");

	let id: AccessRuleId = id_str
		.parse()
		.map_err(|e| DbError::Internal(format!("Invalid access rule id: {e}")))?;
	let peer_a_id: PeerId = peer_a_str
		.parse()
		.map_err(|e| DbError::Internal(format!("Invalid peer_a_id: {e}")))?;
	let peer_b_id: PeerId = peer_b_str
		.parse()
		.map_err(|e| DbError::Internal(format!("Invalid peer_b_id: {e}")))?;
	let status: AccessRuleStatus = status_str
		.parse()
		.map_err(|e| DbError::Internal(format!("{e}")))?;

	Ok(AccessRule {
		id,
		peer_a_id,
		peer_b_id,
		status,
		created_at: parse_timestamp(&created_at_str)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::peer::PeerRepository;
	use crate::testing::create_test_pool;
	use pikotunnel_common::{Peer, WgKeyPair};
	use std::net::Ipv4Addr;

	async fn setup() -> (PeerRepository, AccessRuleRepository, Vec<PeerId>) {
		let pool = create_test_pool().await;
		let peers = PeerRepository::new(pool.clone());
		let mut ids = Vec::new();
		for octet in 2..5 {
			let peer = Peer::new_pending(Ipv4Addr::new(10, 8, 0, octet), &WgKeyPair::generate());
			peers.insert(&peer).await.unwrap();
			ids.push(peer.id);
		}
		(peers, AccessRuleRepository::new(pool), ids)
	}

	#[tokio::test]
	async fn find_by_pair_in_either_order() {
		let (_, rules, ids) = setup().await;
		let rule = AccessRule::new_pending(ids[0], ids[1]);
		rules.insert(&rule).await.unwrap();

		assert_eq!(rules.find_by_pair(ids[0], ids[1]).await.unwrap().unwrap().id, rule.id);
		assert_eq!(rules.find_by_pair(ids[1], ids[0]).await.unwrap().unwrap().id, rule.id);
		assert!(rules.find_by_pair(ids[0], ids[2]).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn reversed_pair_is_conflict() {
		let (_, rules, ids) = setup().await;
		rules.insert(&AccessRule::new_pending(ids[0], ids[1])).await.unwrap();

		let err = rules
			.insert(&AccessRule::new_pending(ids[1], ids[0]))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)), "got {err:?}");
	}

	#[tokio::test]
	async fn self_pair_violates_check() {
		let (_, rules, ids) = setup().await;
		let err = rules
			.insert(&AccessRule::new_pending(ids[0], ids[0]))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Constraint(_)), "got {err:?}");
	}

	#[tokio::test]
	async fn unknown_peer_violates_foreign_key() {
		let (_, rules, ids) = setup().await;
		let err = rules
			.insert(&AccessRule::new_pending(ids[0], PeerId::new()))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Constraint(_)), "got {err:?}");
	}

	#[tokio::test]
	async fn peer_with_rules_cannot_be_deleted() {
		let (peers, rules, ids) = setup().await;
		let rule = AccessRule::new_pending(ids[0], ids[1]);
		rules.insert(&rule).await.unwrap();

		let err = peers.delete(ids[0]).await.unwrap_err();
		assert!(matches!(err, DbError::Constraint(_)), "got {err:?}");

		assert!(rules.delete(rule.id).await.unwrap());
		assert!(peers.delete(ids[0]).await.unwrap());
	}

	#[tokio::test]
	async fn list_for_peer_and_status() {
		let (_, rules, ids) = setup().await;
		let ab = AccessRule::new_pending(ids[0], ids[1]);
		let ca = AccessRule::new_pending(ids[2], ids[0]);
		let bc = AccessRule::new_pending(ids[1], ids[2]);
		for rule in [&ab, &ca, &bc] {
			rules.insert(rule).await.unwrap();
		}

		let for_a: Vec<_> = rules
			.list_for_peer(ids[0])
			.await
			.unwrap()
			.into_iter()
			.map(|r| r.id)
			.collect();
		assert_eq!(for_a.len(), 2);
		assert!(for_a.contains(&ab.id));
		assert!(for_a.contains(&ca.id));

		assert!(rules
			.transition_status(bc.id, AccessRuleStatus::Pending, AccessRuleStatus::Created)
			.await
			.unwrap());
		let created = rules.list_by_status(AccessRuleStatus::Created).await.unwrap();
		assert_eq!(created.len(), 1);
		assert_eq!(created[0].id, bc.id);
		assert_eq!(rules.list_by_status(AccessRuleStatus::Pending).await.unwrap().len(), 2);
		assert_eq!(rules.list().await.unwrap().len(), 3);
	}
}
