// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::ids::{AccessRuleId, PeerId};
use crate::UnknownStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRuleStatus {
	Pending,
	Created,
}

impl AccessRuleStatus {
	pub const ALL: [AccessRuleStatus; 2] = [AccessRuleStatus::Pending, AccessRuleStatus::Created];

	pub fn as_str(&self) -> &'static str {
		match self {
			AccessRuleStatus::Pending => "pending",
			AccessRuleStatus::Created => "created",
		}
	}
}

impl std::str::FromStr for AccessRuleStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(AccessRuleStatus::Pending),
			"created" => Ok(AccessRuleStatus::Created),
			_ => Err(UnknownStatus {
				kind: "access rule",
				value: s.to_string(),
			}),
		}
	}
}

impl fmt::Display for AccessRuleStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Permission for two peers to exchange traffic in both directions.
///
/// The pair is unordered: a rule between A and B is the same relationship as
/// one between B and A. The ids are kept in the order they were requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
	pub id: AccessRuleId,
	pub peer_a_id: PeerId,
	pub peer_b_id: PeerId,
	pub status: AccessRuleStatus,
	pub created_at: DateTime<Utc>,
}

impl AccessRule {
	pub fn new_pending(peer_a_id: PeerId, peer_b_id: PeerId) -> Self {
		Self {
			id: AccessRuleId::new(),
			peer_a_id,
			peer_b_id,
			status: AccessRuleStatus::Pending,
			created_at: Utc::now(),
		}
	}

	/// True if this rule covers the unordered pair `{a, b}`.
	pub fn connects(&self, a: PeerId, b: PeerId) -> bool {
		(self.peer_a_id == a && self.peer_b_id == b) || (self.peer_a_id == b && self.peer_b_id == a)
	}

	pub fn involves(&self, peer: PeerId) -> bool {
		self.peer_a_id == peer || self.peer_b_id == peer
	}

	/// The endpoint opposite `peer`, or `None` when `peer` is not part of the rule.
	pub fn other_endpoint(&self, peer: PeerId) -> Option<PeerId> {
		if self.peer_a_id == peer {
			Some(self.peer_b_id)
		} else if self.peer_b_id == peer {
			Some(self.peer_a_id)
		} else {
			None
		}
	}
}
