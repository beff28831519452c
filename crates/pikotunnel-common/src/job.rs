// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::ids::{AccessRuleId, PeerId};
use std::fmt;

/// A unit of convergence work. Carries only the id; the worker re-reads the
/// record when it picks the job up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
	Peer(PeerId),
	AccessRule(AccessRuleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
	Peer,
	AccessRule,
}

impl JobKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobKind::Peer => "peer",
			JobKind::AccessRule => "access_rule",
		}
	}
}

impl Job {
	pub fn kind(&self) -> JobKind {
		match self {
			Job::Peer(_) => JobKind::Peer,
			Job::AccessRule(_) => JobKind::AccessRule,
		}
	}

	pub fn entity_id(&self) -> String {
		match self {
			Job::Peer(id) => id.to_string(),
			Job::AccessRule(id) => id.to_string(),
		}
	}
}

impl fmt::Display for Job {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.kind().as_str(), self.entity_id())
	}
}

impl From<PeerId> for Job {
	fn from(id: PeerId) -> Self {
		Job::Peer(id)
	}
}

impl From<AccessRuleId> for Job {
	fn from(id: AccessRuleId) -> Self {
		Job::AccessRule(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_includes_kind() {
		let id = PeerId::new();
		let job = Job::from(id);
		assert_eq!(job.kind(), JobKind::Peer);
		assert_eq!(job.to_string(), format!("peer:{id}"));

		let rule = AccessRuleId::new();
		assert_eq!(Job::from(rule).to_string(), format!("access_rule:{rule}"));
	}
}
