// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			pub fn new() -> Self {
				Self(Uuid::new_v4())
			}

			pub fn from_uuid(uuid: Uuid) -> Self {
				Self(uuid)
			}

			pub fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}

		impl Default for $name {
			fn default() -> Self {
				Self::new()
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl std::str::FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Ok(Self(s.trim().parse()?))
			}
		}
	};
}

entity_id!(
	/// Identifier of a provisioned tunnel endpoint.
	PeerId
);

entity_id!(
	/// Identifier of a permission record between two peers.
	AccessRuleId
);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn peer_id_roundtrip() {
		let id = PeerId::new();
		let parsed: PeerId = id.to_string().parse().unwrap();
		assert_eq!(id, parsed);
	}

	#[test]
	fn parse_trims_whitespace() {
		let id = AccessRuleId::new();
		let parsed: AccessRuleId = format!("  {id}\n").parse().unwrap();
		assert_eq!(id, parsed);
	}

	#[test]
	fn parse_rejects_garbage() {
		assert!("not-a-uuid".parse::<PeerId>().is_err());
	}
}
