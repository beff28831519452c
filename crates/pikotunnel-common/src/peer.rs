// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::ids::PeerId;
use crate::keys::WgKeyPair;
use crate::secret::SecretString;
use crate::UnknownStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
	Pending,
	Created,
	Deleting,
}

impl PeerStatus {
	pub const ALL: [PeerStatus; 3] = [PeerStatus::Pending, PeerStatus::Created, PeerStatus::Deleting];

	pub fn as_str(&self) -> &'static str {
		match self {
			PeerStatus::Pending => "pending",
			PeerStatus::Created => "created",
			PeerStatus::Deleting => "deleting",
		}
	}
}

impl std::str::FromStr for PeerStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(PeerStatus::Pending),
			"created" => Ok(PeerStatus::Created),
			"deleting" => Ok(PeerStatus::Deleting),
			_ => Err(UnknownStatus {
				kind: "peer",
				value: s.to_string(),
			}),
		}
	}
}

impl fmt::Display for PeerStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A tunnel endpoint provisioned on the relay.
///
/// `ip`, `public_key` and `private_key` are fixed at creation; only `status`
/// moves afterwards.
#[derive(Debug, Clone)]
pub struct Peer {
	pub id: PeerId,
	pub ip: Ipv4Addr,
	pub public_key: String,
	pub private_key: SecretString,
	pub status: PeerStatus,
	pub created_at: DateTime<Utc>,
}

impl Peer {
	/// Build a new record in `Pending` state from a freshly generated keypair.
	pub fn new_pending(ip: Ipv4Addr, keypair: &WgKeyPair) -> Self {
		Self {
			id: PeerId::new(),
			ip,
			public_key: keypair.public_key_base64(),
			private_key: keypair.private_key_base64(),
			status: PeerStatus::Pending,
			created_at: Utc::now(),
		}
	}

	/// The allowed-ips entry registered for this peer on the tunnel interface.
	pub fn allowed_ip(&self) -> String {
		format!("{}/32", self.ip)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_roundtrip() {
		for status in [PeerStatus::Pending, PeerStatus::Created, PeerStatus::Deleting] {
			assert_eq!(status.as_str().parse::<PeerStatus>().unwrap(), status);
		}
	}

	#[test]
	fn unknown_status_is_rejected() {
		let err = "gone".parse::<PeerStatus>().unwrap_err();
		assert_eq!(err.kind, "peer");
		assert_eq!(err.to_string(), "unknown peer status: gone");
	}

	#[test]
	fn new_pending_uses_keypair() {
		let keypair = WgKeyPair::generate();
		let peer = Peer::new_pending(Ipv4Addr::new(10, 8, 0, 7), &keypair);
		assert_eq!(peer.status, PeerStatus::Pending);
		assert_eq!(peer.public_key, keypair.public_key_base64());
		assert_eq!(peer.private_key.expose(), keypair.private_key_base64().expose());
		assert_eq!(peer.allowed_ip(), "10.8.0.7/32");
	}

	#[test]
	fn status_serializes_lowercase() {
		let json = serde_json::to_string(&PeerStatus::Deleting).unwrap();
		assert_eq!(json, "\"deleting\"");
	}
}
