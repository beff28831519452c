// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration handed to the owner of a peer so they can bring up their side
//! of the tunnel.

use ipnet::Ipv4Net;
use serde::Serialize;
use std::net::Ipv4Addr;

use crate::peer::Peer;

/// Public facts about the relay that every client needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
	pub public_key: String,
	pub public_ip: String,
	pub listen_port: u16,
	/// Network routed through the tunnel, e.g. `10.8.0.0/24`.
	pub client_subnet: Ipv4Net,
}

impl RelayEndpoint {
	pub fn endpoint(&self) -> String {
		format!("{}:{}", self.public_ip, self.listen_port)
	}
}

/// Client-side settings for one peer.
///
/// Contains the peer's private key. Only ever returned to the API caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientConfig {
	pub private_key: String,
	pub public_key: String,
	pub ip: Ipv4Addr,
	pub ip_with_mask: String,
	pub allowed_ips: String,
	pub relay_public_key: String,
	pub endpoint: String,
}

impl ClientConfig {
	pub fn for_peer(peer: &Peer, relay: &RelayEndpoint) -> Self {
		Self {
			private_key: peer.private_key.expose().clone(),
			public_key: peer.public_key.clone(),
			ip: peer.ip,
			ip_with_mask: peer.allowed_ip(),
			allowed_ips: relay.client_subnet.to_string(),
			relay_public_key: relay.public_key.clone(),
			endpoint: relay.endpoint(),
		}
	}

	/// Render a bash script taking `up` or `down` that creates or removes the
	/// client interface.
	pub fn render_script(&self, interface: &str) -> String {
		format!(
			r#"#!/bin/bash
set -euo pipefail

INTERFACE="{interface}"
PRIVATE_KEY="{private_key}"
RELAY_PUBLIC_KEY="{relay_public_key}"
ENDPOINT="{endpoint}"
ALLOWED_IPS="{allowed_ips}"
INTERFACE_IP="{ip_with_mask}"

if [ "$EUID" -ne 0 ]; then
    echo "Please run as root" >&2
    exit 1
fi

up() {{
    ip link add "$INTERFACE" type wireguard
    wg set "$INTERFACE" private-key <(echo "$PRIVATE_KEY") listen-port 0
    wg set "$INTERFACE" peer "$RELAY_PUBLIC_KEY" \
        allowed-ips "$ALLOWED_IPS" \
        endpoint "$ENDPOINT" \
        persistent-keepalive 25
    ip addr add "$INTERFACE_IP" dev "$INTERFACE"
    ip link set "$INTERFACE" up
    ip route add "$ALLOWED_IPS" dev "$INTERFACE"
    echo "$INTERFACE is up"
}}

down() {{
    if ! ip link show "$INTERFACE" >/dev/null 2>&1; then
        echo "$INTERFACE does not exist"
        return 0
    fi
    ip route del "$ALLOWED_IPS" dev "$INTERFACE" 2>/dev/null || true
    ip link set "$INTERFACE" down 2>/dev/null || true
    ip link del "$INTERFACE" 2>/dev/null || true
    echo "$INTERFACE removed"
}}

case "${{1:-}}" in
    up) up ;;
    down) down ;;
    *)
        echo "Usage: $0 <up|down>" >&2
        exit 1
        ;;
esac
"#,
			interface = interface,
			private_key = self.private_key,
			relay_public_key = self.relay_public_key,
			endpoint = self.endpoint,
			allowed_ips = self.allowed_ips,
			ip_with_mask = self.ip_with_mask,
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keys::WgKeyPair;

	fn relay() -> RelayEndpoint {
		RelayEndpoint {
			public_key: "relaypub".to_string(),
			public_ip: "203.0.113.10".to_string(),
			listen_port: 51820,
			client_subnet: "10.8.0.0/24".parse().unwrap(),
		}
	}

	#[test]
	fn config_fields() {
		let keypair = WgKeyPair::generate();
		let peer = Peer::new_pending(Ipv4Addr::new(10, 8, 0, 42), &keypair);
		let config = ClientConfig::for_peer(&peer, &relay());

		assert_eq!(config.ip_with_mask, "10.8.0.42/32");
		assert_eq!(config.allowed_ips, "10.8.0.0/24");
		assert_eq!(config.endpoint, "203.0.113.10:51820");
		assert_eq!(config.relay_public_key, "relaypub");
		assert_eq!(config.public_key, keypair.public_key_base64());

		let json = serde_json::to_value(&config).unwrap();
		for key in [
			"private_key",
			"public_key",
			"ip",
			"ip_with_mask",
			"allowed_ips",
			"relay_public_key",
			"endpoint",
		] {
			assert!(json.get(key).is_some(), "missing {key}");
		}
		assert_eq!(json["ip"], "10.8.0.42");
	}

	#[test]
	fn script_embeds_values() {
		let keypair = WgKeyPair::generate();
		let peer = Peer::new_pending(Ipv4Addr::new(10, 8, 0, 9), &keypair);
		let script = ClientConfig::for_peer(&peer, &relay()).render_script("wg0");

		assert!(script.starts_with("#!/bin/bash\n"));
		assert!(script.contains("INTERFACE=\"wg0\""));
		assert!(script.contains("ENDPOINT=\"203.0.113.10:51820\""));
		assert!(script.contains("INTERFACE_IP=\"10.8.0.9/32\""));
		assert!(script.contains(keypair.private_key_base64().expose().as_str()));
		assert!(script.contains("case \"${1:-}\" in"));
	}
}
