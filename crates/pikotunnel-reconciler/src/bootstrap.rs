// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Startup recovery.
//!
//! The interface and filter chain are rebuilt from scratch on every start,
//! converged records are replayed onto them, and unfinished records are
//! handed to the worker. The queue is in-memory only, so this is also how
//! jobs lost in a crash get picked up again.

use pikotunnel_common::lifecycle::{access_rule_recovery, peer_recovery};
use pikotunnel_common::{
	AccessRule, AccessRuleStatus, Job, Peer, PeerId, PeerStatus, RecoveryAction,
};
use pikotunnel_db::{AccessRuleRepository, PeerRepository};
use pikotunnel_netdriver::NetworkDriver;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::error::Result;
use crate::queue::JobSender;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
	pub peers_replayed: usize,
	pub access_rules_replayed: usize,
	/// Driver failures during replay. Each is logged and skipped.
	pub replay_failures: usize,
	pub jobs_enqueued: usize,
}

pub struct BootstrapRecovery {
	peers: PeerRepository,
	rules: AccessRuleRepository,
	driver: Arc<NetworkDriver>,
	jobs: JobSender,
}

impl BootstrapRecovery {
	pub fn new(
		peers: PeerRepository,
		rules: AccessRuleRepository,
		driver: Arc<NetworkDriver>,
		jobs: JobSender,
	) -> Self {
		Self {
			peers,
			rules,
			driver,
			jobs,
		}
	}

	/// Reset the host, replay converged state and enqueue unfinished work.
	///
	/// Enqueueing waits for queue space, so the worker must already be
	/// consuming when there may be more unfinished records than capacity.
	#[instrument(skip(self))]
	pub async fn run(&self) -> Result<RecoveryReport> {
		self.initialize_interface().await;
		let mut report = self.replay_converged().await?;
		report.jobs_enqueued = self.enqueue_unfinished().await?;

		info!(
			peers_replayed = report.peers_replayed,
			access_rules_replayed = report.access_rules_replayed,
			replay_failures = report.replay_failures,
			jobs_enqueued = report.jobs_enqueued,
			"startup recovery finished"
		);
		Ok(report)
	}

	/// Tear down and recreate the interface and chain. Failures are logged;
	/// startup carries on with whatever state the host ended up in.
	pub async fn initialize_interface(&self) {
		if let Err(e) = self.driver.initialize_interface().await {
			error!(error = %e, "failed to initialize tunnel interface");
		}
	}

	/// Re-apply every Created peer and access rule to the fresh interface.
	pub async fn replay_converged(&self) -> Result<RecoveryReport> {
		let mut report = RecoveryReport::default();

		for peer in self.peers_to(RecoveryAction::Replay).await? {
			match self.driver.add_tunnel_peer(&peer.public_key, peer.ip).await {
				Ok(()) => report.peers_replayed += 1,
				Err(e) => {
					error!(error = %e, peer_id = %peer.id, "failed to replay tunnel peer");
					report.replay_failures += 1;
				}
			}
		}

		// Endpoints of a converged rule may themselves still be Pending.
		let mut ips: HashMap<PeerId, Option<Ipv4Addr>> = HashMap::new();
		for rule in self.rules_to(RecoveryAction::Replay).await? {
			let mut endpoints = [None, None];
			for (slot, id) in endpoints.iter_mut().zip([rule.peer_a_id, rule.peer_b_id]) {
				*slot = match ips.get(&id) {
					Some(ip) => *ip,
					None => {
						let ip = self.peers.get(id).await?.map(|p| p.ip);
						ips.insert(id, ip);
						ip
					}
				};
			}
			let [Some(a), Some(b)] = endpoints else {
				warn!(access_rule_id = %rule.id, "access rule endpoint not found, not replaying");
				continue;
			};
			match self.driver.add_filter_pair(a, b).await {
				Ok(()) => report.access_rules_replayed += 1,
				Err(e) => {
					error!(error = %e, access_rule_id = %rule.id, "failed to replay filter pair");
					report.replay_failures += 1;
				}
			}
		}

		Ok(report)
	}

	/// Enqueue Pending and Deleting peers, then Pending access rules.
	pub async fn enqueue_unfinished(&self) -> Result<usize> {
		let mut enqueued = 0;

		for peer in self.peers_to(RecoveryAction::Enqueue).await? {
			self.jobs.enqueue(Job::Peer(peer.id)).await?;
			enqueued += 1;
		}

		for rule in self.rules_to(RecoveryAction::Enqueue).await? {
			self.jobs.enqueue(Job::AccessRule(rule.id)).await?;
			enqueued += 1;
		}

		Ok(enqueued)
	}

	async fn peers_to(&self, action: RecoveryAction) -> Result<Vec<Peer>> {
		let mut peers = Vec::new();
		for status in PeerStatus::ALL {
			if peer_recovery(status) == action {
				peers.extend(self.peers.list_by_status(status).await?);
			}
		}
		Ok(peers)
	}

	async fn rules_to(&self, action: RecoveryAction) -> Result<Vec<AccessRule>> {
		let mut rules = Vec::new();
		for status in AccessRuleStatus::ALL {
			if access_rule_recovery(status) == action {
				rules.extend(self.rules.list_by_status(status).await?);
			}
		}
		Ok(rules)
	}
}
