// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operations behind the HTTP surface.
//!
//! Creation and peer deletion only write the desired state and enqueue a
//! job; the worker does the network work. Deleting an access rule is the one
//! synchronous path: the record is removed first and the filter pair right
//! after, so a worker applying the same rule concurrently either sees the
//! record gone and undoes its own change, or finishes before the removal.

use pikotunnel_common::lifecycle::{accepts_new_rules, next_peer_state};
use pikotunnel_common::{
	AccessRule, ClientConfig, IpAllocator, Job, Peer, PeerEvent, PeerId, PeerStatus, PeerTransition,
	RelayEndpoint, WgKeyPair,
};
use pikotunnel_db::{AccessRuleRepository, DbError, PeerRepository};
use pikotunnel_netdriver::NetworkDriver;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use crate::error::{ReconcileError, Result};
use crate::queue::JobSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePeerOutcome {
	NotFound,
	/// A teardown is already under way.
	AlreadyDeleting,
	/// The peer is now Deleting and its teardown job is queued.
	Scheduled,
}

/// Result of [`TunnelService::create_access_rule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateRuleOutcome {
	/// Stored as Pending and queued for the worker.
	Created(AccessRule),
	/// The pair was already connected; the stored rule is returned unchanged.
	Existing(AccessRule),
}

impl CreateRuleOutcome {
	pub fn is_created(&self) -> bool {
		matches!(self, CreateRuleOutcome::Created(_))
	}

	pub fn rule(&self) -> &AccessRule {
		match self {
			CreateRuleOutcome::Created(rule) | CreateRuleOutcome::Existing(rule) => rule,
		}
	}

	pub fn into_rule(self) -> AccessRule {
		match self {
			CreateRuleOutcome::Created(rule) | CreateRuleOutcome::Existing(rule) => rule,
		}
	}
}

#[derive(Clone)]
pub struct TunnelService {
	peers: PeerRepository,
	rules: AccessRuleRepository,
	driver: Arc<NetworkDriver>,
	jobs: JobSender,
	allocator: IpAllocator,
	/// Held from reading the used addresses until the new peer is stored.
	allocation: Arc<Mutex<()>>,
	relay: RelayEndpoint,
}

impl TunnelService {
	pub fn new(
		peers: PeerRepository,
		rules: AccessRuleRepository,
		driver: Arc<NetworkDriver>,
		jobs: JobSender,
		allocator: IpAllocator,
		relay: RelayEndpoint,
	) -> Self {
		Self {
			peers,
			rules,
			driver,
			jobs,
			allocator,
			allocation: Arc::new(Mutex::new(())),
			relay,
		}
	}

	/// Allocate an address, generate keys, store the peer as Pending and
	/// queue its provisioning.
	#[instrument(skip(self))]
	pub async fn create_peer(&self) -> Result<Peer> {
		let peer = {
			let _guard = self.allocation.lock().await;
			let used: HashSet<Ipv4Addr> = self.peers.used_ips().await?.into_iter().collect();
			let ip = self.allocator.allocate_random(&used)?;
			let keypair = WgKeyPair::generate();
			let peer = Peer::new_pending(ip, &keypair);
			self.peers.insert(&peer).await?;
			peer
		};

		self.jobs.enqueue(Job::Peer(peer.id)).await?;
		info!(peer_id = %peer.id, ip = %peer.ip, "peer created");
		Ok(peer)
	}

	pub async fn get_peer(&self, id: PeerId) -> Result<Option<Peer>> {
		Ok(self.peers.get(id).await?)
	}

	pub async fn list_peers(&self) -> Result<Vec<Peer>> {
		Ok(self.peers.list().await?)
	}

	pub async fn peer_status(&self, id: PeerId) -> Result<Option<PeerStatus>> {
		Ok(self.peers.get(id).await?.map(|p| p.status))
	}

	/// Mark a peer Deleting and queue its teardown.
	#[instrument(skip(self, id), fields(peer_id = %id))]
	pub async fn delete_peer(&self, id: PeerId) -> Result<DeletePeerOutcome> {
		let Some(peer) = self.peers.get(id).await? else {
			return Ok(DeletePeerOutcome::NotFound);
		};

		if next_peer_state(peer.status, PeerEvent::DeleteRequested)? == PeerTransition::Unchanged {
			debug!("peer already deleting");
			return Ok(DeletePeerOutcome::AlreadyDeleting);
		}

		if self.peers.mark_deleting(id).await? == 0 {
			// Lost a race with another delete or with the teardown itself.
			return Ok(match self.peers.get(id).await? {
				Some(_) => DeletePeerOutcome::AlreadyDeleting,
				None => DeletePeerOutcome::NotFound,
			});
		}

		self.jobs.enqueue(Job::Peer(id)).await?;
		info!("peer scheduled for deletion");
		Ok(DeletePeerOutcome::Scheduled)
	}

	/// Create the rule for `{a, b}`, or return the existing one unchanged.
	#[instrument(skip(self, a, b), fields(peer_a = %a, peer_b = %b))]
	pub async fn create_access_rule(&self, a: PeerId, b: PeerId) -> Result<CreateRuleOutcome> {
		if a == b {
			return Err(ReconcileError::Validation(
				"an access rule needs two different peers".to_string(),
			));
		}

		if let Some(existing) = self.rules.find_by_pair(a, b).await? {
			debug!(access_rule_id = %existing.id, "access rule already exists");
			return Ok(CreateRuleOutcome::Existing(existing));
		}

		for id in [a, b] {
			match self.peers.get(id).await? {
				None => return Err(ReconcileError::Validation(format!("peer {id} not found"))),
				Some(peer) if !accepts_new_rules(peer.status) => {
					return Err(ReconcileError::Validation(format!("peer {id} is being deleted")));
				}
				Some(_) => {}
			}
		}

		let rule = AccessRule::new_pending(a, b);
		match self.rules.insert(&rule).await {
			Ok(()) => {}
			Err(DbError::Conflict(_)) => {
				// A concurrent request created the same pair first.
				if let Some(existing) = self.rules.find_by_pair(a, b).await? {
					debug!(access_rule_id = %existing.id, "access rule created concurrently");
					return Ok(CreateRuleOutcome::Existing(existing));
				}
				return Err(ReconcileError::Store(DbError::Conflict(format!(
					"access rule for {a} and {b} vanished after a conflicting insert"
				))));
			}
			Err(DbError::Constraint(message)) => {
				// A peer was deleted between the check and the insert.
				return Err(ReconcileError::Validation(message));
			}
			Err(e) => return Err(e.into()),
		}

		self.jobs.enqueue(Job::AccessRule(rule.id)).await?;
		info!(access_rule_id = %rule.id, "access rule created");
		Ok(CreateRuleOutcome::Created(rule))
	}

	pub async fn get_access_rule(&self, a: PeerId, b: PeerId) -> Result<Option<AccessRule>> {
		Ok(self.rules.find_by_pair(a, b).await?)
	}

	pub async fn list_access_rules(&self) -> Result<Vec<AccessRule>> {
		Ok(self.rules.list().await?)
	}

	/// Delete the rule for `{a, b}` and remove its filter pair right away.
	///
	/// Returns `None` when no such rule exists. A failed filter removal is
	/// logged; the next start rebuilds the chain from the store.
	#[instrument(skip(self, a, b), fields(peer_a = %a, peer_b = %b))]
	pub async fn delete_access_rule(&self, a: PeerId, b: PeerId) -> Result<Option<AccessRule>> {
		let Some(rule) = self.rules.find_by_pair(a, b).await? else {
			return Ok(None);
		};

		let endpoints = (
			self.peers.get(rule.peer_a_id).await?,
			self.peers.get(rule.peer_b_id).await?,
		);

		if !self.rules.delete(rule.id).await? {
			return Ok(None);
		}

		if let (Some(peer_a), Some(peer_b)) = endpoints {
			if let Err(e) = self.driver.remove_filter_pair(peer_a.ip, peer_b.ip).await {
				error!(error = %e, access_rule_id = %rule.id, "failed to remove filter pair");
			}
		}

		info!(access_rule_id = %rule.id, "access rule deleted");
		Ok(Some(rule))
	}

	pub async fn client_config(&self, id: PeerId) -> Result<Option<ClientConfig>> {
		Ok(self
			.peers
			.get(id)
			.await?
			.map(|peer| ClientConfig::for_peer(&peer, &self.relay)))
	}

	/// Bash up/down script for the peer. The client-side interface reuses the
	/// relay's interface name.
	pub async fn client_script(&self, id: PeerId) -> Result<Option<String>> {
		let interface = self.driver.config().interface.clone();
		Ok(self
			.client_config(id)
			.await?
			.map(|config| config.render_script(&interface)))
	}
}
