// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The single consumer of the job queue.
//!
//! Each job carries only an entity id. The worker re-reads the record, asks
//! [`pikotunnel_common::lifecycle`] what the current status calls for, drives
//! the network, and only then records the new status. A job whose driver
//! step fails is abandoned with the entity left in its previous status;
//! startup recovery picks it up again. Jobs are never retried in-process and
//! a failed job never blocks the ones behind it.

use pikotunnel_common::lifecycle::{
	next_peer_state, plan_access_rule_job, plan_peer_job, AccessRuleWork, PeerEvent,
	PeerTransition, PeerWork,
};
use pikotunnel_common::{AccessRuleId, AccessRuleStatus, Job, Peer, PeerId};
use pikotunnel_db::{AccessRuleRepository, DbError, PeerRepository};
use pikotunnel_netdriver::NetworkDriver;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::queue::JobReceiver;

/// Rules can still be attached to a peer between listing them and deleting
/// the peer. Each pass re-lists and retries.
const MAX_TEARDOWN_PASSES: usize = 3;

/// What happened to one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
	/// The entity reached its target status.
	Converged,
	/// The peer and all of its rules are gone.
	Removed,
	/// Nothing to do: the record is gone or already converged.
	Skipped,
	/// A step failed; the entity keeps its previous status.
	Abandoned,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
	pub converged: u64,
	pub removed: u64,
	pub skipped: u64,
	pub abandoned: u64,
}

impl WorkerStats {
	fn record(&mut self, outcome: JobOutcome) {
		match outcome {
			JobOutcome::Converged => self.converged += 1,
			JobOutcome::Removed => self.removed += 1,
			JobOutcome::Skipped => self.skipped += 1,
			JobOutcome::Abandoned => self.abandoned += 1,
		}
	}

	pub fn total(&self) -> u64 {
		self.converged + self.removed + self.skipped + self.abandoned
	}
}

pub struct ConvergenceWorker {
	peers: PeerRepository,
	rules: AccessRuleRepository,
	driver: Arc<NetworkDriver>,
}

impl ConvergenceWorker {
	pub fn new(peers: PeerRepository, rules: AccessRuleRepository, driver: Arc<NetworkDriver>) -> Self {
		Self {
			peers,
			rules,
			driver,
		}
	}

	/// Consume jobs until shutdown is signalled or every sender is gone.
	///
	/// On shutdown the queue is closed and jobs already queued are still
	/// processed before returning.
	pub async fn run(self, mut jobs: JobReceiver, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
		let mut stats = WorkerStats::default();
		info!("convergence worker started");

		loop {
			tokio::select! {
				biased;

				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						info!("convergence worker received shutdown signal");
						break;
					}
				}

				job = jobs.next() => {
					match job {
						Some(job) => stats.record(self.process(job).await),
						None => {
							info!(?stats, "job queue closed, convergence worker stopping");
							return stats;
						}
					}
				}
			}
		}

		jobs.close();
		while let Some(job) = jobs.next().await {
			stats.record(self.process(job).await);
		}

		info!(?stats, "convergence worker stopped");
		stats
	}

	/// Process one job. Errors are logged here and never escape.
	#[instrument(skip(self, job), fields(%job))]
	pub async fn process(&self, job: Job) -> JobOutcome {
		let result = match job {
			Job::Peer(id) => self.process_peer(id).await,
			Job::AccessRule(id) => self.process_access_rule(id).await,
		};

		match result {
			Ok(outcome) => {
				debug!(?outcome, "job finished");
				outcome
			}
			Err(e) => {
				error!(error = %e, "job abandoned");
				JobOutcome::Abandoned
			}
		}
	}

	async fn process_peer(&self, id: PeerId) -> Result<JobOutcome> {
		let Some(peer) = self.peers.get(id).await? else {
			debug!(peer_id = %id, "peer no longer exists");
			return Ok(JobOutcome::Skipped);
		};

		match plan_peer_job(peer.status) {
			PeerWork::Provision => self.provision_peer(&peer).await,
			PeerWork::Teardown => self.teardown_peer(&peer).await,
			PeerWork::Skip => {
				debug!(peer_id = %id, status = %peer.status, "peer already converged");
				Ok(JobOutcome::Skipped)
			}
		}
	}

	async fn provision_peer(&self, peer: &Peer) -> Result<JobOutcome> {
		if let Err(e) = self.driver.add_tunnel_peer(&peer.public_key, peer.ip).await {
			error!(error = %e, peer_id = %peer.id, ip = %peer.ip, "failed to add tunnel peer");
			return Ok(JobOutcome::Abandoned);
		}

		let PeerTransition::To(target) = next_peer_state(peer.status, PeerEvent::Provisioned)? else {
			return Ok(JobOutcome::Skipped);
		};

		if self.peers.transition_status(peer.id, peer.status, target).await? {
			info!(peer_id = %peer.id, ip = %peer.ip, "peer provisioned");
			Ok(JobOutcome::Converged)
		} else {
			// A delete request won the race; its teardown job is queued behind
			// this one and removes the tunnel entry again.
			debug!(peer_id = %peer.id, "peer status changed while provisioning");
			Ok(JobOutcome::Skipped)
		}
	}

	async fn teardown_peer(&self, peer: &Peer) -> Result<JobOutcome> {
		for pass in 1..=MAX_TEARDOWN_PASSES {
			let rules = self.rules.list_for_peer(peer.id).await?;
			for rule in &rules {
				if !self.remove_rule_for_teardown(peer, rule.id, rule.other_endpoint(peer.id)).await? {
					return Ok(JobOutcome::Abandoned);
				}
			}

			if pass == 1 {
				if let Err(e) = self.driver.remove_tunnel_peer(&peer.public_key).await {
					error!(error = %e, peer_id = %peer.id, "failed to remove tunnel peer");
					return Ok(JobOutcome::Abandoned);
				}
			}

			match next_peer_state(peer.status, PeerEvent::TeardownFinished)? {
				PeerTransition::Remove => {}
				other => {
					warn!(peer_id = %peer.id, transition = ?other, "unexpected teardown transition");
					return Ok(JobOutcome::Skipped);
				}
			}

			match self.peers.delete(peer.id).await {
				Ok(_) => {
					info!(peer_id = %peer.id, ip = %peer.ip, rules = rules.len(), "peer removed");
					return Ok(JobOutcome::Removed);
				}
				Err(DbError::Constraint(message)) => {
					warn!(peer_id = %peer.id, pass, %message, "peer still referenced, re-listing rules");
				}
				Err(e) => return Err(e.into()),
			}
		}

		warn!(peer_id = %peer.id, "peer kept gaining rules during teardown");
		Ok(JobOutcome::Abandoned)
	}

	/// Remove one rule of a peer being torn down. Returns false when the
	/// filter pair could not be removed and the cascade must stop.
	async fn remove_rule_for_teardown(
		&self,
		peer: &Peer,
		rule_id: AccessRuleId,
		other: Option<PeerId>,
	) -> Result<bool> {
		let other_peer = match other {
			Some(other_id) => self.peers.get(other_id).await?,
			None => None,
		};

		match other_peer {
			Some(other_peer) => {
				if let Err(e) = self.driver.remove_filter_pair(peer.ip, other_peer.ip).await {
					error!(
						error = %e,
						access_rule_id = %rule_id,
						peer_id = %peer.id,
						"failed to remove filter pair"
					);
					return Ok(false);
				}
			}
			None => {
				warn!(
					access_rule_id = %rule_id,
					peer_id = %peer.id,
					"other endpoint not found, skipping filter removal"
				);
			}
		}

		self.rules.delete(rule_id).await?;
		debug!(access_rule_id = %rule_id, peer_id = %peer.id, "access rule removed with peer");
		Ok(true)
	}

	async fn process_access_rule(&self, id: AccessRuleId) -> Result<JobOutcome> {
		let Some(rule) = self.rules.get(id).await? else {
			debug!(access_rule_id = %id, "access rule no longer exists");
			return Ok(JobOutcome::Skipped);
		};

		if plan_access_rule_job(rule.status) == AccessRuleWork::Skip {
			debug!(access_rule_id = %id, "access rule already applied");
			return Ok(JobOutcome::Skipped);
		}

		let (Some(a), Some(b)) = (
			self.peers.get(rule.peer_a_id).await?,
			self.peers.get(rule.peer_b_id).await?,
		) else {
			warn!(access_rule_id = %id, "access rule endpoint not found");
			return Ok(JobOutcome::Abandoned);
		};

		if let Err(e) = self.driver.add_filter_pair(a.ip, b.ip).await {
			error!(error = %e, access_rule_id = %id, "failed to add filter pair");
			return Ok(JobOutcome::Abandoned);
		}

		if self
			.rules
			.transition_status(id, AccessRuleStatus::Pending, AccessRuleStatus::Created)
			.await?
		{
			info!(access_rule_id = %id, a = %a.ip, b = %b.ip, "access rule applied");
			return Ok(JobOutcome::Converged);
		}

		// The rule was deleted while the filter pair was going in. The delete
		// path already ran its removal, so undo ours.
		if self.rules.get(id).await?.is_none() {
			if let Err(e) = self.driver.remove_filter_pair(a.ip, b.ip).await {
				error!(error = %e, access_rule_id = %id, "failed to undo filter pair of deleted rule");
			}
		}
		Ok(JobOutcome::Skipped)
	}
}
