// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pure transition rules for peers and access rules.
//!
//! Nothing here touches the store or the network. The convergence worker asks
//! these functions what to do with a freshly loaded record and the service
//! layer asks them whether an external request may move a record.
//!
//! ```text
//! Peer:        Pending --provisioned--> Created
//!              {Pending, Created} --delete requested--> Deleting
//!              Deleting --teardown finished--> (removed)
//! AccessRule:  Pending --applied--> Created
//! ```

use crate::access_rule::AccessRuleStatus;
use crate::peer::PeerStatus;

/// Something that happened to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
	/// The worker registered the peer on the tunnel interface.
	Provisioned,
	/// An external delete request arrived.
	DeleteRequested,
	/// The worker removed every rule and the tunnel entry.
	TeardownFinished,
}

/// Result of applying a [`PeerEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerTransition {
	To(PeerStatus),
	/// The record should be deleted from the store.
	Remove,
	/// The event is accepted but does not change anything.
	Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event:?} to peer in status {from}")]
pub struct TransitionError {
	pub from: PeerStatus,
	pub event: PeerEvent,
}

/// Compute the next peer state for `event`.
pub fn next_peer_state(
	current: PeerStatus,
	event: PeerEvent,
) -> Result<PeerTransition, TransitionError> {
	use PeerEvent::*;
	use PeerStatus::*;

	match (current, event) {
		(Pending, Provisioned) => Ok(PeerTransition::To(Created)),
		(Pending | Created, DeleteRequested) => Ok(PeerTransition::To(Deleting)),
		(Deleting, DeleteRequested) => Ok(PeerTransition::Unchanged),
		(Deleting, TeardownFinished) => Ok(PeerTransition::Remove),
		(from, event) => Err(TransitionError { from, event }),
	}
}

/// What the worker should do with a peer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerWork {
	/// Add the tunnel entry and mark the peer Created.
	Provision,
	/// Remove referencing rules, the tunnel entry and finally the record.
	Teardown,
	Skip,
}

pub fn plan_peer_job(status: PeerStatus) -> PeerWork {
	match status {
		PeerStatus::Pending => PeerWork::Provision,
		PeerStatus::Deleting => PeerWork::Teardown,
		PeerStatus::Created => PeerWork::Skip,
	}
}

/// What the worker should do with an access rule job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRuleWork {
	/// Install the filter pair and mark the rule Created.
	Apply,
	/// Already applied; replaying would duplicate the filter rules.
	Skip,
}

pub fn plan_access_rule_job(status: AccessRuleStatus) -> AccessRuleWork {
	match status {
		AccessRuleStatus::Pending => AccessRuleWork::Apply,
		AccessRuleStatus::Created => AccessRuleWork::Skip,
	}
}

/// How startup recovery treats a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
	/// Converged before the restart; re-apply to the freshly reset interface.
	Replay,
	/// Unfinished; hand to the worker.
	Enqueue,
}

pub fn peer_recovery(status: PeerStatus) -> RecoveryAction {
	match status {
		PeerStatus::Created => RecoveryAction::Replay,
		PeerStatus::Pending | PeerStatus::Deleting => RecoveryAction::Enqueue,
	}
}

pub fn access_rule_recovery(status: AccessRuleStatus) -> RecoveryAction {
	match status {
		AccessRuleStatus::Created => RecoveryAction::Replay,
		AccessRuleStatus::Pending => RecoveryAction::Enqueue,
	}
}

/// Whether new access rules may reference a peer in `status`.
///
/// A rule attached to a Deleting peer could be created after the teardown
/// cascade already listed the peer's rules and would then outlive it.
pub fn accepts_new_rules(status: PeerStatus) -> bool {
	!matches!(status, PeerStatus::Deleting)
}
