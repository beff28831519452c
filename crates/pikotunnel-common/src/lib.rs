// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared domain model for the pikotunnel relay.
//!
//! The relay provisions WireGuard peers on a single interface and gates
//! traffic between them with per-pair filter rules. This crate holds the
//! pieces every other crate agrees on:
//!
//! - [`Peer`] and [`AccessRule`] records with their status enums
//! - the pure lifecycle rules in [`lifecycle`]
//! - the [`Job`] unit of work consumed by the convergence worker
//! - [`IpAllocator`] for picking free subnet addresses
//! - X25519 key generation in [`keys`]
//! - client-side configuration rendering in [`client_config`]

pub mod access_rule;
pub mod client_config;
pub mod ids;
pub mod ip_allocator;
pub mod job;
pub mod keys;
pub mod lifecycle;
pub mod peer;
pub mod secret;

pub use access_rule::{AccessRule, AccessRuleStatus};
pub use client_config::{ClientConfig, RelayEndpoint};
pub use ids::{AccessRuleId, PeerId};
pub use ip_allocator::{AllocationError, IpAllocator, DEFAULT_MAX_ATTEMPTS};
pub use job::{Job, JobKind};
pub use keys::{KeyError, WgKeyPair};
pub use lifecycle::{
	AccessRuleWork, PeerEvent, PeerTransition, PeerWork, RecoveryAction, TransitionError,
};
pub use peer::{Peer, PeerStatus};
pub use secret::{Secret, SecretString, REDACTED};

/// Error returned when a persisted status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
	pub kind: &'static str,
	pub value: String,
}
