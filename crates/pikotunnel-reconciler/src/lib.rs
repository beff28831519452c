// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Convergence of the relay's live network state onto the stored state.
//!
//! - [`TunnelService`] records intent and enqueues jobs
//! - [`ConvergenceWorker`] is the single consumer that drives the network
//! - [`BootstrapRecovery`] rebuilds everything at startup

pub mod bootstrap;
pub mod error;
pub mod queue;
pub mod service;
pub mod worker;

pub use bootstrap::{BootstrapRecovery, RecoveryReport};
pub use error::{ReconcileError, Result};
pub use queue::{job_queue, JobReceiver, JobSender, QueueClosed};
pub use service::{CreateRuleOutcome, DeletePeerOutcome, TunnelService};
pub use worker::{ConvergenceWorker, JobOutcome, WorkerStats};
