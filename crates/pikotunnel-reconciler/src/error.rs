// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use pikotunnel_common::{AllocationError, TransitionError};
use pikotunnel_db::DbError;
use thiserror::Error;

use crate::queue::QueueClosed;

#[derive(Debug, Error)]
pub enum ReconcileError {
	/// The request can never succeed as stated (self-pair, unknown peer,
	/// peer being deleted).
	#[error("validation failed: {0}")]
	Validation(String),

	#[error(transparent)]
	Allocation(#[from] AllocationError),

	#[error("store error: {0}")]
	Store(#[from] DbError),

	#[error("invalid transition: {0}")]
	Transition(#[from] TransitionError),

	#[error(transparent)]
	QueueClosed(#[from] QueueClosed),
}

impl ReconcileError {
	pub fn is_client_error(&self) -> bool {
		matches!(self, ReconcileError::Validation(_))
	}
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
