// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Convergence worker tuning.

use pikotunnel_common::DEFAULT_MAX_ATTEMPTS;
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
	/// Jobs buffered before producers block.
	pub queue_capacity: usize,
	/// Random draws before the allocator sweeps the subnet.
	pub max_allocation_attempts: u32,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			queue_capacity: DEFAULT_QUEUE_CAPACITY,
			max_allocation_attempts: DEFAULT_MAX_ATTEMPTS,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerConfigLayer {
	#[serde(default)]
	pub queue_capacity: Option<usize>,
	#[serde(default)]
	pub max_allocation_attempts: Option<u32>,
}

impl WorkerConfigLayer {
	pub fn merge(&mut self, other: WorkerConfigLayer) {
		if other.queue_capacity.is_some() {
			self.queue_capacity = other.queue_capacity;
		}
		if other.max_allocation_attempts.is_some() {
			self.max_allocation_attempts = other.max_allocation_attempts;
		}
	}

	pub fn finalize(self) -> Result<WorkerConfig, ConfigError> {
		let queue_capacity = self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
		if queue_capacity == 0 {
			return Err(ConfigError::InvalidValue {
				key: "worker.queue_capacity".to_string(),
				message: "must be at least 1".to_string(),
			});
		}
		let max_allocation_attempts = self.max_allocation_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
		if max_allocation_attempts == 0 {
			return Err(ConfigError::InvalidValue {
				key: "worker.max_allocation_attempts".to_string(),
				message: "must be at least 1".to_string(),
			});
		}

		Ok(WorkerConfig {
			queue_capacity,
			max_allocation_attempts,
		})
	}
}
