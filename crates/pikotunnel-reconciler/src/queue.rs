// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded in-memory job queue between producers and the single convergence
//! worker.
//!
//! Jobs from one producer are delivered in the order that producer enqueued
//! them; jobs from different producers interleave arbitrarily. A full queue
//! makes `enqueue` wait instead of dropping the job. The queue is not durable:
//! startup recovery rebuilds pending work from the store.

use pikotunnel_common::Job;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("job queue is closed, {0} was not enqueued")]
pub struct QueueClosed(pub Job);

/// Producer half. Cheap to clone; one clone per producer.
#[derive(Clone)]
pub struct JobSender {
	tx: mpsc::Sender<Job>,
}

/// Consumer half. Not cloneable, so there is exactly one consumer.
pub struct JobReceiver {
	rx: mpsc::Receiver<Job>,
}

/// Create a queue holding at most `capacity` undelivered jobs.
pub fn job_queue(capacity: usize) -> (JobSender, JobReceiver) {
	let (tx, rx) = mpsc::channel(capacity.max(1));
	(JobSender { tx }, JobReceiver { rx })
}

impl JobSender {
	/// Enqueue `job`, waiting for space if the queue is full.
	pub async fn enqueue(&self, job: Job) -> Result<(), QueueClosed> {
		self.tx.send(job).await.map_err(|e| QueueClosed(e.0))?;
		tracing::trace!(%job, "job enqueued");
		Ok(())
	}

	/// Free slots right now.
	pub fn available(&self) -> usize {
		self.tx.capacity()
	}
}

impl JobReceiver {
	/// Next job, or `None` once every sender is gone or the queue was closed
	/// and drained.
	pub async fn next(&mut self) -> Option<Job> {
		self.rx.recv().await
	}

	/// Next job if one is ready right now.
	pub fn try_next(&mut self) -> Option<Job> {
		self.rx.try_recv().ok()
	}

	/// Stop accepting new jobs. Jobs already queued can still be received.
	pub fn close(&mut self) {
		self.rx.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pikotunnel_common::{AccessRuleId, PeerId};
	use std::time::Duration;

	#[tokio::test]
	async fn preserves_producer_order() {
		let (tx, mut rx) = job_queue(8);
		let jobs: Vec<Job> = (0..5)
			.map(|i| {
				if i % 2 == 0 {
					Job::Peer(PeerId::new())
				} else {
					Job::AccessRule(AccessRuleId::new())
				}
			})
			.collect();
		for job in &jobs {
			tx.enqueue(*job).await.unwrap();
		}
		for expected in jobs {
			assert_eq!(rx.next().await, Some(expected));
		}
	}

	#[tokio::test]
	async fn full_queue_blocks_until_consumed() {
		let (tx, mut rx) = job_queue(1);
		tx.enqueue(Job::Peer(PeerId::new())).await.unwrap();
		assert_eq!(tx.available(), 0);

		let second = Job::Peer(PeerId::new());
		let blocked = tokio::time::timeout(Duration::from_millis(50), tx.enqueue(second)).await;
		assert!(blocked.is_err(), "enqueue should wait while the queue is full");

		let producer = {
			let tx = tx.clone();
			tokio::spawn(async move { tx.enqueue(second).await })
		};
		rx.next().await.unwrap();
		producer.await.unwrap().unwrap();
		assert_eq!(rx.next().await, Some(second));
	}

	#[tokio::test]
	async fn close_drains_then_rejects() {
		let (tx, mut rx) = job_queue(4);
		let job = Job::Peer(PeerId::new());
		tx.enqueue(job).await.unwrap();

		rx.close();
		let late = Job::Peer(PeerId::new());
		assert_eq!(tx.enqueue(late).await, Err(QueueClosed(late)));
		assert_eq!(rx.next().await, Some(job));

		drop(tx);
		assert_eq!(rx.next().await, None);
	}
}
