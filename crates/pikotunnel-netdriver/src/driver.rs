// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::Ipv4Net;
use pikotunnel_common::SecretString;
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::command::{CommandError, CommandRunner, CommandSpec};

/// Guard against a chain holding many copies of the same rule.
const MAX_DUPLICATE_DELETES: usize = 16;

#[derive(Debug, Clone)]
pub struct DriverConfig {
	pub interface: String,
	pub chain: String,
	/// Relay address with the subnet prefix, e.g. `10.8.0.1/24`.
	pub relay_cidr: Ipv4Net,
	pub listen_port: u16,
	pub private_key: SecretString,
}

/// One or more commands of a driver operation failed. Every command of the
/// operation was still attempted.
#[derive(Debug, Error)]
#[error("{operation}: {} command(s) failed, first: {}", .failures.len(), first_failure(&.failures))]
pub struct DriverError {
	pub operation: &'static str,
	pub failures: Vec<CommandError>,
}

fn first_failure(failures: &[CommandError]) -> String {
	failures
		.first()
		.map(ToString::to_string)
		.unwrap_or_default()
}

/// Collects failures across the commands of one operation.
struct Attempt {
	operation: &'static str,
	failures: Vec<CommandError>,
}

impl Attempt {
	fn new(operation: &'static str) -> Self {
		Self {
			operation,
			failures: Vec::new(),
		}
	}

	fn record(&mut self, result: Result<(), CommandError>) {
		if let Err(e) = result {
			self.failures.push(e);
		}
	}

	fn finish(self) -> Result<(), DriverError> {
		if self.failures.is_empty() {
			Ok(())
		} else {
			Err(DriverError {
				operation: self.operation,
				failures: self.failures,
			})
		}
	}
}

/// Projects peers and access rules onto the host.
///
/// All operations share one lock, so commands from the convergence worker
/// and the synchronous rule-deletion path never interleave on the interface
/// or the chain.
pub struct NetworkDriver {
	runner: Arc<dyn CommandRunner>,
	config: DriverConfig,
	lock: Mutex<()>,
}

impl NetworkDriver {
	pub fn new(runner: Arc<dyn CommandRunner>, config: DriverConfig) -> Self {
		Self {
			runner,
			config,
			lock: Mutex::new(()),
		}
	}

	pub fn config(&self) -> &DriverConfig {
		&self.config
	}

	async fn run(&self, spec: CommandSpec) -> Result<(), CommandError> {
		self.runner.run(&spec).await.map(|_| ())
	}

	/// Like `run`, for steps expected to fail when the host is already clean.
	async fn run_tolerated(&self, spec: CommandSpec) {
		if let Err(e) = self.runner.run(&spec).await {
			debug!(error = %e, "tolerated command failure");
		}
	}

	fn wg(&self, args: &[&str]) -> CommandSpec {
		let mut full = vec!["set", self.config.interface.as_str()];
		full.extend_from_slice(args);
		CommandSpec::new("wg", full)
	}

	fn iptables(&self, action: &str, chain: &str, rest: &[String]) -> CommandSpec {
		let mut args = vec![action.to_string(), chain.to_string()];
		args.extend_from_slice(rest);
		CommandSpec::new("iptables", args)
	}

	/// `-s src -d dst -i if -o if -j ACCEPT`
	fn accept_spec(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<String> {
		vec![
			"-s".to_string(),
			src.to_string(),
			"-d".to_string(),
			dst.to_string(),
			"-i".to_string(),
			self.config.interface.clone(),
			"-o".to_string(),
			self.config.interface.clone(),
			"-j".to_string(),
			"ACCEPT".to_string(),
		]
	}

	fn hook_spec(&self) -> Vec<String> {
		vec![
			"-i".to_string(),
			self.config.interface.clone(),
			"-o".to_string(),
			self.config.interface.clone(),
			"-j".to_string(),
			self.config.chain.clone(),
		]
	}

	/// `iptables -C` exits 1 when the rule is absent. Any other failure
	/// (lock contention, bad arguments, missing binary) is an error, not an
	/// answer.
	async fn rule_present(&self, rule: &[String]) -> Result<bool, CommandError> {
		match self.run(self.iptables("-C", &self.config.chain, rule)).await {
			Ok(()) => Ok(true),
			Err(e) if e.is_no_match() => Ok(false),
			Err(e) => Err(e),
		}
	}

	/// Register `ip/32` as the allowed address of `public_key`.
	#[instrument(skip(self, public_key), fields(%ip))]
	pub async fn add_tunnel_peer(&self, public_key: &str, ip: Ipv4Addr) -> Result<(), DriverError> {
		let _guard = self.lock.lock().await;
		let mut attempt = Attempt::new("add tunnel peer");
		let allowed = format!("{ip}/32");
		attempt.record(
			self.run(self.wg(&["peer", public_key, "allowed-ips", allowed.as_str()]))
				.await,
		);
		attempt.finish()
	}

	/// Remove `public_key` from the interface. Removing an unknown key is a
	/// no-op for `wg`.
	#[instrument(skip(self, public_key))]
	pub async fn remove_tunnel_peer(&self, public_key: &str) -> Result<(), DriverError> {
		let _guard = self.lock.lock().await;
		let mut attempt = Attempt::new("remove tunnel peer");
		attempt.record(self.run(self.wg(&["peer", public_key, "remove"])).await);
		attempt.finish()
	}

	/// Allow traffic between `a` and `b` in both directions.
	///
	/// Each direction is checked with `iptables -C` first and inserted at the
	/// head of the chain only when absent, so replaying a job never stacks
	/// duplicates.
	#[instrument(skip(self), fields(%a, %b))]
	pub async fn add_filter_pair(&self, a: Ipv4Addr, b: Ipv4Addr) -> Result<(), DriverError> {
		let _guard = self.lock.lock().await;
		let mut attempt = Attempt::new("add filter pair");

		for (src, dst) in [(a, b), (b, a)] {
			let rule = self.accept_spec(src, dst);
			match self.rule_present(&rule).await {
				Ok(false) => {}
				Ok(true) => {
					debug!(%src, %dst, "accept rule already present");
					continue;
				}
				Err(e) => {
					warn!(error = %e, %src, %dst, "could not check accept rule");
					attempt.record(Err(e));
					continue;
				}
			}
			let mut insert = vec!["1".to_string()];
			insert.extend(rule);
			attempt.record(self.run(self.iptables("-I", &self.config.chain, &insert)).await);
		}

		attempt.finish()
	}

	/// Delete both directional rules between `a` and `b`. Absent rules are a
	/// no-op.
	#[instrument(skip(self), fields(%a, %b))]
	pub async fn remove_filter_pair(&self, a: Ipv4Addr, b: Ipv4Addr) -> Result<(), DriverError> {
		let _guard = self.lock.lock().await;
		let mut attempt = Attempt::new("remove filter pair");

		for (src, dst) in [(a, b), (b, a)] {
			let rule = self.accept_spec(src, dst);
			let mut deleted = 0;
			while deleted < MAX_DUPLICATE_DELETES {
				match self.rule_present(&rule).await {
					Ok(false) => {
						if deleted == 0 {
							debug!(%src, %dst, "accept rule already absent");
						}
						break;
					}
					Ok(true) => {}
					Err(e) => {
						warn!(error = %e, %src, %dst, "could not check accept rule");
						attempt.record(Err(e));
						break;
					}
				}
				match self.run(self.iptables("-D", &self.config.chain, &rule)).await {
					Ok(()) => deleted += 1,
					Err(e) => {
						attempt.record(Err(e));
						break;
					}
				}
			}
		}

		attempt.finish()
	}

	/// Reset the interface and the chain to a default-deny baseline.
	///
	/// Every step runs even if an earlier one failed. Teardown steps that fail
	/// because there is nothing to tear down are not reported.
	#[instrument(skip(self), fields(interface = %self.config.interface, chain = %self.config.chain))]
	pub async fn initialize_interface(&self) -> Result<(), DriverError> {
		let _guard = self.lock.lock().await;
		let mut attempt = Attempt::new("initialize interface");
		let interface = self.config.interface.as_str();
		let chain = self.config.chain.as_str();
		let hook = self.hook_spec();

		// Teardown of whatever a previous run left behind.
		self.run_tolerated(self.iptables("-D", "FORWARD", &hook)).await;
		self.run_tolerated(self.iptables("-F", chain, &[])).await;
		self.run_tolerated(self.iptables("-X", chain, &[])).await;
		self.run_tolerated(CommandSpec::new("ip", ["link", "set", "down", interface]))
			.await;
		self.run_tolerated(CommandSpec::new("ip", ["link", "delete", interface]))
			.await;

		let relay_cidr = self.config.relay_cidr.to_string();
		let listen_port = self.config.listen_port.to_string();
		let steps = [
			CommandSpec::new("sysctl", ["-w", "net.ipv4.ip_forward=1"]),
			CommandSpec::new("sysctl", ["-w", "net.ipv4.conf.all.proxy_arp=1"]),
			CommandSpec::new("ip", ["link", "add", interface, "type", "wireguard"]),
			CommandSpec::new("ip", ["addr", "add", relay_cidr.as_str(), "dev", interface]),
			self.wg(&["private-key", "/dev/stdin", "listen-port", listen_port.as_str()])
				.with_stdin(self.config.private_key.clone()),
			CommandSpec::new("ip", ["link", "set", "up", interface]),
			self.iptables("-N", chain, &[]),
			self.iptables("-I", "FORWARD", &hook),
			self.iptables(
				"-A",
				chain,
				&[
					"-i".to_string(),
					interface.to_string(),
					"-o".to_string(),
					interface.to_string(),
					"-j".to_string(),
					"DROP".to_string(),
				],
			),
		];

		for step in steps {
			attempt.record(self.run(step).await);
		}

		attempt.finish()
	}
}
