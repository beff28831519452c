// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! An in-memory host for tests.
//!
//! [`FakeHost`] implements [`CommandRunner`] by recording every invocation and
//! simulating the parts of `wg`, `ip`, `iptables` and `sysctl` the driver
//! uses, so tests can assert on the resulting tunnel peers and filter chains
//! without root.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};

type FailurePredicate = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;

struct InjectedFailure {
	predicate: FailurePredicate,
	code: i32,
}

#[derive(Default)]
struct HostState {
	invocations: Vec<String>,
	links: HashSet<String>,
	/// Public key to allowed-ips.
	peers: HashMap<String, String>,
	/// Chain name to rule specs, head first.
	chains: BTreeMap<String, Vec<String>>,
	sysctl: HashMap<String, String>,
	private_key: Option<String>,
	listen_port: Option<u16>,
}

pub struct FakeHost {
	state: Mutex<HostState>,
	failures: Mutex<Vec<InjectedFailure>>,
	latency: Option<Duration>,
}

impl Default for FakeHost {
	fn default() -> Self {
		Self::new()
	}
}

fn failed(spec: &CommandSpec, stderr: &str) -> CommandError {
	failed_with(spec, 1, stderr)
}

fn failed_with(spec: &CommandSpec, code: i32, stderr: &str) -> CommandError {
	CommandError::Failed {
		command: spec.to_string(),
		code: Some(code),
		stderr: stderr.to_string(),
	}
}

impl FakeHost {
	/// A host with no tunnel interface and only the built-in FORWARD chain.
	pub fn new() -> Self {
		let mut state = HostState::default();
		state.chains.insert("FORWARD".to_string(), Vec::new());
		Self {
			state: Mutex::new(state),
			failures: Mutex::new(Vec::new()),
			latency: None,
		}
	}

	/// Every command sleeps for `latency` before taking effect, which widens
	/// the window for concurrent callers to interleave.
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);
		self
	}

	fn state(&self) -> MutexGuard<'_, HostState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Fail every command whose rendered command line contains `needle` with
	/// exit status 1, without side effects.
	pub fn fail_when_contains(&self, needle: &str) {
		self.fail_with_status(needle, 1);
	}

	/// Like [`fail_when_contains`](Self::fail_when_contains) with a chosen
	/// exit status, e.g. 4 for iptables failing to take the xtables lock.
	pub fn fail_with_status(&self, needle: &str, code: i32) {
		let needle = needle.to_string();
		let predicate: FailurePredicate =
			Box::new(move |spec: &CommandSpec| spec.to_string().contains(&needle));
		self.failures
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(InjectedFailure { predicate, code });
	}

	pub fn clear_failures(&self) {
		self.failures
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clear();
	}

	pub fn invocations(&self) -> Vec<String> {
		self.state().invocations.clone()
	}

	/// Number of recorded command lines starting with `prefix`.
	pub fn count_invocations(&self, prefix: &str) -> usize {
		self.state()
			.invocations
			.iter()
			.filter(|line| line.starts_with(prefix))
			.count()
	}

	pub fn clear_invocations(&self) {
		self.state().invocations.clear();
	}

	pub fn link_exists(&self, name: &str) -> bool {
		self.state().links.contains(name)
	}

	pub fn tunnel_peers(&self) -> HashMap<String, String> {
		self.state().peers.clone()
	}

	pub fn chain(&self, name: &str) -> Option<Vec<String>> {
		self.state().chains.get(name).cloned()
	}

	pub fn sysctl(&self, key: &str) -> Option<String> {
		self.state().sysctl.get(key).cloned()
	}

	pub fn relay_private_key(&self) -> Option<String> {
		self.state().private_key.clone()
	}

	pub fn listen_port(&self) -> Option<u16> {
		self.state().listen_port
	}

	/// True if some chain accepts traffic from `src` to `dst`.
	pub fn allows(&self, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
		let prefix = format!("-s {src} -d {dst} ");
		self.state()
			.chains
			.values()
			.flatten()
			.any(|rule| rule.starts_with(&prefix) && rule.ends_with("-j ACCEPT"))
	}

	/// Total ACCEPT rules across all chains, duplicates included.
	pub fn accept_rule_count(&self) -> usize {
		self.state()
			.chains
			.values()
			.flatten()
			.filter(|rule| rule.ends_with("-j ACCEPT"))
			.count()
	}

	fn apply(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
		let mut state = self.state();
		state.invocations.push(spec.to_string());

		let injected = self
			.failures
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.find(|failure| (failure.predicate)(spec))
			.map(|failure| failure.code);
		if let Some(code) = injected {
			return Err(failed_with(spec, code, "injected failure"));
		}

		let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
		match spec.program.as_str() {
			"wg" => apply_wg(&mut state, spec, &args),
			"ip" => apply_ip(&mut state, spec, &args),
			"iptables" => apply_iptables(&mut state, spec, &args),
			"sysctl" => {
				if let ["-w", setting] = args.as_slice() {
					if let Some((key, value)) = setting.split_once('=') {
						state.sysctl.insert(key.to_string(), value.to_string());
						return Ok(CommandOutput::default());
					}
				}
				Err(failed(spec, "usage: sysctl -w key=value"))
			}
			other => Err(CommandError::NotFound {
				program: other.to_string(),
			}),
		}
	}
}

fn apply_wg(
	state: &mut HostState,
	spec: &CommandSpec,
	args: &[&str],
) -> Result<CommandOutput, CommandError> {
	match args {
		["set", _, "peer", key, "allowed-ips", allowed] => {
			state.peers.insert(key.to_string(), allowed.to_string());
		}
		["set", _, "peer", key, "remove"] => {
			state.peers.remove(*key);
		}
		["set", _, "private-key", "/dev/stdin", "listen-port", port] => {
			let Some(key) = spec.stdin.as_ref() else {
				return Err(failed(spec, "private key missing on stdin"));
			};
			let port = port
				.parse()
				.map_err(|_| failed(spec, "invalid listen port"))?;
			state.private_key = Some(key.expose().clone());
			state.listen_port = Some(port);
		}
		_ => return Err(failed(spec, "unsupported wg invocation")),
	}
	Ok(CommandOutput::default())
}

fn apply_ip(
	state: &mut HostState,
	spec: &CommandSpec,
	args: &[&str],
) -> Result<CommandOutput, CommandError> {
	let missing = |name: &str| failed(spec, &format!("Cannot find device \"{name}\""));

	match args {
		["link", "add", name, "type", "wireguard"] => {
			if !state.links.insert(name.to_string()) {
				return Err(failed(spec, "RTNETLINK answers: File exists"));
			}
		}
		["link", "delete" | "del", name] => {
			if !state.links.remove(*name) {
				return Err(missing(*name));
			}
			state.peers.clear();
			state.private_key = None;
			state.listen_port = None;
		}
		["link", "set", "up" | "down", name] | ["addr", "add", _, "dev", name] => {
			if !state.links.contains(*name) {
				return Err(missing(*name));
			}
		}
		_ => return Err(failed(spec, "unsupported ip invocation")),
	}
	Ok(CommandOutput::default())
}

fn apply_iptables(
	state: &mut HostState,
	spec: &CommandSpec,
	args: &[&str],
) -> Result<CommandOutput, CommandError> {
	let [action, chain, rest @ ..] = args else {
		return Err(failed(spec, "usage: iptables <action> <chain> [rule]"));
	};
	let no_chain = || failed(spec, "iptables: No chain/target/match by that name.");
	let bad_rule = || {
		failed(
			spec,
			"iptables: Bad rule (does a matching rule exist in that chain?).",
		)
	};

	if *action == "-N" {
		if state.chains.contains_key(*chain) {
			return Err(failed(spec, "iptables: Chain already exists."));
		}
		state.chains.insert(chain.to_string(), Vec::new());
		return Ok(CommandOutput::default());
	}
	if *action == "-X" {
		return match state.chains.remove(*chain) {
			Some(_) => Ok(CommandOutput::default()),
			None => Err(no_chain()),
		};
	}

	let rules = state.chains.get_mut(*chain).ok_or_else(no_chain)?;
	match *action {
		"-F" => rules.clear(),
		"-A" => rules.push(rest.join(" ")),
		"-I" => {
			let (position, rule) = rest
				.split_first()
				.and_then(|(first, tail)| first.parse::<usize>().ok().map(|p| (p, tail)))
				.unwrap_or((1, rest));
			let index = position.saturating_sub(1).min(rules.len());
			rules.insert(index, rule.join(" "));
		}
		"-C" => {
			if !rules.contains(&rest.join(" ")) {
				return Err(bad_rule());
			}
		}
		"-D" => {
			let rule = rest.join(" ");
			let Some(index) = rules.iter().position(|r| *r == rule) else {
				return Err(bad_rule());
			};
			rules.remove(index);
		}
		_ => return Err(failed(spec, "unsupported iptables action")),
	}
	Ok(CommandOutput::default())
}

#[async_trait]
impl CommandRunner for FakeHost {
	async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
		if let Some(latency) = self.latency {
			tokio::time::sleep(latency).await;
		}
		self.apply(spec)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn simulates_chain_operations() {
		let host = FakeHost::new();
		let run = |args: &[&str]| {
			let spec = CommandSpec::new("iptables", args.iter().copied());
			host.apply(&spec)
		};

		assert!(run(&["-F", "WG_RULES"]).is_err());
		run(&["-N", "WG_RULES"]).unwrap();
		run(&["-A", "WG_RULES", "-j", "DROP"]).unwrap();
		run(&["-I", "WG_RULES", "1", "-s", "a", "-j", "ACCEPT"]).unwrap();
		assert_eq!(
			host.chain("WG_RULES").unwrap(),
			vec!["-s a -j ACCEPT".to_string(), "-j DROP".to_string()]
		);
		run(&["-C", "WG_RULES", "-s", "a", "-j", "ACCEPT"]).unwrap();
		run(&["-D", "WG_RULES", "-s", "a", "-j", "ACCEPT"]).unwrap();
		assert!(run(&["-D", "WG_RULES", "-s", "a", "-j", "ACCEPT"]).is_err());
		assert_eq!(host.count_invocations("iptables -D"), 2);
	}

	#[tokio::test]
	async fn deleting_link_drops_peers() {
		let host = FakeHost::new();
		host.run(&CommandSpec::new("ip", ["link", "add", "wg0", "type", "wireguard"]))
			.await
			.unwrap();
		host.run(&CommandSpec::new(
			"wg",
			["set", "wg0", "peer", "pk", "allowed-ips", "10.8.0.2/32"],
		))
		.await
		.unwrap();
		assert_eq!(host.tunnel_peers().len(), 1);

		host.run(&CommandSpec::new("ip", ["link", "delete", "wg0"]))
			.await
			.unwrap();
		assert!(host.tunnel_peers().is_empty());
		assert!(!host.link_exists("wg0"));
	}

	#[tokio::test]
	async fn injected_failures_have_no_effect() {
		let host = FakeHost::new();
		host.fail_when_contains("-N WG_RULES");
		let err = host
			.run(&CommandSpec::new("iptables", ["-N", "WG_RULES"]))
			.await
			.unwrap_err();
		assert!(err.is_exit_failure());
		assert!(host.chain("WG_RULES").is_none());

		host.clear_failures();
		host.run(&CommandSpec::new("iptables", ["-N", "WG_RULES"]))
			.await
			.unwrap();
		assert!(host.chain("WG_RULES").is_some());
	}

	#[tokio::test]
	async fn unknown_program_is_not_found() {
		let host = FakeHost::new();
		let err = host
			.run(&CommandSpec::new("nft", ["list", "ruleset"]))
			.await
			.unwrap_err();
		assert!(matches!(err, CommandError::NotFound { .. }));
	}
}
