// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Startup checks for commands that touch the host network.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Programs the driver shells out to.
pub const REQUIRED_TOOLS: &[&str] = &["wg", "ip", "iptables", "sysctl"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreflightError {
	#[error("must run as root (effective uid {0})")]
	NotRoot(u32),

	#[error("required tools not found in PATH: {}", .0.join(", "))]
	MissingTools(Vec<String>),
}

pub fn ensure_root() -> Result<(), PreflightError> {
	// SAFETY: geteuid has no preconditions and cannot fail.
	let euid = unsafe { libc::geteuid() };
	if euid == 0 {
		Ok(())
	} else {
		Err(PreflightError::NotRoot(euid))
	}
}

/// Check that every tool in `tools` resolves to an executable in `PATH`.
pub fn ensure_tools(tools: &[&str]) -> Result<(), PreflightError> {
	let path = std::env::var_os("PATH").unwrap_or_default();
	ensure_tools_in(&path, tools)
}

fn ensure_tools_in(path: &OsStr, tools: &[&str]) -> Result<(), PreflightError> {
	let dirs: Vec<PathBuf> = std::env::split_paths(path).collect();
	let missing: Vec<String> = tools
		.iter()
		.filter(|tool| !dirs.iter().any(|dir| is_executable(&dir.join(tool))))
		.map(|tool| tool.to_string())
		.collect();

	if missing.is_empty() {
		tracing::debug!(tools = ?tools, "required tools present");
		Ok(())
	} else {
		Err(PreflightError::MissingTools(missing))
	}
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
	use std::os::unix::fs::PermissionsExt;
	path.metadata()
		.map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
		.unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
	path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use std::os::unix::fs::PermissionsExt;

	fn touch(dir: &Path, name: &str, mode: u32) {
		let path = dir.join(name);
		std::fs::write(&path, b"#!/bin/sh\n").unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
	}

	#[test]
	fn finds_tools_across_path_entries() {
		let a = tempfile::tempdir().unwrap();
		let b = tempfile::tempdir().unwrap();
		touch(a.path(), "wg", 0o755);
		touch(b.path(), "ip", 0o755);
		let path = std::env::join_paths([a.path(), b.path()]).unwrap();

		assert_eq!(ensure_tools_in(&path, &["wg", "ip"]), Ok(()));
	}

	#[test]
	fn reports_missing_and_non_executable() {
		let dir = tempfile::tempdir().unwrap();
		touch(dir.path(), "wg", 0o644);
		let path = std::env::join_paths([dir.path()]).unwrap();

		assert_eq!(
			ensure_tools_in(&path, &["wg", "iptables"]),
			Err(PreflightError::MissingTools(vec![
				"wg".to_string(),
				"iptables".to_string()
			]))
		);
	}
}
