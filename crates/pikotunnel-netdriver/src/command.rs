// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use pikotunnel_common::SecretString;
use std::fmt;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{trace, warn};

/// One external program invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
	pub program: String,
	pub args: Vec<String>,
	/// Written to the child's stdin, then the pipe is closed.
	pub stdin: Option<SecretString>,
}

impl CommandSpec {
	pub fn new<I, S>(program: &str, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			program: program.to_string(),
			args: args.into_iter().map(Into::into).collect(),
			stdin: None,
		}
	}

	pub fn with_stdin(mut self, input: SecretString) -> Self {
		self.stdin = Some(input);
		self
	}
}

impl fmt::Display for CommandSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.program)?;
		for arg in &self.args {
			write!(f, " {arg}")?;
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
	pub stdout: String,
	pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
	#[error("{program} not found in PATH")]
	NotFound { program: String },

	#[error("failed to run `{command}`: {source}")]
	Io {
		command: String,
		#[source]
		source: std::io::Error,
	},

	#[error("`{command}` exited with {}: {stderr}", exit_label(&.code))]
	Failed {
		command: String,
		code: Option<i32>,
		stderr: String,
	},
}

fn exit_label(code: &Option<i32>) -> String {
	match code {
		Some(code) => format!("status {code}"),
		None => "signal".to_string(),
	}
}

impl CommandError {
	/// True for a non-zero exit, as opposed to being unable to run at all.
	pub fn is_exit_failure(&self) -> bool {
		matches!(self, CommandError::Failed { .. })
	}

	/// Exit status 1, which check-style commands such as `iptables -C` use
	/// for "no such rule".
	pub fn is_no_match(&self) -> bool {
		matches!(self, CommandError::Failed { code: Some(1), .. })
	}
}

/// Runs external programs. Implemented by [`SystemCommandRunner`] and by the
/// recording fake in [`crate::testing`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
	async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
	async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
		trace!(command = %spec, "running command");

		let mut cmd = Command::new(&spec.program);
		cmd.args(&spec.args)
			.stdin(if spec.stdin.is_some() {
				Stdio::piped()
			} else {
				Stdio::null()
			})
			.stdout(Stdio::piped())
			.stderr(Stdio::piped());

		let io_error = |source: std::io::Error| {
			if source.kind() == std::io::ErrorKind::NotFound {
				warn!(program = %spec.program, "program not found in PATH");
				CommandError::NotFound {
					program: spec.program.clone(),
				}
			} else {
				CommandError::Io {
					command: spec.to_string(),
					source,
				}
			}
		};

		let mut child = cmd.spawn().map_err(io_error)?;

		if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
			stdin
				.write_all(input.expose().as_bytes())
				.await
				.map_err(io_error)?;
			stdin.write_all(b"\n").await.map_err(io_error)?;
		}

		let output = child.wait_with_output().await.map_err(io_error)?;
		let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
		let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

		if output.status.success() {
			Ok(CommandOutput { stdout, stderr })
		} else {
			Err(CommandError::Failed {
				command: spec.to_string(),
				code: output.status.code(),
				stderr,
			})
		}
	}
}
