// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Network driver for the relay host.
//!
//! Every change to the live tunnel interface and filter chain goes through
//! [`NetworkDriver`], which shells out to `wg`, `ip`, `iptables` and `sysctl`
//! via a [`CommandRunner`]. Failures are returned to the caller with the
//! captured diagnostic output; deciding whether to log-and-continue is left
//! to the caller.

pub mod command;
pub mod driver;
pub mod preflight;
pub mod testing;

pub use command::{CommandError, CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use driver::{DriverConfig, DriverError, NetworkDriver};
pub use preflight::{ensure_root, ensure_tools, PreflightError, REQUIRED_TOOLS};
