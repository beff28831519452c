// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod access_rules;
pub mod health;
pub mod peers;

use pikotunnel_common::PeerId;

use crate::error::ServerError;

pub(crate) fn parse_peer_id(raw: &str) -> Result<PeerId, ServerError> {
	raw.parse()
		.map_err(|_| ServerError::BadRequest(format!("invalid peer id: {raw}")))
}
