// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	extract::{Path, State},
	http::StatusCode,
	Json,
};
use pikotunnel_common::{AccessRule, PeerId};

use super::parse_peer_id;
use crate::api::AppState;
use crate::error::ServerError;

fn parse_pair(peer_a_id: &str, peer_b_id: &str) -> Result<(PeerId, PeerId), ServerError> {
	Ok((parse_peer_id(peer_a_id)?, parse_peer_id(peer_b_id)?))
}

fn rule_not_found(a: PeerId, b: PeerId) -> ServerError {
	ServerError::NotFound(format!("no access rule between {a} and {b}"))
}

/// GET /access-rules
pub async fn list_access_rules(
	State(state): State<AppState>,
) -> Result<Json<Vec<AccessRule>>, ServerError> {
	Ok(Json(state.service.list_access_rules().await?))
}

/// POST /access-rule/{peer_a_id}/{peer_b_id}
///
/// 201 for a new rule; 200 with the existing rule unchanged when the pair is
/// already connected.
pub async fn create_access_rule(
	State(state): State<AppState>,
	Path((peer_a_id, peer_b_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<AccessRule>), ServerError> {
	let (a, b) = parse_pair(&peer_a_id, &peer_b_id)?;
	let outcome = state.service.create_access_rule(a, b).await?;
	let status = if outcome.is_created() {
		StatusCode::CREATED
	} else {
		StatusCode::OK
	};
	Ok((status, Json(outcome.into_rule())))
}

/// GET /access-rule/{peer_a_id}/{peer_b_id}
pub async fn get_access_rule(
	State(state): State<AppState>,
	Path((peer_a_id, peer_b_id)): Path<(String, String)>,
) -> Result<Json<AccessRule>, ServerError> {
	let (a, b) = parse_pair(&peer_a_id, &peer_b_id)?;
	let rule = state
		.service
		.get_access_rule(a, b)
		.await?
		.ok_or_else(|| rule_not_found(a, b))?;
	Ok(Json(rule))
}

/// DELETE /access-rule/{peer_a_id}/{peer_b_id}
pub async fn delete_access_rule(
	State(state): State<AppState>,
	Path((peer_a_id, peer_b_id)): Path<(String, String)>,
) -> Result<StatusCode, ServerError> {
	let (a, b) = parse_pair(&peer_a_id, &peer_b_id)?;
	match state.service.delete_access_rule(a, b).await? {
		Some(_) => Ok(StatusCode::NO_CONTENT),
		None => Err(rule_not_found(a, b)),
	}
}
