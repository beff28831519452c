// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer HTTP handlers.

use axum::{
	extract::{Path, State},
	http::{header, StatusCode},
	response::{IntoResponse, Response},
	Json,
};
use chrono::{DateTime, Utc};
use pikotunnel_common::{ClientConfig, Peer, PeerId, PeerStatus};
use pikotunnel_reconciler::DeletePeerOutcome;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::parse_peer_id;
use crate::api::AppState;
use crate::error::ServerError;

#[derive(Debug, Serialize, Deserialize)]
pub struct PeerResponse {
	pub id: PeerId,
	pub ip: Ipv4Addr,
	pub public_key: String,
	/// Only returned from creation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub private_key: Option<String>,
	pub status: PeerStatus,
	pub created_at: DateTime<Utc>,
}

impl PeerResponse {
	fn public(peer: &Peer) -> Self {
		Self {
			id: peer.id,
			ip: peer.ip,
			public_key: peer.public_key.clone(),
			private_key: None,
			status: peer.status,
			created_at: peer.created_at,
		}
	}

	fn with_private_key(peer: &Peer) -> Self {
		Self {
			private_key: Some(peer.private_key.expose().clone()),
			..Self::public(peer)
		}
	}
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeerStatusResponse {
	pub id: PeerId,
	pub status: PeerStatus,
}

fn peer_not_found(id: PeerId) -> ServerError {
	ServerError::NotFound(format!("peer {id} not found"))
}

/// POST /peers
pub async fn create_peer(State(state): State<AppState>) -> Result<Response, ServerError> {
	let peer = state.service.create_peer().await?;
	Ok((StatusCode::CREATED, Json(PeerResponse::with_private_key(&peer))).into_response())
}

/// GET /peers
pub async fn list_peers(State(state): State<AppState>) -> Result<Json<Vec<PeerResponse>>, ServerError> {
	let peers = state.service.list_peers().await?;
	Ok(Json(peers.iter().map(PeerResponse::public).collect()))
}

/// GET /peers/{id}
pub async fn get_peer(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<PeerResponse>, ServerError> {
	let id = parse_peer_id(&id)?;
	let peer = state
		.service
		.get_peer(id)
		.await?
		.ok_or_else(|| peer_not_found(id))?;
	Ok(Json(PeerResponse::public(&peer)))
}

/// GET /peers/{id}/status
pub async fn get_peer_status(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<PeerStatusResponse>, ServerError> {
	let id = parse_peer_id(&id)?;
	let status = state
		.service
		.peer_status(id)
		.await?
		.ok_or_else(|| peer_not_found(id))?;
	Ok(Json(PeerStatusResponse { id, status }))
}

/// GET /peers/{id}/config
pub async fn get_peer_config(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<ClientConfig>, ServerError> {
	let id = parse_peer_id(&id)?;
	let config = state
		.service
		.client_config(id)
		.await?
		.ok_or_else(|| peer_not_found(id))?;
	Ok(Json(config))
}

/// GET /peers/{id}/script
pub async fn get_peer_script(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Response, ServerError> {
	let id = parse_peer_id(&id)?;
	let script = state
		.service
		.client_script(id)
		.await?
		.ok_or_else(|| peer_not_found(id))?;
	Ok(([(header::CONTENT_TYPE, "text/x-shellscript")], script).into_response())
}

/// DELETE /peers/{id}
///
/// 202 when a teardown was scheduled; 204 when there was nothing to do.
pub async fn delete_peer(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Response, ServerError> {
	let id = parse_peer_id(&id)?;
	match state.service.delete_peer(id).await? {
		DeletePeerOutcome::Scheduled => Ok((
			StatusCode::ACCEPTED,
			Json(PeerStatusResponse {
				id,
				status: PeerStatus::Deleting,
			}),
		)
			.into_response()),
		DeletePeerOutcome::AlreadyDeleting | DeletePeerOutcome::NotFound => {
			Ok(StatusCode::NO_CONTENT.into_response())
		}
	}
}
