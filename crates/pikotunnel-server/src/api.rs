// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	middleware,
	routing::get,
	Router,
};
use pikotunnel_common::SecretString;
use pikotunnel_reconciler::TunnelService;
use tower_http::trace::TraceLayer;

use crate::auth::api_token_middleware;
use crate::routes::{access_rules, health, peers};

#[derive(Clone)]
pub struct AppState {
	pub service: TunnelService,
}

impl AppState {
	pub fn new(service: TunnelService) -> Self {
		Self { service }
	}
}

/// Build the API router. Everything except `/health` requires `api_token`.
pub fn create_router(state: AppState, api_token: SecretString) -> Router {
	let protected = Router::new()
		.route("/peers", get(peers::list_peers).post(peers::create_peer))
		.route(
			"/peers/{id}",
			get(peers::get_peer).delete(peers::delete_peer),
		)
		.route("/peers/{id}/status", get(peers::get_peer_status))
		.route("/peers/{id}/config", get(peers::get_peer_config))
		.route("/peers/{id}/script", get(peers::get_peer_script))
		.route("/access-rules", get(access_rules::list_access_rules))
		.route(
			"/access-rule/{peer_a_id}/{peer_b_id}",
			get(access_rules::get_access_rule)
				.post(access_rules::create_access_rule)
				.delete(access_rules::delete_access_rule),
		)
		.layer(middleware::from_fn_with_state(api_token, api_token_middleware));

	Router::new()
		.route("/health", get(health::health_check))
		.merge(protected)
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}
