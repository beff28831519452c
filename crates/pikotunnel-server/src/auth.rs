// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	extract::{Request, State},
	middleware::Next,
	response::Response,
};
use pikotunnel_common::SecretString;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::ServerError;

/// Require the configured API token in `Authorization`, either bare or as a
/// `Bearer` token.
pub async fn api_token_middleware(
	State(expected): State<SecretString>,
	request: Request,
	next: Next,
) -> Result<Response, ServerError> {
	let Some(auth_value) = request
		.headers()
		.get("Authorization")
		.and_then(|h| h.to_str().ok())
	else {
		warn!(path = %request.uri().path(), "auth failed: missing Authorization header");
		return Err(ServerError::Unauthorized);
	};

	let token = auth_value
		.strip_prefix("Bearer ")
		.unwrap_or(auth_value)
		.trim();

	let expected_bytes = expected.expose().as_bytes();
	let token_bytes = token.as_bytes();

	if expected_bytes.len() != token_bytes.len() || !bool::from(expected_bytes.ct_eq(token_bytes)) {
		warn!(path = %request.uri().path(), "auth failed: invalid token");
		return Err(ServerError::Unauthorized);
	}

	Ok(next.run(request).await)
}
