// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pikotunnel_reconciler::ReconcileError;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("unauthorized")]
	Unauthorized,
	#[error("bad request: {0}")]
	BadRequest(String),
	#[error("not found: {0}")]
	NotFound(String),
	#[error("internal error: {0}")]
	Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

impl From<ReconcileError> for ServerError {
	fn from(e: ReconcileError) -> Self {
		match e {
			ReconcileError::Validation(msg) => ServerError::BadRequest(msg),
			other => ServerError::Internal(other.to_string()),
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let (status, code, message) = match self {
			ServerError::Unauthorized => (
				StatusCode::UNAUTHORIZED,
				"unauthorized",
				"missing or invalid API token".to_string(),
			),
			ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
			ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
			ServerError::Internal(msg) => {
				tracing::error!(error = %msg, "request failed");
				(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
			}
		};

		(
			status,
			Json(ErrorResponse {
				error: code.to_string(),
				message,
			}),
		)
			.into_response()
	}
}
