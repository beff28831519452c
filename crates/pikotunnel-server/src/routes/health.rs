// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::Json;
use serde_json::{json, Value};

/// GET /health - liveness only; no auth.
pub async fn health_check() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}
