// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP API for the pikotunnel relay.

pub mod api;
pub mod auth;
pub mod error;
pub mod routes;

pub use api::{create_router, AppState};
pub use error::{ErrorResponse, ServerError};
