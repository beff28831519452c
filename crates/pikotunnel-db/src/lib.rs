// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the relay's desired state.
//!
//! The store is the single source of truth: the live tunnel and filter
//! configuration is rebuilt from these two tables on every start.

pub mod access_rule;
pub mod backup;
pub mod error;
pub mod peer;
pub mod pool;
pub mod schema;
pub mod testing;

pub use access_rule::AccessRuleRepository;
pub use backup::{backup_database, default_backup_path};
pub use error::{DbError, Result};
pub use peer::PeerRepository;
pub use pool::create_pool;
pub use schema::run_migrations;
pub use sqlx::SqlitePool;
