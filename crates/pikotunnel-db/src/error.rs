// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(sqlx::Error),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Constraint violated: {0}")]
	Constraint(String),

	#[error("Internal: {0}")]
	Internal(String),
}

impl From<sqlx::Error> for DbError {
	fn from(e: sqlx::Error) -> Self {
		if let sqlx::Error::Database(db) = &e {
			if db.is_unique_violation() {
				return DbError::Conflict(db.message().to_string());
			}
			if db.is_foreign_key_violation() || db.is_check_violation() {
				return DbError::Constraint(db.message().to_string());
			}
		}
		DbError::Sqlx(e)
	}
}

pub type Result<T> = std::result::Result<T, DbError>;
