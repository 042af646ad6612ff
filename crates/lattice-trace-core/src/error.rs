// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for traceability operations.

use thiserror::Error;

/// Result type for traceability operations.
pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors that can occur in traceability graph operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceError {
	#[error("entity {0} not found")]
	NotFound(String),

	#[error("entity {0} is not part of this project")]
	UnknownEntity(String),

	#[error("project {0} not found")]
	ProjectNotFound(String),

	#[error("invalid entity id: {0}")]
	IdFormat(String),

	#[error("validation error: {0}")]
	Validation(String),
}
