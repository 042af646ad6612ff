// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the telemetry pipeline.

use thiserror::Error;

/// Errors a ledger sink can report, split by whether a retry could help.
///
/// The hub logs these and moves on; a failing sink never blocks delivery
/// processing or the other sinks.
#[derive(Error, Debug)]
pub enum LedgerSinkError {
	/// Temporary failure, a later write may succeed.
	#[error("transient error: {0}")]
	Transient(String),

	/// Persistent failure, retrying will not help.
	#[error("permanent error: {0}")]
	Permanent(String),
}
