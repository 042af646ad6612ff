// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use lattice_common_http::RetryableError;
use lattice_trace_core::TraceError;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors talking to the upstream record store.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
	#[error("upstream request failed: {0}")]
	Request(#[from] reqwest::Error),

	#[error("upstream returned malformed data: {0}")]
	Malformed(#[from] serde_json::Error),

	#[error("upstream returned status {status} for {url}")]
	Status { status: u16, url: String },
}

impl RetryableError for UpstreamError {
	fn is_retryable(&self) -> bool {
		match self {
			Self::Request(e) => e.is_retryable(),
			Self::Malformed(_) => false,
			Self::Status { status, .. } => *status >= 500 || *status == 429,
		}
	}
}

/// Errors surfaced by the synchronizer's writer facade.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	/// The sync pass could not start. Transient; the caller retries on the
	/// next pass.
	#[error("upstream unavailable: {source}")]
	UpstreamUnavailable {
		#[from]
		source: UpstreamError,
	},

	#[error(transparent)]
	Trace(#[from] TraceError),
}

impl SyncError {
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::UpstreamUnavailable { source } => source.is_retryable(),
			Self::Trace(_) => false,
		}
	}
}
