// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use lattice_common_webhook::SignatureError;
use lattice_tenants_core::{Capability, InstallationId, RepoKey};

use crate::delivery::DeliveryId;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while verifying, deduplicating, and routing deliveries.
///
/// `AuthenticationFailure` and `MalformedPayload` are terminal for the
/// delivery and never retried. `DuplicateDelivery` is benign; the caller
/// acknowledges and moves on.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
	#[error("authentication failure: {0}")]
	AuthenticationFailure(#[from] SignatureError),

	#[error("duplicate delivery: {0}")]
	DuplicateDelivery(DeliveryId),

	#[error("malformed payload: {0}")]
	MalformedPayload(#[from] serde_json::Error),

	#[error("installation {installation} is not entitled to {capability}")]
	EntitlementDenied {
		installation: InstallationId,
		capability: Capability,
	},

	#[error("installation {installation} has no access to repository {repository}")]
	RepositoryNotPermitted {
		installation: InstallationId,
		repository: RepoKey,
	},

	#[error("unknown installation: {0}")]
	UnknownInstallation(InstallationId),
}

impl IngestError {
	/// A payload that decoded but carried a semantically invalid field.
	pub fn malformed(detail: impl std::fmt::Display) -> Self {
		use serde::de::Error as _;
		Self::MalformedPayload(serde_json::Error::custom(detail))
	}

	/// Outcome reason string recorded on the event ledger row.
	pub fn reason(&self) -> String {
		self.to_string()
	}
}
