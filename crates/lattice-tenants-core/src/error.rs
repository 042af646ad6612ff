// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for tenant operations.

use thiserror::Error;

use crate::installation::InstallationId;
use crate::settings::{AuditLevel, Capability, SubscriptionPlan};

/// Result type for tenant operations.
pub type Result<T> = std::result::Result<T, TenantsError>;

/// Errors that can occur in tenant registry operations.
#[derive(Debug, Error, PartialEq)]
pub enum TenantsError {
	#[error("installation {0} not found")]
	NotFound(InstallationId),

	#[error("installation {0} is not active")]
	Inactive(InstallationId),

	#[error("feature {feature} is not entitled on plan {plan}")]
	FeatureNotEntitled {
		feature: Capability,
		plan: SubscriptionPlan,
	},

	#[error("audit level {audit_level} is not entitled on plan {plan}")]
	AuditLevelNotEntitled {
		audit_level: AuditLevel,
		plan: SubscriptionPlan,
	},

	#[error("validation error: {0}")]
	Validation(String),
}
