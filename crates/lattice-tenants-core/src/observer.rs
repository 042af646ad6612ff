// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Observer seam for registry mutations.
//!
//! The registry never blocks on observers; implementations must hand off and
//! return. Aggregation and durable fan-out live behind this trait so the
//! registry has no dependency on the telemetry stack.

use serde::{Deserialize, Serialize};

use crate::installation::InstallationId;
use crate::settings::SubscriptionPlan;

/// A committed registry mutation.
///
/// Emitted after the outcome is known; observers see facts, not intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
	InstallationRegistered {
		id: InstallationId,
		account: String,
		/// False when an existing record was overwritten by a redelivery.
		created: bool,
	},
	InstallationUpdated {
		id: InstallationId,
	},
	InstallationSuspended {
		id: InstallationId,
	},
	InstallationUnsuspended {
		id: InstallationId,
	},
	InstallationDeregistered {
		id: InstallationId,
	},
	SettingsUpdated {
		id: InstallationId,
		plan: SubscriptionPlan,
	},
}

/// Receives committed registry mutations.
///
/// Must not block: the registry calls this while servicing requests.
pub trait RegistryObserver: Send + Sync {
	fn registry_event(&self, event: RegistryEvent);
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistryObserver;

impl RegistryObserver for NoopRegistryObserver {
	fn registry_event(&self, _event: RegistryEvent) {}
}
