// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery authentication: secret resolution plus signature verification.
//!
//! Verification runs over the exact raw body bytes the transport received.
//! Every failure path rejects: no signature header, no secret on file for the
//! tenant, malformed header, digest mismatch.

use std::collections::HashMap;
use tracing::warn;

use lattice_common_secret::SecretString;
use lattice_common_webhook::{verify_signature_header, SignatureError};
use lattice_ingest_core::{IngestError, WebhookDelivery};
use lattice_tenants_core::InstallationId;

/// Maps an installation to the shared secret its deliveries are signed with.
///
/// Most deployments run one app-level secret; per-tenant overrides cover
/// installations migrated from a different app registration.
#[derive(Default)]
pub struct SecretResolver {
	default_secret: Option<SecretString>,
	overrides: HashMap<InstallationId, SecretString>,
}

impl SecretResolver {
	pub fn new(default_secret: SecretString) -> Self {
		Self {
			default_secret: Some(default_secret),
			overrides: HashMap::new(),
		}
	}

	pub fn with_override(mut self, id: InstallationId, secret: SecretString) -> Self {
		self.overrides.insert(id, secret);
		self
	}

	/// Secret for a delivery, preferring a per-tenant override.
	///
	/// None means no secret is on file at all; the caller must reject.
	pub fn secret_for(&self, installation: Option<InstallationId>) -> Option<&SecretString> {
		installation
			.and_then(|id| self.overrides.get(&id))
			.or(self.default_secret.as_ref())
	}
}

/// Authenticate one delivery against the resolver's secrets.
///
/// Fails closed: a missing signature header or missing secret is an
/// authentication failure, exactly like a digest mismatch.
pub fn verify_delivery(
	resolver: &SecretResolver,
	delivery: &WebhookDelivery,
) -> Result<(), IngestError> {
	let Some(signature) = delivery.signature.as_deref() else {
		warn!(delivery = %delivery.delivery_id, "delivery carries no signature header");
		return Err(SignatureError::MissingSignature.into());
	};

	let Some(secret) = resolver.secret_for(delivery.installation_hint) else {
		warn!(delivery = %delivery.delivery_id, "no webhook secret on file for delivery");
		return Err(SignatureError::MissingSecret.into());
	};

	verify_signature_header(secret.expose().as_bytes(), signature, &delivery.body)?;
	Ok(())
}
