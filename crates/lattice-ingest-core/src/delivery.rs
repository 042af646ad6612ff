// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery envelope, event classification, and the processed-event record.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use lattice_tenants_core::{InstallationId, RepoKey};

/// Upstream-assigned delivery identifier. Stable per delivery attempt and
/// used as the dedupe key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DeliveryId(pub String);

impl DeliveryId {
	/// Validate a delivery id header value.
	pub fn parse(s: &str) -> Result<Self, String> {
		if s.trim().is_empty() {
			return Err("delivery id must not be empty".to_string());
		}
		Ok(Self(s.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for DeliveryId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for DeliveryId {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

/// One inbound webhook delivery as the transport layer hands it over.
///
/// `body` is the exact raw bytes received. Signature verification runs over
/// these bytes, never a re-serialized form.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
	pub delivery_id: DeliveryId,
	pub event: String,
	pub signature: Option<String>,
	pub installation_hint: Option<InstallationId>,
	pub body: Bytes,
	pub received_at: DateTime<Utc>,
}

impl WebhookDelivery {
	pub fn new(delivery_id: DeliveryId, event: impl Into<String>, body: impl Into<Bytes>) -> Self {
		Self {
			delivery_id,
			event: event.into(),
			signature: None,
			installation_hint: None,
			body: body.into(),
			received_at: Utc::now(),
		}
	}

	pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
		self.signature = Some(signature.into());
		self
	}

	pub fn with_installation_hint(mut self, id: InstallationId) -> Self {
		self.installation_hint = Some(id);
		self
	}

	pub fn kind(&self) -> EventKind {
		EventKind::classify(&self.event)
	}
}

/// Closed routing classification of upstream event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
	InstallationLifecycle,
	RepositoryLifecycle,
	ContentChange,
	Ping,
	Unknown,
}

impl EventKind {
	pub const ALL: [EventKind; 5] = [
		EventKind::InstallationLifecycle,
		EventKind::RepositoryLifecycle,
		EventKind::ContentChange,
		EventKind::Ping,
		EventKind::Unknown,
	];

	/// Map an upstream event name onto a routing class. Anything not
	/// recognized is `Unknown`, which is recorded but never dispatched.
	pub fn classify(event: &str) -> Self {
		match event {
			"installation" => Self::InstallationLifecycle,
			"installation_repositories" | "repository" => Self::RepositoryLifecycle,
			"push" => Self::ContentChange,
			"ping" => Self::Ping,
			_ => Self::Unknown,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::InstallationLifecycle => "installation_lifecycle",
			Self::RepositoryLifecycle => "repository_lifecycle",
			Self::ContentChange => "content_change",
			Self::Ping => "ping",
			Self::Unknown => "unknown",
		}
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Terminal outcome of processing one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
	Accepted,
	Duplicate,
	Rejected,
	Failed,
}

impl DeliveryOutcome {
	pub const ALL: [DeliveryOutcome; 4] = [
		DeliveryOutcome::Accepted,
		DeliveryOutcome::Duplicate,
		DeliveryOutcome::Rejected,
		DeliveryOutcome::Failed,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Accepted => "accepted",
			Self::Duplicate => "duplicate",
			Self::Rejected => "rejected",
			Self::Failed => "failed",
		}
	}

	/// Rejected and failed deliveries count against the error rate.
	pub fn is_failure(&self) -> bool {
		matches!(self, Self::Rejected | Self::Failed)
	}
}

impl fmt::Display for DeliveryOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl FromStr for DeliveryOutcome {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"accepted" => Ok(Self::Accepted),
			"duplicate" => Ok(Self::Duplicate),
			"rejected" => Ok(Self::Rejected),
			"failed" => Ok(Self::Failed),
			_ => Err(format!("unknown delivery outcome: {}", s)),
		}
	}
}

/// Immutable record of one processed delivery. The body is not retained;
/// this is the row the event ledger stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WebhookEventRecord {
	pub id: Uuid,
	pub delivery_id: DeliveryId,
	pub event: String,
	pub kind: EventKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub action: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub installation_id: Option<InstallationId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub repository: Option<RepoKey>,
	pub outcome: DeliveryOutcome,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	pub received_at: DateTime<Utc>,
	pub processed_at: DateTime<Utc>,
}

impl WebhookEventRecord {
	pub fn from_delivery(delivery: &WebhookDelivery, outcome: DeliveryOutcome) -> Self {
		Self {
			id: Uuid::new_v4(),
			delivery_id: delivery.delivery_id.clone(),
			event: delivery.event.clone(),
			kind: delivery.kind(),
			action: None,
			installation_id: delivery.installation_hint,
			repository: None,
			outcome,
			reason: None,
			received_at: delivery.received_at,
			processed_at: Utc::now(),
		}
	}

	pub fn with_action(mut self, action: impl Into<String>) -> Self {
		self.action = Some(action.into());
		self
	}

	pub fn with_installation(mut self, id: InstallationId) -> Self {
		self.installation_id = Some(id);
		self
	}

	pub fn with_repository(mut self, repository: RepoKey) -> Self {
		self.repository = Some(repository);
		self
	}

	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());
		self
	}

	pub fn is_failure(&self) -> bool {
		self.outcome.is_failure()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	mod delivery_id {
		use super::*;

		#[test]
		fn test_parse_rejects_empty() {
			assert!(DeliveryId::parse("").is_err());
			assert!(DeliveryId::parse("   ").is_err());
		}

		#[test]
		fn test_parse_accepts_opaque_ids() {
			let id = DeliveryId::parse("72d3162e-cc78-11e3-81ab-4c9367dc0958").unwrap();
			assert_eq!(id.as_str(), "72d3162e-cc78-11e3-81ab-4c9367dc0958");
		}
	}

	mod classify {
		use super::*;

		#[test]
		fn test_known_event_names() {
			assert_eq!(
				EventKind::classify("installation"),
				EventKind::InstallationLifecycle
			);
			assert_eq!(
				EventKind::classify("installation_repositories"),
				EventKind::RepositoryLifecycle
			);
			assert_eq!(
				EventKind::classify("repository"),
				EventKind::RepositoryLifecycle
			);
			assert_eq!(EventKind::classify("push"), EventKind::ContentChange);
			assert_eq!(EventKind::classify("ping"), EventKind::Ping);
		}

		#[test]
		fn test_unrecognized_names_are_unknown() {
			assert_eq!(EventKind::classify("workflow_run"), EventKind::Unknown);
			assert_eq!(EventKind::classify(""), EventKind::Unknown);
			// Classification is exact, not case-folded.
			assert_eq!(EventKind::classify("Push"), EventKind::Unknown);
		}
	}

	mod outcome {
		use super::*;

		#[test]
		fn test_failure_classification() {
			assert!(!DeliveryOutcome::Accepted.is_failure());
			assert!(!DeliveryOutcome::Duplicate.is_failure());
			assert!(DeliveryOutcome::Rejected.is_failure());
			assert!(DeliveryOutcome::Failed.is_failure());
		}

		#[test]
		fn test_round_trips_via_str() {
			for outcome in DeliveryOutcome::ALL {
				assert_eq!(outcome.as_str().parse::<DeliveryOutcome>(), Ok(outcome));
			}
		}
	}

	#[test]
	fn test_record_carries_envelope_fields() {
		let delivery = WebhookDelivery::new(
			DeliveryId::parse("d-1").unwrap(),
			"installation",
			&b"{}"[..],
		)
		.with_installation_hint(InstallationId(12345));

		let record = WebhookEventRecord::from_delivery(&delivery, DeliveryOutcome::Accepted)
			.with_action("created");

		assert_eq!(record.delivery_id, delivery.delivery_id);
		assert_eq!(record.kind, EventKind::InstallationLifecycle);
		assert_eq!(record.installation_id, Some(InstallationId(12345)));
		assert_eq!(record.action.as_deref(), Some("created"));
		assert_eq!(record.received_at, delivery.received_at);
	}

	#[test]
	fn test_record_serde_omits_empty_optionals() {
		let delivery = WebhookDelivery::new(DeliveryId::parse("d-2").unwrap(), "ping", &b"{}"[..]);
		let record = WebhookEventRecord::from_delivery(&delivery, DeliveryOutcome::Accepted);

		let json = serde_json::to_value(&record).unwrap();
		assert!(json.get("action").is_none());
		assert!(json.get("repository").is_none());
		assert!(json.get("reason").is_none());
	}
}
