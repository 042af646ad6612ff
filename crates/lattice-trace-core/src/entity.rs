// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Traceability entities: requirements, test cases, risks, and configuration
//! items.
//!
//! Entity identity is a prefixed, zero-padded id (`REQ-001`, `TC-014`) whose
//! prefix encodes the kind. Each kind has its own status vocabulary; every
//! vocabulary ends in `Archived`, the terminal state used for soft deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TraceError;

/// Longest accepted entity description.
pub const MAX_DESCRIPTION_LEN: usize = 4_096;

/// The four traceable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
	Requirement,
	TestCase,
	Risk,
	ConfigItem,
}

impl EntityKind {
	pub const ALL: [EntityKind; 4] = [
		EntityKind::Requirement,
		EntityKind::TestCase,
		EntityKind::Risk,
		EntityKind::ConfigItem,
	];

	/// Id prefix for this kind, e.g. `REQ` for requirements.
	pub fn id_prefix(&self) -> &'static str {
		match self {
			Self::Requirement => "REQ",
			Self::TestCase => "TC",
			Self::Risk => "RISK",
			Self::ConfigItem => "CI",
		}
	}

	fn from_id_prefix(prefix: &str) -> Option<Self> {
		match prefix {
			"REQ" => Some(Self::Requirement),
			"TC" => Some(Self::TestCase),
			"RISK" => Some(Self::Risk),
			"CI" => Some(Self::ConfigItem),
			_ => None,
		}
	}
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Requirement => write!(f, "requirement"),
			Self::TestCase => write!(f, "test_case"),
			Self::Risk => write!(f, "risk"),
			Self::ConfigItem => write!(f, "config_item"),
		}
	}
}

impl FromStr for EntityKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"requirement" => Ok(Self::Requirement),
			"test_case" => Ok(Self::TestCase),
			"risk" => Ok(Self::Risk),
			"config_item" => Ok(Self::ConfigItem),
			_ => Err(format!("unknown entity kind: {}", s)),
		}
	}
}

/// Validated entity identifier: `<PREFIX>-<SEQ>`.
///
/// Construction always goes through [`EntityId::parse`] or
/// [`EntityId::generate`] so an `EntityId` in hand is well-formed and its
/// kind is derivable from the prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(String);

impl EntityId {
	/// Parse and validate an id string.
	pub fn parse(s: &str) -> Result<Self, TraceError> {
		let Some((prefix, seq)) = s.split_once('-') else {
			return Err(TraceError::IdFormat(s.to_string()));
		};
		if EntityKind::from_id_prefix(prefix).is_none() {
			return Err(TraceError::IdFormat(s.to_string()));
		}
		if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
			return Err(TraceError::IdFormat(s.to_string()));
		}
		if seq.parse::<u32>().is_err() {
			return Err(TraceError::IdFormat(s.to_string()));
		}
		Ok(Self(s.to_string()))
	}

	/// Build the canonical id for a kind and sequence number, zero-padded to
	/// three digits.
	pub fn generate(kind: EntityKind, seq: u32) -> Self {
		Self(format!("{}-{:03}", kind.id_prefix(), seq))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Kind encoded in the prefix.
	pub fn kind(&self) -> EntityKind {
		let prefix = self.0.split_once('-').map(|(p, _)| p).unwrap_or_default();
		EntityKind::from_id_prefix(prefix).expect("EntityId invariant: valid prefix")
	}

	/// Numeric sequence component.
	pub fn sequence(&self) -> u32 {
		self.0
			.split_once('-')
			.and_then(|(_, s)| s.parse().ok())
			.expect("EntityId invariant: numeric sequence")
	}

	pub fn matches_kind(&self, kind: EntityKind) -> bool {
		self.kind() == kind
	}
}

impl fmt::Display for EntityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for EntityId {
	type Err = TraceError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl Serialize for EntityId {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(&self.0)
	}
}

impl<'de> Deserialize<'de> for EntityId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		EntityId::parse(&s).map_err(serde::de::Error::custom)
	}
}

#[cfg(feature = "openapi")]
impl utoipa::PartialSchema for EntityId {
	fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
		String::schema()
	}
}

#[cfg(feature = "openapi")]
impl utoipa::ToSchema for EntityId {}

/// Requirement lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
	Draft,
	InReview,
	Approved,
	Implemented,
	Verified,
	Archived,
}

/// Test case lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TestCaseStatus {
	Draft,
	Ready,
	Passed,
	Failed,
	Blocked,
	Archived,
}

/// Risk lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
	Identified,
	Assessed,
	Mitigated,
	Accepted,
	Closed,
	Archived,
}

/// Configuration item lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ConfigItemStatus {
	Planned,
	Baselined,
	Controlled,
	Retired,
	Archived,
}

/// Status of an entity, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
	Requirement(RequirementStatus),
	TestCase(TestCaseStatus),
	Risk(RiskStatus),
	ConfigItem(ConfigItemStatus),
}

impl EntityStatus {
	pub fn kind(&self) -> EntityKind {
		match self {
			Self::Requirement(_) => EntityKind::Requirement,
			Self::TestCase(_) => EntityKind::TestCase,
			Self::Risk(_) => EntityKind::Risk,
			Self::ConfigItem(_) => EntityKind::ConfigItem,
		}
	}

	/// Initial status for newly created entities of a kind.
	pub fn initial_for(kind: EntityKind) -> Self {
		match kind {
			EntityKind::Requirement => Self::Requirement(RequirementStatus::Draft),
			EntityKind::TestCase => Self::TestCase(TestCaseStatus::Draft),
			EntityKind::Risk => Self::Risk(RiskStatus::Identified),
			EntityKind::ConfigItem => Self::ConfigItem(ConfigItemStatus::Planned),
		}
	}

	/// Terminal soft-delete status for a kind.
	pub fn archived_for(kind: EntityKind) -> Self {
		match kind {
			EntityKind::Requirement => Self::Requirement(RequirementStatus::Archived),
			EntityKind::TestCase => Self::TestCase(TestCaseStatus::Archived),
			EntityKind::Risk => Self::Risk(RiskStatus::Archived),
			EntityKind::ConfigItem => Self::ConfigItem(ConfigItemStatus::Archived),
		}
	}

	pub fn is_archived(&self) -> bool {
		matches!(
			self,
			Self::Requirement(RequirementStatus::Archived)
				| Self::TestCase(TestCaseStatus::Archived)
				| Self::Risk(RiskStatus::Archived)
				| Self::ConfigItem(ConfigItemStatus::Archived)
		)
	}
}

impl fmt::Display for EntityStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Requirement(s) => write!(f, "{:?}", s),
			Self::TestCase(s) => write!(f, "{:?}", s),
			Self::Risk(s) => write!(f, "{:?}", s),
			Self::ConfigItem(s) => write!(f, "{:?}", s),
		}
	}
}

/// Who performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
	/// A processed webhook delivery.
	Webhook { delivery_id: String },
	/// A direct API caller.
	Api { user: String },
	/// The repository synchronizer.
	Sync,
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Webhook { delivery_id } => write!(f, "webhook:{}", delivery_id),
			Self::Api { user } => write!(f, "api:{}", user),
			Self::Sync => write!(f, "sync"),
		}
	}
}

/// One traceable entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TraceEntity {
	pub id: EntityId,
	pub kind: EntityKind,
	pub description: String,
	pub status: EntityStatus,
	pub created_by: Actor,
	pub created_at: DateTime<Utc>,
	pub updated_by: Actor,
	pub updated_at: DateTime<Utc>,
}

impl TraceEntity {
	/// New entity in its kind's initial status.
	pub fn new(id: EntityId, description: impl Into<String>, actor: Actor) -> Self {
		let now = Utc::now();
		let kind = id.kind();
		Self {
			id,
			kind,
			description: description.into(),
			status: EntityStatus::initial_for(kind),
			created_by: actor.clone(),
			created_at: now,
			updated_by: actor,
			updated_at: now,
		}
	}

	pub fn with_status(mut self, status: EntityStatus) -> Self {
		self.status = status;
		self
	}

	pub fn is_archived(&self) -> bool {
		self.status.is_archived()
	}

	/// Check internal consistency: id prefix, kind, and status vocabulary
	/// must agree, and the description must be present and bounded.
	pub fn validate(&self) -> Result<(), TraceError> {
		if !self.id.matches_kind(self.kind) {
			return Err(TraceError::Validation(format!(
				"id {} does not match kind {}",
				self.id, self.kind
			)));
		}
		if self.status.kind() != self.kind {
			return Err(TraceError::Validation(format!(
				"status {} does not belong to kind {}",
				self.status, self.kind
			)));
		}
		if self.description.trim().is_empty() {
			return Err(TraceError::Validation(
				"description must not be blank".to_string(),
			));
		}
		if self.description.len() > MAX_DESCRIPTION_LEN {
			return Err(TraceError::Validation(format!(
				"description exceeds {} bytes",
				MAX_DESCRIPTION_LEN
			)));
		}
		Ok(())
	}
}
