// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Change operations, the audit trail they leave, and the observer seam.
//!
//! A [`Change`] is the unit of mutation: webhook handlers, the API surface,
//! and the synchronizer all express their writes as changes so every path
//! shares one validation and audit pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::{Actor, EntityId, TraceEntity};

/// Which optional entity kinds participate in metric rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RollupPolicy {
	pub include_risks: bool,
	pub include_config_items: bool,
}

impl Default for RollupPolicy {
	fn default() -> Self {
		Self {
			include_risks: true,
			include_config_items: true,
		}
	}
}

/// One mutation against a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
	/// Create or replace an entity.
	UpsertEntity { entity: TraceEntity },
	/// Archive an entity and strip its links.
	DeleteEntity { id: EntityId },
	/// Add an undirected trace link.
	Link { source: EntityId, target: EntityId },
	/// Remove an undirected trace link.
	Unlink { source: EntityId, target: EntityId },
	/// Recompute project metrics under a rollup policy.
	RecomputeMetrics { policy: RollupPolicy },
}

impl Change {
	/// The entity id this change is primarily about, when there is one.
	pub fn subject(&self) -> Option<&EntityId> {
		match self {
			Self::UpsertEntity { entity } => Some(&entity.id),
			Self::DeleteEntity { id } => Some(id),
			Self::Link { source, .. } | Self::Unlink { source, .. } => Some(source),
			Self::RecomputeMetrics { .. } => None,
		}
	}
}

/// What a committed change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
	EntityUpserted,
	EntityArchived,
	Linked,
	Unlinked,
	MetricsRecomputed,
	SyncApplied,
}

impl AuditAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::EntityUpserted => "entity_upserted",
			Self::EntityArchived => "entity_archived",
			Self::Linked => "linked",
			Self::Unlinked => "unlinked",
			Self::MetricsRecomputed => "metrics_recomputed",
			Self::SyncApplied => "sync_applied",
		}
	}
}

impl fmt::Display for AuditAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// One line of a project's append-only audit log.
///
/// `before`/`after` are human-readable state summaries, e.g. the entity
/// status on either side of an upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuditEntry {
	pub at: DateTime<Utc>,
	pub actor: Actor,
	pub action: AuditAction,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub entity: Option<EntityId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub before: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub after: Option<String>,
}

impl AuditEntry {
	pub fn new(actor: Actor, action: AuditAction, entity: Option<EntityId>) -> Self {
		Self {
			at: Utc::now(),
			actor,
			action,
			entity,
			before: None,
			after: None,
		}
	}

	pub fn with_before(mut self, before: impl Into<String>) -> Self {
		self.before = Some(before.into());
		self
	}

	pub fn with_after(mut self, after: impl Into<String>) -> Self {
		self.after = Some(after.into());
		self
	}
}

/// Callback fired after a change commits to a project.
///
/// Implementations must not block; hand heavy work to a channel.
pub trait ChangeObserver: Send + Sync {
	fn change_applied(&self, project: &str, entry: &AuditEntry);
}

/// Observer that ignores every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChangeObserver;

impl ChangeObserver for NoopChangeObserver {
	fn change_applied(&self, _project: &str, _entry: &AuditEntry) {}
}
