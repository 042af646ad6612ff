// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-repository project data: entities, the trace-link graph, the audit
//! trail, and rollup metrics.
//!
//! All mutation goes through [`ProjectData::apply_change`] or the named
//! operation methods it dispatches to. Every operation validates before
//! touching state, so a returned error means the project is exactly as it
//! was. Successful mutations append to the audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::change::{AuditAction, AuditEntry, Change, RollupPolicy};
use crate::entity::{
	Actor, ConfigItemStatus, EntityId, EntityKind, EntityStatus, RiskStatus, TraceEntity,
};
use crate::error::{Result, TraceError};
use crate::graph::LinkGraph;

/// Rolled-up health numbers for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProjectMetrics {
	pub requirements_total: usize,
	pub requirements_covered: usize,
	pub tests_total: usize,
	pub risks_open: usize,
	pub config_items_controlled: usize,
	pub links_total: usize,
	pub coverage_percent: f64,
	pub computed_at: DateTime<Utc>,
}

impl Default for ProjectMetrics {
	fn default() -> Self {
		Self {
			requirements_total: 0,
			requirements_covered: 0,
			tests_total: 0,
			risks_open: 0,
			config_items_controlled: 0,
			links_total: 0,
			// No requirements means nothing is uncovered.
			coverage_percent: 100.0,
			computed_at: Utc::now(),
		}
	}
}

/// All traceability state for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProjectData {
	name: String,
	requirements: BTreeMap<EntityId, TraceEntity>,
	tests: BTreeMap<EntityId, TraceEntity>,
	risks: BTreeMap<EntityId, TraceEntity>,
	config_items: BTreeMap<EntityId, TraceEntity>,
	links: LinkGraph,
	audit_log: Vec<AuditEntry>,
	metrics: ProjectMetrics,
	next_seq: BTreeMap<EntityKind, u32>,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl ProjectData {
	pub fn new(name: impl Into<String>) -> Self {
		let now = Utc::now();
		Self {
			name: name.into(),
			requirements: BTreeMap::new(),
			tests: BTreeMap::new(),
			risks: BTreeMap::new(),
			config_items: BTreeMap::new(),
			links: LinkGraph::new(),
			audit_log: Vec::new(),
			metrics: ProjectMetrics::default(),
			next_seq: BTreeMap::new(),
			created_at: now,
			updated_at: now,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn created_at(&self) -> DateTime<Utc> {
		self.created_at
	}

	pub fn updated_at(&self) -> DateTime<Utc> {
		self.updated_at
	}

	pub fn metrics(&self) -> &ProjectMetrics {
		&self.metrics
	}

	pub fn audit_log(&self) -> &[AuditEntry] {
		&self.audit_log
	}

	pub fn link_graph(&self) -> &LinkGraph {
		&self.links
	}

	fn entities(&self, kind: EntityKind) -> &BTreeMap<EntityId, TraceEntity> {
		match kind {
			EntityKind::Requirement => &self.requirements,
			EntityKind::TestCase => &self.tests,
			EntityKind::Risk => &self.risks,
			EntityKind::ConfigItem => &self.config_items,
		}
	}

	fn entities_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<EntityId, TraceEntity> {
		match kind {
			EntityKind::Requirement => &mut self.requirements,
			EntityKind::TestCase => &mut self.tests,
			EntityKind::Risk => &mut self.risks,
			EntityKind::ConfigItem => &mut self.config_items,
		}
	}

	pub fn entity(&self, id: &EntityId) -> Option<&TraceEntity> {
		self.entities(id.kind()).get(id)
	}

	pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = &TraceEntity> {
		self.entities(kind).values()
	}

	pub fn all_entities(&self) -> impl Iterator<Item = &TraceEntity> {
		EntityKind::ALL
			.iter()
			.flat_map(|kind| self.entities(*kind).values())
	}

	pub fn entity_count(&self) -> usize {
		EntityKind::ALL
			.iter()
			.map(|kind| self.entities(*kind).len())
			.sum()
	}

	/// Create or replace an entity.
	///
	/// Replacement preserves the original creation audit fields. Archived is
	/// terminal: an archived entity cannot be replaced with a non-archived
	/// one. A caller-assigned id advances the generator past it so generated
	/// ids never collide.
	pub fn upsert_entity(&mut self, mut entity: TraceEntity, actor: &Actor) -> Result<AuditEntry> {
		entity.validate()?;
		let kind = entity.kind;

		let mut before = None;
		if let Some(existing) = self.entity(&entity.id) {
			if existing.is_archived() && !entity.is_archived() {
				return Err(TraceError::Validation(format!(
					"{} is archived and cannot be reactivated",
					entity.id
				)));
			}
			before = Some(existing.status.to_string());
			entity.created_at = existing.created_at;
			entity.created_by = existing.created_by.clone();
		}
		entity.updated_by = actor.clone();
		entity.updated_at = Utc::now();

		let next = self.next_seq.entry(kind).or_insert(1);
		if entity.id.sequence() >= *next {
			*next = entity.id.sequence().saturating_add(1);
		}

		let id = entity.id.clone();
		let after = entity.status.to_string();
		let archived = entity.is_archived();
		self.entities_mut(kind).insert(id.clone(), entity);
		if archived {
			// Archived entities hold no links.
			self.links.remove_entity(&id);
		}

		let mut entry =
			AuditEntry::new(actor.clone(), AuditAction::EntityUpserted, Some(id)).with_after(after);
		if let Some(before) = before {
			entry = entry.with_before(before);
		}
		Ok(self.record(entry))
	}

	/// Soft-delete: archive the entity and strip every link edge touching it,
	/// both mirrors, in the same call.
	///
	/// Archiving an already-archived entity is a no-op returning `Ok(None)`.
	pub fn delete_entity(&mut self, id: &EntityId, actor: &Actor) -> Result<Option<AuditEntry>> {
		let kind = id.kind();
		let Some(existing) = self.entities_mut(kind).get_mut(id) else {
			return Err(TraceError::NotFound(id.to_string()));
		};
		if existing.is_archived() {
			return Ok(None);
		}
		let before = existing.status.to_string();
		existing.status = EntityStatus::archived_for(kind);
		existing.updated_by = actor.clone();
		existing.updated_at = Utc::now();
		let after = existing.status.to_string();
		self.links.remove_entity(id);

		let entry = AuditEntry::new(actor.clone(), AuditAction::EntityArchived, Some(id.clone()))
			.with_before(before)
			.with_after(after);
		Ok(Some(self.record(entry)))
	}

	fn require_active(&self, id: &EntityId) -> Result<()> {
		match self.entity(id) {
			Some(entity) if !entity.is_archived() => Ok(()),
			_ => Err(TraceError::UnknownEntity(id.to_string())),
		}
	}

	/// Add a mirrored trace link. Both endpoints must be active entities in
	/// this project. Returns `Ok(None)` when the edge already existed.
	pub fn link(
		&mut self,
		source: &EntityId,
		target: &EntityId,
		actor: &Actor,
	) -> Result<Option<AuditEntry>> {
		self.require_active(source)?;
		self.require_active(target)?;
		if !self.links.link(source, target)? {
			return Ok(None);
		}
		let entry = AuditEntry::new(actor.clone(), AuditAction::Linked, Some(source.clone()))
			.with_after(format!("{} <-> {}", source, target));
		Ok(Some(self.record(entry)))
	}

	/// Remove a mirrored trace link. Returns `Ok(None)` when there was no
	/// edge to remove.
	pub fn unlink(
		&mut self,
		source: &EntityId,
		target: &EntityId,
		actor: &Actor,
	) -> Result<Option<AuditEntry>> {
		self.require_active(source)?;
		self.require_active(target)?;
		if !self.links.unlink(source, target) {
			return Ok(None);
		}
		let entry = AuditEntry::new(actor.clone(), AuditAction::Unlinked, Some(source.clone()))
			.with_before(format!("{} <-> {}", source, target));
		Ok(Some(self.record(entry)))
	}

	/// Neighbors of a known entity, optionally restricted to one kind.
	pub fn neighbors(&self, id: &EntityId, kind: Option<EntityKind>) -> Result<Vec<EntityId>> {
		if self.entity(id).is_none() {
			return Err(TraceError::UnknownEntity(id.to_string()));
		}
		Ok(self.links.neighbors(id, kind))
	}

	/// Next generated id for a kind. Monotonic per project and kind; ids are
	/// never reused, including after deletion.
	pub fn next_id(&mut self, kind: EntityKind) -> EntityId {
		let next = self.next_seq.entry(kind).or_insert(1);
		let id = EntityId::generate(kind, *next);
		*next = next.saturating_add(1);
		id
	}

	/// Recompute rollup metrics under a policy and store the result.
	pub fn recompute_metrics(&mut self, policy: RollupPolicy) -> ProjectMetrics {
		let requirements_total = self
			.requirements
			.values()
			.filter(|e| !e.is_archived())
			.count();
		let requirements_covered = self
			.requirements
			.values()
			.filter(|e| !e.is_archived())
			.filter(|e| {
				!self
					.links
					.neighbors(&e.id, Some(EntityKind::TestCase))
					.is_empty()
			})
			.count();
		let tests_total = self.tests.values().filter(|e| !e.is_archived()).count();
		let risks_open = if policy.include_risks {
			self.risks
				.values()
				.filter(|e| match e.status {
					EntityStatus::Risk(status) => !matches!(
						status,
						RiskStatus::Accepted | RiskStatus::Closed | RiskStatus::Archived
					),
					_ => false,
				})
				.count()
		} else {
			0
		};
		let config_items_controlled = if policy.include_config_items {
			self.config_items
				.values()
				.filter(|e| {
					matches!(
						e.status,
						EntityStatus::ConfigItem(ConfigItemStatus::Baselined)
							| EntityStatus::ConfigItem(ConfigItemStatus::Controlled)
					)
				})
				.count()
		} else {
			0
		};
		let coverage_percent = if requirements_total == 0 {
			100.0
		} else {
			(requirements_covered as f64 / requirements_total as f64) * 100.0
		};

		let metrics = ProjectMetrics {
			requirements_total,
			requirements_covered,
			tests_total,
			risks_open,
			config_items_controlled,
			links_total: self.links.edge_count(),
			coverage_percent,
			computed_at: Utc::now(),
		};
		self.metrics = metrics.clone();
		metrics
	}

	/// Apply one change. Returns the audit entry it committed, or `None` when
	/// the change was a no-op (duplicate link, absent unlink, re-archive).
	pub fn apply_change(&mut self, change: Change, actor: &Actor) -> Result<Option<AuditEntry>> {
		match change {
			Change::UpsertEntity { entity } => self.upsert_entity(entity, actor).map(Some),
			Change::DeleteEntity { id } => self.delete_entity(&id, actor),
			Change::Link { source, target } => self.link(&source, &target, actor),
			Change::Unlink { source, target } => self.unlink(&source, &target, actor),
			Change::RecomputeMetrics { policy } => {
				let before = format!("coverage {:.1}%", self.metrics.coverage_percent);
				let metrics = self.recompute_metrics(policy);
				let entry = AuditEntry::new(actor.clone(), AuditAction::MetricsRecomputed, None)
					.with_before(before)
					.with_after(format!("coverage {:.1}%", metrics.coverage_percent));
				Ok(Some(self.record(entry)))
			}
		}
	}

	/// Append the batch-level audit entry a completed sync leaves behind.
	pub fn record_sync_applied(&mut self, actor: &Actor, summary: impl Into<String>) -> AuditEntry {
		let entry = AuditEntry::new(actor.clone(), AuditAction::SyncApplied, None)
			.with_after(summary.into());
		self.record(entry)
	}

	fn record(&mut self, entry: AuditEntry) -> AuditEntry {
		self.updated_at = entry.at;
		self.audit_log.push(entry.clone());
		entry
	}
}
