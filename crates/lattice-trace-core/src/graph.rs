// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Undirected trace-link graph between entities.
//!
//! Every edge is stored mirrored: linking `REQ-001` to `TC-001` records the
//! test under the requirement's link set and the requirement under the test's.
//! Link sets are partitioned by kind so neighbor queries filtered to one kind
//! never scan unrelated edges.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::entity::{EntityId, EntityKind};
use crate::error::{Result, TraceError};

/// Neighbors of one entity, partitioned by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LinkSet {
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub requirements: BTreeSet<EntityId>,
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub tests: BTreeSet<EntityId>,
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub risks: BTreeSet<EntityId>,
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub config_items: BTreeSet<EntityId>,
}

impl LinkSet {
	fn partition(&self, kind: EntityKind) -> &BTreeSet<EntityId> {
		match kind {
			EntityKind::Requirement => &self.requirements,
			EntityKind::TestCase => &self.tests,
			EntityKind::Risk => &self.risks,
			EntityKind::ConfigItem => &self.config_items,
		}
	}

	fn partition_mut(&mut self, kind: EntityKind) -> &mut BTreeSet<EntityId> {
		match kind {
			EntityKind::Requirement => &mut self.requirements,
			EntityKind::TestCase => &mut self.tests,
			EntityKind::Risk => &mut self.risks,
			EntityKind::ConfigItem => &mut self.config_items,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.requirements.is_empty()
			&& self.tests.is_empty()
			&& self.risks.is_empty()
			&& self.config_items.is_empty()
	}

	pub fn len(&self) -> usize {
		self.requirements.len() + self.tests.len() + self.risks.len() + self.config_items.len()
	}

	/// All neighbors across partitions, in id order per partition.
	pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
		self.requirements
			.iter()
			.chain(self.tests.iter())
			.chain(self.risks.iter())
			.chain(self.config_items.iter())
	}
}

/// Mirrored adjacency over all entities in a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LinkGraph {
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	entries: BTreeMap<EntityId, LinkSet>,
}

impl LinkGraph {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add an undirected edge. Returns whether the edge was newly added.
	///
	/// Self-links are rejected; linking `a -> b` twice is a no-op.
	pub fn link(&mut self, a: &EntityId, b: &EntityId) -> Result<bool> {
		if a == b {
			return Err(TraceError::Validation(format!(
				"cannot link {} to itself",
				a
			)));
		}
		let forward = self
			.entries
			.entry(a.clone())
			.or_default()
			.partition_mut(b.kind())
			.insert(b.clone());
		let backward = self
			.entries
			.entry(b.clone())
			.or_default()
			.partition_mut(a.kind())
			.insert(a.clone());
		debug_assert_eq!(forward, backward, "link mirror drifted");
		Ok(forward)
	}

	/// Remove an undirected edge from both mirrors. Returns whether the edge
	/// existed. Unlinking an absent edge is a no-op.
	pub fn unlink(&mut self, a: &EntityId, b: &EntityId) -> bool {
		let forward = match self.entries.get_mut(a) {
			Some(set) => set.partition_mut(b.kind()).remove(b),
			None => false,
		};
		let backward = match self.entries.get_mut(b) {
			Some(set) => set.partition_mut(a.kind()).remove(a),
			None => false,
		};
		debug_assert_eq!(forward, backward, "link mirror drifted");
		self.prune(a);
		self.prune(b);
		forward
	}

	/// Detach an entity from every neighbor, returning the ids it was linked
	/// to. The mirrors on the neighbor side are cleaned up as well.
	pub fn remove_entity(&mut self, id: &EntityId) -> Vec<EntityId> {
		let Some(set) = self.entries.remove(id) else {
			return Vec::new();
		};
		let neighbors: Vec<EntityId> = set.iter().cloned().collect();
		for neighbor in &neighbors {
			if let Some(other) = self.entries.get_mut(neighbor) {
				other.partition_mut(id.kind()).remove(id);
			}
			self.prune(neighbor);
		}
		neighbors
	}

	/// Neighbors of `id`, optionally restricted to one kind. Ids come back
	/// sorted within each partition.
	pub fn neighbors(&self, id: &EntityId, kind: Option<EntityKind>) -> Vec<EntityId> {
		let Some(set) = self.entries.get(id) else {
			return Vec::new();
		};
		match kind {
			Some(kind) => set.partition(kind).iter().cloned().collect(),
			None => set.iter().cloned().collect(),
		}
	}

	pub fn contains_edge(&self, a: &EntityId, b: &EntityId) -> bool {
		self.entries
			.get(a)
			.map(|set| set.partition(b.kind()).contains(b))
			.unwrap_or(false)
	}

	pub fn degree(&self, id: &EntityId) -> usize {
		self.entries.get(id).map(LinkSet::len).unwrap_or(0)
	}

	/// Number of undirected edges.
	pub fn edge_count(&self) -> usize {
		let mirrored: usize = self.entries.values().map(LinkSet::len).sum();
		debug_assert_eq!(mirrored % 2, 0, "link mirror drifted");
		mirrored / 2
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Every mirrored pair must agree in both directions. Used by tests and
	/// debug assertions after bulk mutations.
	pub fn is_symmetric(&self) -> bool {
		for (id, set) in &self.entries {
			for neighbor in set.iter() {
				let back = self
					.entries
					.get(neighbor)
					.map(|s| s.partition(id.kind()).contains(id))
					.unwrap_or(false);
				if !back {
					return false;
				}
			}
		}
		true
	}

	fn prune(&mut self, id: &EntityId) {
		if self.entries.get(id).is_some_and(LinkSet::is_empty) {
			self.entries.remove(id);
		}
	}
}
