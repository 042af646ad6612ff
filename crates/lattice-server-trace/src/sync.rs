// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Repository synchronizer: the writer facade over the trace store.
//!
//! All mutation paths go through the synchronizer. Webhook handlers and API
//! callers use [`ProjectSynchronizer::apply_change`]; reconciliation against
//! the hosting platform uses [`ProjectSynchronizer::sync_repository`]. Both
//! funnel into the store's per-repository guard, so one repository never has
//! two mutations in flight.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use lattice_tenants_core::RepoKey;
use lattice_trace_core::{Actor, AuditEntry, Change, EntityId, TraceEntity};

use crate::error::{Result, SyncError};
use crate::store::{RecordFailure, TraceStore};
use crate::upstream::{RecordRef, RemoteRecord, UpstreamClient};

/// Record fetches in flight at once during a sync pass.
const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Result of one sync pass over a repository.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
	pub repository: RepoKey,
	/// Records listed by the upstream manifest.
	pub fetched: usize,
	/// Changes that mutated the project.
	pub applied: usize,
	/// Per-record fetch and apply failures; the next pass retries them.
	pub failed: Vec<RecordFailure>,
	pub fetched_at: DateTime<Utc>,
}

impl SyncReport {
	pub fn is_clean(&self) -> bool {
		self.failed.is_empty()
	}
}

/// Serialized writer over [`TraceStore`] plus upstream reconciliation.
pub struct ProjectSynchronizer {
	store: Arc<TraceStore>,
	upstream: Arc<dyn UpstreamClient>,
	fetch_concurrency: usize,
}

impl ProjectSynchronizer {
	pub fn new(store: Arc<TraceStore>, upstream: Arc<dyn UpstreamClient>) -> Self {
		Self {
			store,
			upstream,
			fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
		}
	}

	pub fn with_fetch_concurrency(mut self, fetch_concurrency: usize) -> Self {
		self.fetch_concurrency = fetch_concurrency.max(1);
		self
	}

	pub fn store(&self) -> &Arc<TraceStore> {
		&self.store
	}

	/// Apply one changeset to a repository's project data.
	pub async fn apply_change(
		&self,
		repo: &RepoKey,
		change: Change,
		actor: &Actor,
	) -> Result<Option<AuditEntry>> {
		self.store
			.apply_change(repo, change, actor)
			.await
			.map_err(SyncError::from)
	}

	/// Reconcile one repository against the latest known upstream state.
	///
	/// Network happens outside any lock: the manifest fetch first, then the
	/// record fetches fanned out concurrently. Only the already-fetched batch
	/// is applied under the per-repository guard. A failed record fetch is
	/// isolated and reported; applied records are never rolled back, so
	/// abandoning or re-running a pass converges on the same end state.
	pub async fn sync_repository(&self, repo: &RepoKey) -> Result<SyncReport> {
		let manifest = self.upstream.fetch_manifest(repo).await?;
		Ok(self.fetch_and_apply(repo, manifest).await)
	}

	/// Reconcile only the named records, skipping the manifest fetch.
	///
	/// This is the content-change webhook path: the payload already says which
	/// records moved. Failures are isolated the same way as a full pass and
	/// picked up by the next reconciliation.
	pub async fn sync_records(&self, repo: &RepoKey, ids: Vec<EntityId>) -> SyncReport {
		let refs = ids.into_iter().map(|id| RecordRef { id }).collect();
		self.fetch_and_apply(repo, refs).await
	}

	async fn fetch_and_apply(&self, repo: &RepoKey, manifest: Vec<RecordRef>) -> SyncReport {
		let fetched_at = Utc::now();
		let fetched = manifest.len();

		let results: Vec<_> = stream::iter(manifest)
			.map(|record_ref| {
				let upstream = Arc::clone(&self.upstream);
				let repo = repo.clone();
				async move {
					let result = upstream.fetch_record(&repo, &record_ref).await;
					(record_ref, result)
				}
			})
			.buffer_unordered(self.fetch_concurrency)
			.collect()
			.await;

		let mut failed = Vec::new();
		let mut records = Vec::new();
		for (record_ref, result) in results {
			match result {
				Ok(record) => records.push(record),
				Err(err) => {
					warn!(repo = %repo, record = %record_ref.id, error = %err, "record fetch failed");
					failed.push(RecordFailure {
						record: record_ref.id.to_string(),
						reason: err.to_string(),
					});
				}
			}
		}

		// Deterministic apply order regardless of fetch completion order.
		records.sort_by(|a, b| a.id.cmp(&b.id));
		let changes = batch_changes(records);
		let batch = self
			.store
			.apply_sync_batch(repo, changes, &Actor::Sync)
			.await;
		failed.extend(batch.failures);

		let report = SyncReport {
			repository: repo.clone(),
			fetched,
			applied: batch.applied,
			failed,
			fetched_at,
		};
		info!(
			repo = %repo,
			fetched = report.fetched,
			applied = report.applied,
			failed = report.failed.len(),
			"sync pass complete"
		);
		report
	}
}

/// Expand fetched records into a changeset: every upsert first, then the
/// links, so intra-batch references resolve regardless of record order.
fn batch_changes(records: Vec<RemoteRecord>) -> Vec<Change> {
	let mut changes = Vec::new();
	let mut links = Vec::new();
	for record in records {
		let source = record.id.clone();
		let mut entity = TraceEntity::new(record.id, record.description, Actor::Sync);
		if let Some(status) = record.status {
			entity = entity.with_status(status);
		}
		changes.push(Change::UpsertEntity { entity });
		for target in record.links {
			links.push(Change::Link {
				source: source.clone(),
				target,
			});
		}
	}
	changes.extend(links);
	changes
}
