// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Project data store: snapshot reads, serialized per-repository writes.
//!
//! Readers clone an `Arc<ProjectData>` and can never observe a partially
//! applied mutation. Writers take a per-repository guard, clone the current
//! snapshot, mutate the clone, and swap it in only after the whole changeset
//! succeeded. Distinct repositories never contend on the same guard.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use lattice_tenants_core::RepoKey;
use lattice_trace_core::{
	Actor, AuditEntry, Change, ChangeObserver, NoopChangeObserver, ProjectData, TraceError,
};

/// Persisted-state row: one repository's complete project data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectExport {
	pub repository: RepoKey,
	pub project: ProjectData,
}

/// Failure applying or fetching one record during sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
	pub record: String,
	pub reason: String,
}

/// Result of applying one already-fetched batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncBatchReport {
	/// Changes that mutated the project.
	pub applied: usize,
	/// Changes that were valid but changed nothing (duplicate link, re-archive).
	pub noops: usize,
	pub failures: Vec<RecordFailure>,
}

/// All project data held by this deployment, keyed by repository.
pub struct TraceStore {
	projects: RwLock<HashMap<RepoKey, Arc<ProjectData>>>,
	write_locks: Mutex<HashMap<RepoKey, Arc<Mutex<()>>>>,
	observer: Arc<dyn ChangeObserver>,
}

impl Default for TraceStore {
	fn default() -> Self {
		Self::new()
	}
}

impl TraceStore {
	pub fn new() -> Self {
		Self::with_observer(Arc::new(NoopChangeObserver))
	}

	pub fn with_observer(observer: Arc<dyn ChangeObserver>) -> Self {
		Self {
			projects: RwLock::new(HashMap::new()),
			write_locks: Mutex::new(HashMap::new()),
			observer,
		}
	}

	/// Consistent point-in-time snapshot of one repository's project.
	pub async fn get_project_data(&self, repo: &RepoKey) -> Option<Arc<ProjectData>> {
		self.projects.read().await.get(repo).cloned()
	}

	pub async fn project_count(&self) -> usize {
		self.projects.read().await.len()
	}

	pub async fn repo_keys(&self) -> Vec<RepoKey> {
		let projects = self.projects.read().await;
		let mut keys: Vec<RepoKey> = projects.keys().cloned().collect();
		keys.sort();
		keys
	}

	/// Apply one change to a repository's project.
	///
	/// The project is created on the first successful write. The guard is
	/// held for the duration of the call and released on every exit path,
	/// so a failed change never blocks later writers. On error nothing is
	/// published.
	pub async fn apply_change(
		&self,
		repo: &RepoKey,
		change: Change,
		actor: &Actor,
	) -> Result<Option<AuditEntry>, TraceError> {
		let lock = self.writer_lock(repo).await;
		let _guard = lock.lock().await;

		let mut project = self.snapshot_or_new(repo).await;
		let entry = project.apply_change(change, actor)?;
		self.publish(repo, project).await;
		if let Some(entry) = &entry {
			self.observer.change_applied(repo.as_str(), entry);
		}
		Ok(entry)
	}

	/// Apply an already-fetched batch under a single hold of the guard.
	///
	/// Records are isolated: one failure neither aborts the rest nor rolls
	/// back records already applied. The published snapshot reflects every
	/// record that succeeded; when at least one change applied, a sync
	/// audit entry closes the batch.
	pub async fn apply_sync_batch(
		&self,
		repo: &RepoKey,
		changes: Vec<Change>,
		actor: &Actor,
	) -> SyncBatchReport {
		let lock = self.writer_lock(repo).await;
		let _guard = lock.lock().await;

		let mut project = self.snapshot_or_new(repo).await;
		let mut report = SyncBatchReport::default();
		let mut entries = Vec::new();

		for change in changes {
			let subject = change
				.subject()
				.map(|id| id.to_string())
				.unwrap_or_else(|| "batch".to_string());
			match project.apply_change(change, actor) {
				Ok(Some(entry)) => {
					report.applied += 1;
					entries.push(entry);
				}
				Ok(None) => report.noops += 1,
				Err(err) => {
					debug!(repo = %repo, record = %subject, error = %err, "batch record failed");
					report.failures.push(RecordFailure {
						record: subject,
						reason: err.to_string(),
					});
				}
			}
		}

		if report.applied > 0 {
			let summary = format!(
				"{} change(s) applied, {} failed",
				report.applied,
				report.failures.len()
			);
			entries.push(project.record_sync_applied(actor, summary));
			self.publish(repo, project).await;
			for entry in &entries {
				self.observer.change_applied(repo.as_str(), entry);
			}
		}
		report
	}

	/// Snapshot every project for persistence, ordered by repository.
	pub async fn export_records(&self) -> Vec<ProjectExport> {
		let projects = self.projects.read().await;
		let mut exports: Vec<ProjectExport> = projects
			.iter()
			.map(|(repository, project)| ProjectExport {
				repository: repository.clone(),
				project: (**project).clone(),
			})
			.collect();
		exports.sort_by(|a, b| a.repository.cmp(&b.repository));
		exports
	}

	/// Replace store contents from a snapshot. No observer notifications;
	/// restore is a bulk load, not a mutation stream.
	pub async fn restore_records(&self, exports: Vec<ProjectExport>) {
		let mut projects = self.projects.write().await;
		projects.clear();
		for export in exports {
			projects.insert(export.repository, Arc::new(export.project));
		}
	}

	async fn writer_lock(&self, repo: &RepoKey) -> Arc<Mutex<()>> {
		let mut locks = self.write_locks.lock().await;
		locks
			.entry(repo.clone())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	async fn snapshot_or_new(&self, repo: &RepoKey) -> ProjectData {
		let projects = self.projects.read().await;
		match projects.get(repo) {
			Some(existing) => (**existing).clone(),
			None => ProjectData::new(repo.as_str()),
		}
	}

	async fn publish(&self, repo: &RepoKey, project: ProjectData) {
		let mut projects = self.projects.write().await;
		projects.insert(repo.clone(), Arc::new(project));
	}
}
