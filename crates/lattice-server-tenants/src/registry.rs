// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory tenant registry.
//!
//! The registry is the single owner of installation and settings state.
//! Webhook handlers mutate installations through [`TenantRegistry::register`],
//! [`TenantRegistry::update_installation`], and the lifecycle operations;
//! settings change only through [`TenantRegistry::update_settings`]. Every
//! committed mutation is reported to the injected [`RegistryObserver`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use lattice_tenants_core::{
	Capability, Installation, InstallationId, InstallationStatus, NoopRegistryObserver,
	RegistryEvent, RegistryObserver, RepoKey, Result, SettingsPatch, TenantSettings, TenantsError,
};

/// One tenant: the installation plus its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
	pub installation: Installation,
	pub settings: TenantSettings,
}

/// Outcome of a register call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
	/// False when an existing record was overwritten by a redelivery or
	/// reinstall.
	pub created: bool,
}

/// Registry of all installations this deployment serves.
///
/// Explicitly constructed and shared behind an `Arc`; there is no global
/// instance. Lookups take the read lock; mutations take the write lock and
/// release it before notifying the observer, so observers only ever see
/// committed state and cannot deadlock the registry.
pub struct TenantRegistry {
	tenants: RwLock<HashMap<InstallationId, TenantRecord>>,
	observer: Arc<dyn RegistryObserver>,
	registrations: AtomicU64,
}

impl Default for TenantRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl TenantRegistry {
	pub fn new() -> Self {
		Self::with_observer(Arc::new(NoopRegistryObserver))
	}

	pub fn with_observer(observer: Arc<dyn RegistryObserver>) -> Self {
		Self {
			tenants: RwLock::new(HashMap::new()),
			observer,
			registrations: AtomicU64::new(0),
		}
	}

	/// Create or overwrite an installation.
	///
	/// Default settings are derived only when the installation has none yet.
	/// Re-registering an existing (or soft-deleted) installation replaces the
	/// installation record but keeps the settings, so a reinstall does not
	/// reset a tenant's plan.
	pub async fn register(&self, installation: Installation) -> Registration {
		let id = installation.id;
		let account = installation.account.login.clone();
		let created;
		{
			let mut tenants = self.tenants.write().await;
			match tenants.entry(id) {
				Entry::Occupied(mut entry) => {
					created = false;
					entry.get_mut().installation = installation;
				}
				Entry::Vacant(entry) => {
					created = true;
					entry.insert(TenantRecord {
						installation,
						settings: TenantSettings::default(),
					});
				}
			}
		}
		self.registrations.fetch_add(1, Ordering::Relaxed);
		info!(installation = %id, account = %account, created, "registered installation");
		self.observer.registry_event(RegistryEvent::InstallationRegistered {
			id,
			account,
			created,
		});
		Registration { created }
	}

	/// Apply a webhook-driven mutation to the installation record only.
	///
	/// Settings are out of reach on this path. A Deleted record is a
	/// tombstone: the mutation is skipped so an out-of-order update arriving
	/// after a delete can never resurrect the installation.
	pub async fn update_installation<F>(&self, id: InstallationId, mutate: F) -> Result<()>
	where
		F: FnOnce(&mut Installation),
	{
		{
			let mut tenants = self.tenants.write().await;
			let record = tenants.get_mut(&id).ok_or(TenantsError::NotFound(id))?;
			if record.installation.status == InstallationStatus::Deleted {
				debug!(installation = %id, "ignoring update for deleted installation");
				return Ok(());
			}
			mutate(&mut record.installation);
			record.installation.touch();
		}
		self.observer
			.registry_event(RegistryEvent::InstallationUpdated { id });
		Ok(())
	}

	/// Apply a settings patch. This is the only mutation path for settings.
	///
	/// Validation happens in [`TenantSettings::apply`]; a rejected patch
	/// leaves the stored settings untouched.
	pub async fn update_settings(
		&self,
		id: InstallationId,
		patch: SettingsPatch,
	) -> Result<TenantSettings> {
		let settings;
		{
			let mut tenants = self.tenants.write().await;
			let record = tenants.get_mut(&id).ok_or(TenantsError::NotFound(id))?;
			record.settings.apply(patch)?;
			settings = record.settings.clone();
		}
		info!(installation = %id, plan = %settings.plan, "updated tenant settings");
		self.observer.registry_event(RegistryEvent::SettingsUpdated {
			id,
			plan: settings.plan,
		});
		Ok(settings)
	}

	/// Fail-closed capability check.
	///
	/// False when the installation is missing, not active, or its settings
	/// do not grant the capability under the current plan.
	pub async fn has_feature_access(&self, id: InstallationId, capability: Capability) -> bool {
		let tenants = self.tenants.read().await;
		match tenants.get(&id) {
			Some(record) => {
				record.installation.is_active() && record.settings.has_feature(capability)
			}
			None => false,
		}
	}

	/// Fail-closed repository scope check.
	pub async fn has_repository_access(&self, id: InstallationId, repository: &RepoKey) -> bool {
		let tenants = self.tenants.read().await;
		tenants
			.get(&id)
			.map(|record| record.installation.has_repository_access(repository))
			.unwrap_or(false)
	}

	/// Soft-delete an installation.
	///
	/// The record and its settings are retained for export and audit; access
	/// checks fail from now on. Project data under the tenant is not touched.
	/// Returns false when the installation was already deleted.
	pub async fn deregister(&self, id: InstallationId) -> Result<bool> {
		{
			let mut tenants = self.tenants.write().await;
			let record = tenants.get_mut(&id).ok_or(TenantsError::NotFound(id))?;
			if record.installation.status == InstallationStatus::Deleted {
				return Ok(false);
			}
			record.installation.status = InstallationStatus::Deleted;
			record.installation.touch();
		}
		info!(installation = %id, "deregistered installation");
		self.observer
			.registry_event(RegistryEvent::InstallationDeregistered { id });
		Ok(true)
	}

	/// Suspend an installation. Skipped on a Deleted record.
	pub async fn suspend(&self, id: InstallationId) -> Result<()> {
		{
			let mut tenants = self.tenants.write().await;
			let record = tenants.get_mut(&id).ok_or(TenantsError::NotFound(id))?;
			if record.installation.status == InstallationStatus::Deleted {
				debug!(installation = %id, "ignoring suspend for deleted installation");
				return Ok(());
			}
			record.installation.status = InstallationStatus::Suspended;
			record.installation.touch();
		}
		info!(installation = %id, "suspended installation");
		self.observer
			.registry_event(RegistryEvent::InstallationSuspended { id });
		Ok(())
	}

	/// Reactivate a suspended installation. Skipped on a Deleted record.
	pub async fn unsuspend(&self, id: InstallationId) -> Result<()> {
		{
			let mut tenants = self.tenants.write().await;
			let record = tenants.get_mut(&id).ok_or(TenantsError::NotFound(id))?;
			if record.installation.status == InstallationStatus::Deleted {
				debug!(installation = %id, "ignoring unsuspend for deleted installation");
				return Ok(());
			}
			record.installation.status = InstallationStatus::Active;
			record.installation.touch();
		}
		info!(installation = %id, "unsuspended installation");
		self.observer
			.registry_event(RegistryEvent::InstallationUnsuspended { id });
		Ok(())
	}

	pub async fn get(&self, id: InstallationId) -> Option<TenantRecord> {
		self.tenants.read().await.get(&id).cloned()
	}

	pub async fn get_installation(&self, id: InstallationId) -> Option<Installation> {
		self.tenants
			.read()
			.await
			.get(&id)
			.map(|record| record.installation.clone())
	}

	pub async fn get_settings(&self, id: InstallationId) -> Option<TenantSettings> {
		self.tenants
			.read()
			.await
			.get(&id)
			.map(|record| record.settings.clone())
	}

	/// All records, including soft-deleted ones, ordered by installation id.
	pub async fn get_all_installations(&self) -> Vec<TenantRecord> {
		let tenants = self.tenants.read().await;
		let mut records: Vec<TenantRecord> = tenants.values().cloned().collect();
		records.sort_by_key(|record| record.installation.id);
		records
	}

	pub async fn active_installation_count(&self) -> usize {
		self.tenants
			.read()
			.await
			.values()
			.filter(|record| record.installation.is_active())
			.count()
	}

	pub async fn installation_count(&self) -> usize {
		self.tenants.read().await.len()
	}

	/// Total register calls since construction, including overwrites.
	pub fn registration_count(&self) -> u64 {
		self.registrations.load(Ordering::Relaxed)
	}

	/// Snapshot every record for persistence. Same shape as
	/// [`TenantRegistry::get_all_installations`]; the alias marks intent.
	pub async fn export_records(&self) -> Vec<TenantRecord> {
		self.get_all_installations().await
	}

	/// Replace registry contents from a snapshot. No observer events are
	/// emitted; restore is a bulk load, not a mutation stream.
	pub async fn restore_records(&self, records: Vec<TenantRecord>) {
		let mut tenants = self.tenants.write().await;
		tenants.clear();
		for record in records {
			tenants.insert(record.installation.id, record);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use lattice_tenants_core::{AccountRef, PermissionLevel, RepositorySelection, SubscriptionPlan};
	use std::sync::Mutex;

	fn acme_installation() -> Installation {
		Installation::new(InstallationId(12345), AccountRef::organization("acme-corp"))
	}

	struct RecordingObserver {
		events: Mutex<Vec<RegistryEvent>>,
	}

	impl RecordingObserver {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				events: Mutex::new(Vec::new()),
			})
		}

		fn events(&self) -> Vec<RegistryEvent> {
			self.events.lock().unwrap().clone()
		}
	}

	impl RegistryObserver for RecordingObserver {
		fn registry_event(&self, event: RegistryEvent) {
			self.events.lock().unwrap().push(event);
		}
	}

	mod register {
		use super::*;

		#[tokio::test]
		async fn test_register_derives_default_settings() {
			let registry = TenantRegistry::new();
			let outcome = registry.register(acme_installation()).await;

			assert!(outcome.created);
			let settings = registry.get_settings(InstallationId(12345)).await.unwrap();
			assert_eq!(settings, TenantSettings::default());
			assert_eq!(settings.plan, SubscriptionPlan::Free);
		}

		#[tokio::test]
		async fn test_register_twice_is_idempotent() {
			let registry = TenantRegistry::new();
			assert!(registry.register(acme_installation()).await.created);
			assert!(!registry.register(acme_installation()).await.created);

			assert_eq!(registry.installation_count().await, 1);
			assert_eq!(registry.registration_count(), 2);
		}

		#[tokio::test]
		async fn test_reregister_preserves_settings() {
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;
			registry
				.update_settings(
					InstallationId(12345),
					SettingsPatch::plan(SubscriptionPlan::Enterprise),
				)
				.await
				.unwrap();

			registry.register(acme_installation()).await;

			let settings = registry.get_settings(InstallationId(12345)).await.unwrap();
			assert_eq!(settings.plan, SubscriptionPlan::Enterprise);
		}

		#[tokio::test]
		async fn test_register_resurrects_deleted_installation() {
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;
			registry.deregister(InstallationId(12345)).await.unwrap();

			// An explicit reinstall is the one path back from Deleted.
			let outcome = registry.register(acme_installation()).await;
			assert!(!outcome.created);

			let installation = registry
				.get_installation(InstallationId(12345))
				.await
				.unwrap();
			assert_eq!(installation.status, InstallationStatus::Active);
		}
	}

	mod update_installation {
		use super::*;

		#[tokio::test]
		async fn test_update_mutates_and_touches() {
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;
			let before = registry
				.get_installation(InstallationId(12345))
				.await
				.unwrap()
				.updated_at;

			registry
				.update_installation(InstallationId(12345), |installation| {
					installation
						.permissions
						.insert("contents".to_string(), PermissionLevel::Write);
				})
				.await
				.unwrap();

			let installation = registry
				.get_installation(InstallationId(12345))
				.await
				.unwrap();
			assert_eq!(
				installation.permissions.get("contents"),
				Some(&PermissionLevel::Write)
			);
			assert!(installation.updated_at >= before);
		}

		#[tokio::test]
		async fn test_update_unknown_installation_is_not_found() {
			let registry = TenantRegistry::new();
			let result = registry
				.update_installation(InstallationId(99), |_| {})
				.await;
			assert!(matches!(result, Err(TenantsError::NotFound(_))));
		}

		#[tokio::test]
		async fn test_update_after_delete_is_skipped() {
			// Out-of-order delivery: an update must never resurrect a
			// deleted installation.
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;
			registry.deregister(InstallationId(12345)).await.unwrap();

			registry
				.update_installation(InstallationId(12345), |installation| {
					installation.status = InstallationStatus::Active;
					installation.events.push("push".to_string());
				})
				.await
				.unwrap();

			let installation = registry
				.get_installation(InstallationId(12345))
				.await
				.unwrap();
			assert_eq!(installation.status, InstallationStatus::Deleted);
			assert!(installation.events.is_empty());
		}
	}

	mod settings {
		use super::*;

		#[tokio::test]
		async fn test_update_settings_rejects_unentitled_feature() {
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;

			let result = registry
				.update_settings(
					InstallationId(12345),
					SettingsPatch::enable(Capability::RiskManagement),
				)
				.await;
			assert!(matches!(
				result,
				Err(TenantsError::FeatureNotEntitled { .. })
			));

			// Rejected patch left settings untouched.
			let settings = registry.get_settings(InstallationId(12345)).await.unwrap();
			assert_eq!(settings, TenantSettings::default());
		}

		#[tokio::test]
		async fn test_update_settings_unknown_installation() {
			let registry = TenantRegistry::new();
			let result = registry
				.update_settings(InstallationId(99), SettingsPatch::default())
				.await;
			assert!(matches!(result, Err(TenantsError::NotFound(_))));
		}

		#[tokio::test]
		async fn test_plan_upgrade_unlocks_features() {
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;

			let mut patch = SettingsPatch::plan(SubscriptionPlan::Team);
			patch.enable_features.push(Capability::RiskManagement);
			let settings = registry
				.update_settings(InstallationId(12345), patch)
				.await
				.unwrap();

			assert_eq!(settings.plan, SubscriptionPlan::Team);
			assert!(settings.features.contains(&Capability::RiskManagement));
		}
	}

	mod access {
		use super::*;

		#[tokio::test]
		async fn test_feature_access_fails_closed() {
			let registry = TenantRegistry::new();

			// Missing installation.
			assert!(
				!registry
					.has_feature_access(InstallationId(12345), Capability::Traceability)
					.await
			);

			registry.register(acme_installation()).await;
			assert!(
				registry
					.has_feature_access(InstallationId(12345), Capability::Traceability)
					.await
			);
			// Entitlement gate: Free plan has no risk management.
			assert!(
				!registry
					.has_feature_access(InstallationId(12345), Capability::RiskManagement)
					.await
			);

			registry.suspend(InstallationId(12345)).await.unwrap();
			assert!(
				!registry
					.has_feature_access(InstallationId(12345), Capability::Traceability)
					.await
			);

			registry.unsuspend(InstallationId(12345)).await.unwrap();
			assert!(
				registry
					.has_feature_access(InstallationId(12345), Capability::Traceability)
					.await
			);
		}

		#[tokio::test]
		async fn test_repository_access_respects_selection() {
			let registry = TenantRegistry::new();
			let mut installation = acme_installation();
			installation.repository_selection = RepositorySelection::Selected;
			installation
				.selected_repositories
				.insert(RepoKey::new("acme-corp", "device-firmware"));
			registry.register(installation).await;

			assert!(
				registry
					.has_repository_access(
						InstallationId(12345),
						&RepoKey::new("acme-corp", "device-firmware")
					)
					.await
			);
			assert!(
				!registry
					.has_repository_access(
						InstallationId(12345),
						&RepoKey::new("acme-corp", "mobile-app")
					)
					.await
			);
			assert!(
				!registry
					.has_repository_access(InstallationId(404), &RepoKey::new("a", "b"))
					.await
			);
		}
	}

	mod lifecycle {
		use super::*;

		#[tokio::test]
		async fn test_deregister_retains_record() {
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;

			assert!(registry.deregister(InstallationId(12345)).await.unwrap());
			// Second deregister is a no-op.
			assert!(!registry.deregister(InstallationId(12345)).await.unwrap());

			assert_eq!(registry.installation_count().await, 1);
			assert_eq!(registry.active_installation_count().await, 0);
			let records = registry.get_all_installations().await;
			assert_eq!(records.len(), 1);
			assert_eq!(
				records[0].installation.status,
				InstallationStatus::Deleted
			);
		}

		#[tokio::test]
		async fn test_suspend_skipped_on_deleted() {
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;
			registry.deregister(InstallationId(12345)).await.unwrap();

			registry.suspend(InstallationId(12345)).await.unwrap();
			registry.unsuspend(InstallationId(12345)).await.unwrap();

			let installation = registry
				.get_installation(InstallationId(12345))
				.await
				.unwrap();
			assert_eq!(installation.status, InstallationStatus::Deleted);
		}
	}

	mod export {
		use super::*;

		#[tokio::test]
		async fn test_export_restore_roundtrip() {
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;
			registry
				.register(Installation::new(
					InstallationId(67890),
					AccountRef::user("jane"),
				))
				.await;
			registry.deregister(InstallationId(67890)).await.unwrap();

			let exported = registry.export_records().await;
			assert_eq!(exported.len(), 2);

			let restored = TenantRegistry::new();
			restored.restore_records(exported.clone()).await;
			assert_eq!(restored.get_all_installations().await, exported);
			// Soft-deleted records survive the roundtrip.
			assert_eq!(restored.active_installation_count().await, 1);
		}

		#[tokio::test]
		async fn test_export_is_json_serializable() {
			let registry = TenantRegistry::new();
			registry.register(acme_installation()).await;

			let exported = registry.export_records().await;
			let json = serde_json::to_string(&exported).unwrap();
			let back: Vec<TenantRecord> = serde_json::from_str(&json).unwrap();
			assert_eq!(back, exported);
		}
	}

	mod observer {
		use super::*;

		#[tokio::test]
		async fn test_observer_sees_committed_mutations() {
			let observer = RecordingObserver::new();
			let registry = TenantRegistry::with_observer(observer.clone());

			registry.register(acme_installation()).await;
			registry
				.update_settings(
					InstallationId(12345),
					SettingsPatch::plan(SubscriptionPlan::Team),
				)
				.await
				.unwrap();
			registry.deregister(InstallationId(12345)).await.unwrap();

			let events = observer.events();
			assert_eq!(
				events,
				vec![
					RegistryEvent::InstallationRegistered {
						id: InstallationId(12345),
						account: "acme-corp".to_string(),
						created: true,
					},
					RegistryEvent::SettingsUpdated {
						id: InstallationId(12345),
						plan: SubscriptionPlan::Team,
					},
					RegistryEvent::InstallationDeregistered {
						id: InstallationId(12345),
					},
				]
			);
		}

		#[tokio::test]
		async fn test_failed_mutation_emits_nothing() {
			let observer = RecordingObserver::new();
			let registry = TenantRegistry::with_observer(observer.clone());
			registry.register(acme_installation()).await;
			let baseline = observer.events().len();

			let _ = registry
				.update_settings(
					InstallationId(12345),
					SettingsPatch::enable(Capability::PrioritySync),
				)
				.await;

			assert_eq!(observer.events().len(), baseline);
		}
	}
}
