// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event dispatch: one handler per routing class.
//!
//! Handlers tolerate out-of-order arrival. Lifecycle mutations for an
//! installation the registry has tombstoned or never seen are logged and
//! dropped rather than failed, so a late "updated" can never resurrect a
//! deleted tenant and a redelivered "deleted" is a no-op. Content changes are
//! the exception: they gate hard on registration, entitlement, and repository
//! scope before any project data moves.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use lattice_ingest_core::{
	parse_payload, ContentChangePayload, EventKind, IngestError, InstallationAction,
	InstallationEventPayload, InstallationPayload, RepositoriesEventPayload,
	RepositoryEventPayload, RepositoryPayload, WebhookDelivery,
};
use lattice_server_tenants::TenantRegistry;
use lattice_server_trace::ProjectSynchronizer;
use lattice_tenants_core::{
	AccountRef, AccountType, Capability, Installation, InstallationId, PermissionLevel, RepoKey,
	RepositorySelection,
};
use lattice_trace_core::{EntityId, EntityKind};

/// What a dispatched handler learned about the delivery, for the event record.
#[derive(Debug, Default)]
pub struct RouteOutcome {
	pub action: Option<String>,
	pub installation: Option<InstallationId>,
	pub repository: Option<RepoKey>,
}

/// Dispatches verified, deduplicated deliveries to their handlers.
pub struct EventRouter {
	registry: Arc<TenantRegistry>,
	synchronizer: Arc<ProjectSynchronizer>,
}

impl EventRouter {
	pub fn new(registry: Arc<TenantRegistry>, synchronizer: Arc<ProjectSynchronizer>) -> Self {
		Self {
			registry,
			synchronizer,
		}
	}

	/// Dispatch one delivery by its routing class.
	///
	/// The class set is closed; ping and unrecognized events fall through as
	/// empty outcomes without touching any state.
	pub async fn route(&self, delivery: &WebhookDelivery) -> Result<RouteOutcome, IngestError> {
		match delivery.kind() {
			EventKind::InstallationLifecycle => self.handle_installation(delivery).await,
			EventKind::RepositoryLifecycle if delivery.event == "installation_repositories" => {
				self.handle_repositories(delivery).await
			}
			EventKind::RepositoryLifecycle => self.handle_repository(delivery).await,
			EventKind::ContentChange => self.handle_content_change(delivery).await,
			EventKind::Ping | EventKind::Unknown => Ok(RouteOutcome::default()),
		}
	}

	async fn handle_installation(
		&self,
		delivery: &WebhookDelivery,
	) -> Result<RouteOutcome, IngestError> {
		let payload: InstallationEventPayload = parse_payload(&delivery.body)?;
		let id = InstallationId(payload.installation.id);
		let action = payload.action;

		match action {
			InstallationAction::Created => {
				let installation =
					installation_from_payload(payload.installation, &payload.repositories);
				let registration = self.registry.register(installation).await;
				info!(
					installation = %id,
					created = registration.created,
					"installation lifecycle: created"
				);
			}
			InstallationAction::Deleted => match self.registry.deregister(id).await {
				Ok(true) => info!(installation = %id, "installation lifecycle: deleted"),
				Ok(false) => debug!(installation = %id, "installation already deregistered"),
				Err(err) => {
					debug!(installation = %id, error = %err, "delete for unregistered installation ignored");
				}
			},
			InstallationAction::Suspend => {
				if let Err(err) = self.registry.suspend(id).await {
					debug!(installation = %id, error = %err, "suspend for unregistered installation ignored");
				}
			}
			InstallationAction::Unsuspend => {
				if let Err(err) = self.registry.unsuspend(id).await {
					debug!(installation = %id, error = %err, "unsuspend for unregistered installation ignored");
				}
			}
			InstallationAction::NewPermissionsAccepted => {
				let permissions = parse_permissions(&payload.installation.permissions);
				let events = payload.installation.events.clone();
				let result = self
					.registry
					.update_installation(id, move |installation| {
						installation.permissions = permissions;
						installation.events = events;
					})
					.await;
				if let Err(err) = result {
					debug!(installation = %id, error = %err, "permissions update for unregistered installation ignored");
				}
			}
		}

		Ok(RouteOutcome {
			action: Some(action.as_str().to_string()),
			installation: Some(id),
			repository: None,
		})
	}

	async fn handle_repositories(
		&self,
		delivery: &WebhookDelivery,
	) -> Result<RouteOutcome, IngestError> {
		let payload: RepositoriesEventPayload = parse_payload(&delivery.body)?;
		let id = InstallationId(payload.installation.id);
		let added = parse_repo_keys(&payload.repositories_added);
		let removed = parse_repo_keys(&payload.repositories_removed);
		let selection = payload
			.repository_selection
			.as_deref()
			.and_then(|s| s.parse::<RepositorySelection>().ok());

		// Removal revokes access only. Project data for the repository stays
		// in the store for export and audit.
		let result = self
			.registry
			.update_installation(id, move |installation| {
				if let Some(mode) = selection {
					installation.repository_selection = mode;
				}
				for repo in added {
					installation.selected_repositories.insert(repo);
				}
				for repo in &removed {
					installation.selected_repositories.remove(repo);
				}
			})
			.await;
		match result {
			Ok(()) => info!(
				installation = %id,
				action = payload.action.as_str(),
				"updated repository selection"
			),
			Err(err) => {
				debug!(installation = %id, error = %err, "repository change for unregistered installation ignored");
			}
		}

		Ok(RouteOutcome {
			action: Some(payload.action.as_str().to_string()),
			installation: Some(id),
			repository: None,
		})
	}

	/// `repository` events (renamed, archived, ...) are recorded with their
	/// metadata but never mutate project data.
	async fn handle_repository(
		&self,
		delivery: &WebhookDelivery,
	) -> Result<RouteOutcome, IngestError> {
		let payload: RepositoryEventPayload = parse_payload(&delivery.body)?;
		let repository = RepoKey::parse(&payload.repository.full_name).ok();
		debug!(
			action = %payload.action,
			repository = %payload.repository.full_name,
			"repository lifecycle recorded without dispatch"
		);
		Ok(RouteOutcome {
			action: Some(payload.action),
			installation: payload.installation.map(|i| InstallationId(i.id)),
			repository,
		})
	}

	async fn handle_content_change(
		&self,
		delivery: &WebhookDelivery,
	) -> Result<RouteOutcome, IngestError> {
		let payload: ContentChangePayload = parse_payload(&delivery.body)?;
		let installation = InstallationId(payload.installation.id);
		let repo = RepoKey::parse(&payload.repository.full_name).map_err(IngestError::malformed)?;

		if self.registry.get_installation(installation).await.is_none() {
			return Err(IngestError::UnknownInstallation(installation));
		}
		if !self
			.registry
			.has_feature_access(installation, Capability::Traceability)
			.await
		{
			return Err(IngestError::EntitlementDenied {
				installation,
				capability: Capability::Traceability,
			});
		}
		if !self
			.registry
			.has_repository_access(installation, &repo)
			.await
		{
			return Err(IngestError::RepositoryNotPermitted {
				installation,
				repository: repo,
			});
		}

		let ids = changed_record_ids(&payload);
		if ids.is_empty() {
			debug!(repo = %repo, "content change named no syncable records");
		} else {
			let report = self.synchronizer.sync_records(&repo, ids).await;
			if !report.failed.is_empty() {
				warn!(
					repo = %repo,
					failed = report.failed.len(),
					"content-change sync left records unreconciled"
				);
			}
			info!(repo = %repo, applied = report.applied, "applied content change");
		}

		Ok(RouteOutcome {
			action: None,
			installation: Some(installation),
			repository: Some(repo),
		})
	}
}

/// Ids worth syncing from a content-change payload.
///
/// The id prefix is authoritative for the record's kind; a payload kind that
/// contradicts it marks a corrupt entry, which is skipped rather than failing
/// the whole delivery.
fn changed_record_ids(payload: &ContentChangePayload) -> Vec<EntityId> {
	let mut ids = Vec::with_capacity(payload.changed.len());
	for changed in &payload.changed {
		let entity_id = match EntityId::parse(&changed.id) {
			Ok(entity_id) => entity_id,
			Err(err) => {
				warn!(record = %changed.id, error = %err, "skipping unparseable record id");
				continue;
			}
		};
		if let Ok(kind) = changed.kind.parse::<EntityKind>() {
			if !entity_id.matches_kind(kind) {
				warn!(
					record = %changed.id,
					kind = %kind,
					"skipping record whose kind does not match its id prefix"
				);
				continue;
			}
		}
		ids.push(entity_id);
	}
	ids
}

fn installation_from_payload(
	payload: InstallationPayload,
	repositories: &[RepositoryPayload],
) -> Installation {
	let InstallationPayload {
		id,
		account,
		repository_selection,
		permissions,
		events,
	} = payload;
	let id = InstallationId(id);

	let account = match account.account_type.parse::<AccountType>() {
		Ok(AccountType::User) => AccountRef::user(account.login),
		Ok(AccountType::Organization) => AccountRef::organization(account.login),
		Err(err) => {
			warn!(installation = %id, error = %err, "unknown account type, assuming organization");
			AccountRef::organization(account.login)
		}
	};

	let mut installation = Installation::new(id, account);
	installation.permissions = parse_permissions(&permissions);
	installation.events = events;
	if let Some(selection) = repository_selection.as_deref() {
		match selection.parse::<RepositorySelection>() {
			Ok(mode) => installation.repository_selection = mode,
			Err(err) => {
				warn!(installation = %id, error = %err, "unknown repository selection, keeping default");
			}
		}
	}
	if installation.repository_selection == RepositorySelection::Selected {
		installation.selected_repositories = parse_repo_keys(repositories);
	}
	installation
}

fn parse_permissions(raw: &BTreeMap<String, String>) -> BTreeMap<String, PermissionLevel> {
	let mut permissions = BTreeMap::new();
	for (scope, level) in raw {
		match level.parse::<PermissionLevel>() {
			Ok(level) => {
				permissions.insert(scope.clone(), level);
			}
			Err(err) => warn!(scope = %scope, error = %err, "skipping unknown permission level"),
		}
	}
	permissions
}

fn parse_repo_keys(repos: &[RepositoryPayload]) -> BTreeSet<RepoKey> {
	let mut keys = BTreeSet::new();
	for repo in repos {
		match RepoKey::parse(&repo.full_name) {
			Ok(key) => {
				keys.insert(key);
			}
			Err(err) => {
				warn!(repository = %repo.full_name, error = %err, "skipping malformed repository name");
			}
		}
	}
	keys
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use serde_json::json;
	use std::collections::HashMap;
	use std::sync::Mutex;

	use lattice_ingest_core::DeliveryId;
	use lattice_server_trace::{
		RecordRef, RemoteRecord, TraceStore, UpstreamClient, UpstreamError,
	};

	#[derive(Default)]
	struct StubUpstream {
		records: Mutex<HashMap<EntityId, RemoteRecord>>,
	}

	impl StubUpstream {
		fn insert(&self, record: RemoteRecord) {
			self.records
				.lock()
				.unwrap()
				.insert(record.id.clone(), record);
		}
	}

	#[async_trait]
	impl UpstreamClient for StubUpstream {
		async fn fetch_manifest(&self, _repo: &RepoKey) -> Result<Vec<RecordRef>, UpstreamError> {
			let records = self.records.lock().unwrap();
			Ok(records
				.keys()
				.map(|id| RecordRef { id: id.clone() })
				.collect())
		}

		async fn fetch_record(
			&self,
			_repo: &RepoKey,
			record: &RecordRef,
		) -> Result<RemoteRecord, UpstreamError> {
			self.records
				.lock()
				.unwrap()
				.get(&record.id)
				.cloned()
				.ok_or_else(|| UpstreamError::Status {
					status: 404,
					url: format!("stub://records/{}", record.id),
				})
		}
	}

	struct Fixture {
		registry: Arc<TenantRegistry>,
		upstream: Arc<StubUpstream>,
		router: EventRouter,
	}

	fn fixture() -> Fixture {
		let registry = Arc::new(TenantRegistry::new());
		let upstream = Arc::new(StubUpstream::default());
		let synchronizer = Arc::new(ProjectSynchronizer::new(
			Arc::new(TraceStore::new()),
			Arc::clone(&upstream) as Arc<dyn UpstreamClient>,
		));
		let router = EventRouter::new(Arc::clone(&registry), synchronizer);
		Fixture {
			registry,
			upstream,
			router,
		}
	}

	fn delivery(event: &str, body: serde_json::Value) -> WebhookDelivery {
		WebhookDelivery::new(
			DeliveryId::parse("d-1").unwrap(),
			event,
			body.to_string().into_bytes(),
		)
	}

	fn installation_created_body() -> serde_json::Value {
		json!({
			"action": "created",
			"installation": {
				"id": 12345,
				"account": { "login": "acme-corp", "type": "Organization" },
				"repository_selection": "selected",
				"permissions": { "contents": "read", "metadata": "read" },
				"events": ["push", "installation"]
			},
			"repositories": [
				{ "full_name": "acme-corp/device-firmware" }
			]
		})
	}

	#[tokio::test]
	async fn test_installation_created_registers() {
		let fx = fixture();
		let outcome = fx
			.router
			.route(&delivery("installation", installation_created_body()))
			.await
			.unwrap();

		assert_eq!(outcome.action.as_deref(), Some("created"));
		assert_eq!(outcome.installation, Some(InstallationId(12345)));

		let installation = fx
			.registry
			.get_installation(InstallationId(12345))
			.await
			.unwrap();
		assert!(installation.is_active());
		assert_eq!(installation.account.login, "acme-corp");
		assert_eq!(
			installation.repository_selection,
			RepositorySelection::Selected
		);
		assert!(installation
			.has_repository_access(&RepoKey::new("acme-corp", "device-firmware")));
		assert_eq!(
			installation.permissions.get("contents"),
			Some(&PermissionLevel::Read)
		);
	}

	#[tokio::test]
	async fn test_deleted_for_unknown_installation_is_tolerated() {
		let fx = fixture();
		let body = json!({
			"action": "deleted",
			"installation": {
				"id": 777,
				"account": { "login": "ghost", "type": "Organization" }
			}
		});
		let outcome = fx.router.route(&delivery("installation", body)).await.unwrap();
		assert_eq!(outcome.action.as_deref(), Some("deleted"));
		assert_eq!(fx.registry.installation_count().await, 0);
	}

	#[tokio::test]
	async fn test_repositories_removed_revokes_access_only() {
		let fx = fixture();
		fx.router
			.route(&delivery("installation", installation_created_body()))
			.await
			.unwrap();

		let repo = RepoKey::new("acme-corp", "device-firmware");
		assert!(
			fx.registry
				.has_repository_access(InstallationId(12345), &repo)
				.await
		);

		let body = json!({
			"action": "removed",
			"installation": { "id": 12345 },
			"repositories_removed": [
				{ "full_name": "acme-corp/device-firmware" }
			]
		});
		fx.router
			.route(&delivery("installation_repositories", body))
			.await
			.unwrap();

		assert!(
			!fx.registry
				.has_repository_access(InstallationId(12345), &repo)
				.await
		);
		// The installation itself is untouched.
		assert!(fx
			.registry
			.get_installation(InstallationId(12345))
			.await
			.unwrap()
			.is_active());
	}

	#[tokio::test]
	async fn test_repository_event_recorded_without_mutation() {
		let fx = fixture();
		let body = json!({
			"action": "renamed",
			"repository": { "full_name": "acme-corp/device-firmware" },
			"installation": { "id": 12345 }
		});
		let outcome = fx.router.route(&delivery("repository", body)).await.unwrap();
		assert_eq!(outcome.action.as_deref(), Some("renamed"));
		assert_eq!(
			outcome.repository,
			Some(RepoKey::new("acme-corp", "device-firmware"))
		);
		assert_eq!(fx.registry.installation_count().await, 0);
	}

	#[tokio::test]
	async fn test_content_change_requires_registration() {
		let fx = fixture();
		let body = json!({
			"installation": { "id": 999 },
			"repository": { "full_name": "ghost/repo" },
			"changed": [{ "kind": "requirement", "id": "REQ-001" }]
		});
		let err = fx.router.route(&delivery("push", body)).await.unwrap_err();
		assert!(matches!(
			err,
			IngestError::UnknownInstallation(InstallationId(999))
		));
	}

	#[tokio::test]
	async fn test_content_change_syncs_named_records() {
		let fx = fixture();
		fx.router
			.route(&delivery("installation", installation_created_body()))
			.await
			.unwrap();
		fx.upstream.insert(RemoteRecord {
			id: EntityId::parse("REQ-001").unwrap(),
			description: "brake pressure bounds".to_string(),
			status: None,
			links: Vec::new(),
		});

		let body = json!({
			"installation": { "id": 12345 },
			"repository": { "full_name": "acme-corp/device-firmware" },
			"changed": [{ "kind": "requirement", "id": "REQ-001" }]
		});
		let outcome = fx.router.route(&delivery("push", body)).await.unwrap();

		let repo = RepoKey::new("acme-corp", "device-firmware");
		assert_eq!(outcome.repository, Some(repo.clone()));
		let project = fx
			.router
			.synchronizer
			.store()
			.get_project_data(&repo)
			.await
			.unwrap();
		assert!(project
			.entity(&EntityId::parse("REQ-001").unwrap())
			.is_some());
	}

	mod payload_mapping {
		use super::*;

		#[test]
		fn test_selection_defaults_to_all() {
			let payload = InstallationPayload {
				id: 1,
				account: lattice_ingest_core::AccountPayload {
					login: "acme-corp".to_string(),
					account_type: "Organization".to_string(),
				},
				repository_selection: None,
				permissions: BTreeMap::new(),
				events: Vec::new(),
			};
			let installation = installation_from_payload(payload, &[]);
			assert_eq!(installation.repository_selection, RepositorySelection::All);
			assert!(installation.selected_repositories.is_empty());
		}

		#[test]
		fn test_user_account_type_maps() {
			let payload = InstallationPayload {
				id: 1,
				account: lattice_ingest_core::AccountPayload {
					login: "octocat".to_string(),
					account_type: "User".to_string(),
				},
				repository_selection: None,
				permissions: BTreeMap::new(),
				events: Vec::new(),
			};
			let installation = installation_from_payload(payload, &[]);
			assert_eq!(installation.account.account_type, AccountType::User);
		}

		#[test]
		fn test_unknown_permission_levels_skipped() {
			let raw = BTreeMap::from([
				("contents".to_string(), "read".to_string()),
				("checks".to_string(), "maybe".to_string()),
			]);
			let permissions = parse_permissions(&raw);
			assert_eq!(permissions.len(), 1);
			assert_eq!(permissions.get("contents"), Some(&PermissionLevel::Read));
		}

		#[test]
		fn test_malformed_repo_names_skipped() {
			let repos = vec![
				RepositoryPayload {
					full_name: "acme-corp/device-firmware".to_string(),
				},
				RepositoryPayload {
					full_name: "not-a-repo".to_string(),
				},
			];
			let keys = parse_repo_keys(&repos);
			assert_eq!(keys.len(), 1);
		}

		#[test]
		fn test_changed_ids_skip_mismatched_kind() {
			let payload: ContentChangePayload = serde_json::from_value(json!({
				"installation": { "id": 1 },
				"repository": { "full_name": "a/b" },
				"changed": [
					{ "kind": "requirement", "id": "REQ-001" },
					{ "kind": "test_case", "id": "REQ-002" },
					{ "kind": "requirement", "id": "garbage" },
					{ "kind": "unheard_of", "id": "TC-003" }
				]
			}))
			.unwrap();
			let ids = changed_record_ids(&payload);
			// Mismatched kind and unparseable id are dropped; unknown kind
			// strings defer to the id prefix.
			assert_eq!(ids.len(), 2);
			assert_eq!(ids[0].as_str(), "REQ-001");
			assert_eq!(ids[1].as_str(), "TC-003");
		}
	}
}
