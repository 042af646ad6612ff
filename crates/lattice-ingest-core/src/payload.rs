// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Webhook payload shapes, narrowed to the fields the engine consumes.
//!
//! Payloads are deserialize-only. Unknown fields are ignored so upstream
//! payload growth never breaks ingestion.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::IngestError;

/// Decode a payload shape from the raw delivery bytes.
pub fn parse_payload<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, IngestError> {
	serde_json::from_slice(body).map_err(IngestError::MalformedPayload)
}

/// Account object embedded in installation payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPayload {
	pub login: String,
	#[serde(rename = "type")]
	pub account_type: String,
}

/// Installation object carried by lifecycle payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationPayload {
	pub id: i64,
	pub account: AccountPayload,
	#[serde(default)]
	pub repository_selection: Option<String>,
	#[serde(default)]
	pub permissions: BTreeMap<String, String>,
	#[serde(default)]
	pub events: Vec<String>,
}

/// Bare installation reference carried by non-lifecycle payloads.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InstallationRefPayload {
	pub id: i64,
}

/// Repository reference as payloads carry it.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryPayload {
	pub full_name: String,
}

/// Actions on the `installation` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationAction {
	Created,
	Deleted,
	Suspend,
	Unsuspend,
	NewPermissionsAccepted,
}

impl InstallationAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Created => "created",
			Self::Deleted => "deleted",
			Self::Suspend => "suspend",
			Self::Unsuspend => "unsuspend",
			Self::NewPermissionsAccepted => "new_permissions_accepted",
		}
	}
}

/// `installation` event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationEventPayload {
	pub action: InstallationAction,
	pub installation: InstallationPayload,
	#[serde(default)]
	pub repositories: Vec<RepositoryPayload>,
}

/// Actions on the `installation_repositories` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoriesAction {
	Added,
	Removed,
}

impl RepositoriesAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Added => "added",
			Self::Removed => "removed",
		}
	}
}

/// `installation_repositories` event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoriesEventPayload {
	pub action: RepositoriesAction,
	pub installation: InstallationRefPayload,
	/// Selection mode after the change, when the platform includes it.
	#[serde(default)]
	pub repository_selection: Option<String>,
	#[serde(default)]
	pub repositories_added: Vec<RepositoryPayload>,
	#[serde(default)]
	pub repositories_removed: Vec<RepositoryPayload>,
}

/// `repository` event payload (renamed, archived, deleted, ...).
///
/// The action set is open upstream; the engine records it verbatim and never
/// mutates project data from this event.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryEventPayload {
	pub action: String,
	pub repository: RepositoryPayload,
	#[serde(default)]
	pub installation: Option<InstallationRefPayload>,
}

/// One changed traceability record referenced by a content-change payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangedRecordPayload {
	pub kind: String,
	pub id: String,
}

/// Content-change (`push`) payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentChangePayload {
	pub installation: InstallationRefPayload,
	pub repository: RepositoryPayload,
	#[serde(default)]
	pub changed: Vec<ChangedRecordPayload>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_parse_installation_created() {
		let body = json!({
			"action": "created",
			"installation": {
				"id": 12345,
				"account": { "login": "acme-corp", "type": "Organization" },
				"repository_selection": "all",
				"permissions": { "contents": "read", "metadata": "read" },
				"events": ["push", "installation"]
			},
			"repositories": [
				{ "full_name": "acme-corp/device-firmware" }
			],
			"sender": { "login": "octocat" }
		});

		let payload: InstallationEventPayload =
			parse_payload(body.to_string().as_bytes()).unwrap();
		assert_eq!(payload.action, InstallationAction::Created);
		assert_eq!(payload.installation.id, 12345);
		assert_eq!(payload.installation.account.login, "acme-corp");
		assert_eq!(payload.installation.account.account_type, "Organization");
		assert_eq!(
			payload.installation.repository_selection.as_deref(),
			Some("all")
		);
		assert_eq!(payload.installation.permissions.len(), 2);
		assert_eq!(payload.repositories.len(), 1);
	}

	#[test]
	fn test_parse_installation_deleted_without_repositories() {
		let body = json!({
			"action": "deleted",
			"installation": {
				"id": 12345,
				"account": { "login": "acme-corp", "type": "Organization" }
			}
		});

		let payload: InstallationEventPayload =
			parse_payload(body.to_string().as_bytes()).unwrap();
		assert_eq!(payload.action, InstallationAction::Deleted);
		assert!(payload.repositories.is_empty());
		assert!(payload.installation.permissions.is_empty());
	}

	#[test]
	fn test_parse_repositories_event() {
		let body = json!({
			"action": "added",
			"installation": { "id": 12345 },
			"repository_selection": "selected",
			"repositories_added": [
				{ "full_name": "acme-corp/device-firmware" },
				{ "full_name": "acme-corp/mobile-app" }
			],
			"repositories_removed": []
		});

		let payload: RepositoriesEventPayload =
			parse_payload(body.to_string().as_bytes()).unwrap();
		assert_eq!(payload.action, RepositoriesAction::Added);
		assert_eq!(payload.installation.id, 12345);
		assert_eq!(payload.repository_selection.as_deref(), Some("selected"));
		assert_eq!(payload.repositories_added.len(), 2);
		assert!(payload.repositories_removed.is_empty());
	}

	#[test]
	fn test_parse_repository_event_with_open_action_set() {
		let body = json!({
			"action": "renamed",
			"repository": { "full_name": "acme-corp/device-firmware" },
			"installation": { "id": 12345 }
		});

		let payload: RepositoryEventPayload = parse_payload(body.to_string().as_bytes()).unwrap();
		assert_eq!(payload.action, "renamed");
		assert_eq!(payload.repository.full_name, "acme-corp/device-firmware");
		assert_eq!(payload.installation.map(|i| i.id), Some(12345));
	}

	#[test]
	fn test_parse_content_change() {
		let body = json!({
			"installation": { "id": 12345 },
			"repository": { "full_name": "acme-corp/device-firmware" },
			"changed": [
				{ "kind": "requirement", "id": "REQ-001" },
				{ "kind": "test_case", "id": "TC-007" }
			]
		});

		let payload: ContentChangePayload = parse_payload(body.to_string().as_bytes()).unwrap();
		assert_eq!(payload.repository.full_name, "acme-corp/device-firmware");
		assert_eq!(payload.changed.len(), 2);
		assert_eq!(payload.changed[0].id, "REQ-001");
	}

	#[test]
	fn test_unknown_action_is_malformed() {
		let body = json!({
			"action": "renamed",
			"installation": {
				"id": 12345,
				"account": { "login": "acme-corp", "type": "Organization" }
			}
		});

		let err = parse_payload::<InstallationEventPayload>(body.to_string().as_bytes())
			.unwrap_err();
		assert!(matches!(err, IngestError::MalformedPayload(_)));
	}

	#[test]
	fn test_truncated_body_is_malformed() {
		let err = parse_payload::<ContentChangePayload>(b"{\"installation\":").unwrap_err();
		assert!(matches!(err, IngestError::MalformedPayload(_)));
	}
}
