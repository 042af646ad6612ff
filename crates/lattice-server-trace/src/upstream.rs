// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read-side client for the hosting platform's record store.
//!
//! The synchronizer only ever reads upstream: a manifest listing the records
//! a repository currently holds, then the records themselves. Implementations
//! are swappable so tests can inject fixtures and failures.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use lattice_common_http::{retry, RetryConfig};
use lattice_common_secret::SecretString;
use lattice_tenants_core::RepoKey;
use lattice_trace_core::{EntityId, EntityStatus};

use crate::error::UpstreamError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reference to one record in the upstream manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
	pub id: EntityId,
}

/// One record as the upstream endpoint serves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
	pub id: EntityId,
	pub description: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<EntityStatus>,
	/// Ids this record declares trace links to.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub links: Vec<EntityId>,
}

/// Client for the upstream record store.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
	/// List every traceability record the repository currently holds.
	async fn fetch_manifest(&self, repo: &RepoKey) -> Result<Vec<RecordRef>, UpstreamError>;

	/// Fetch one record by reference.
	async fn fetch_record(
		&self,
		repo: &RepoKey,
		record: &RecordRef,
	) -> Result<RemoteRecord, UpstreamError>;
}

/// HTTP implementation over the platform's REST surface.
///
/// Transient failures are retried here with backoff, so callers see only
/// final outcomes.
pub struct HttpUpstreamClient {
	client: reqwest::Client,
	base_url: String,
	token: Option<SecretString>,
	retry: RetryConfig,
}

impl HttpUpstreamClient {
	pub fn new(base_url: impl Into<String>) -> Self {
		let mut base_url = base_url.into();
		while base_url.ends_with('/') {
			base_url.pop();
		}
		Self {
			client: lattice_common_http::new_client_with_timeout(DEFAULT_TIMEOUT),
			base_url,
			token: None,
			retry: RetryConfig::default(),
		}
	}

	pub fn with_token(mut self, token: SecretString) -> Self {
		self.token = Some(token);
		self
	}

	pub fn with_retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	fn manifest_url(&self, repo: &RepoKey) -> String {
		format!(
			"{}/repos/{}/{}/records",
			self.base_url,
			repo.owner(),
			repo.name()
		)
	}

	fn record_url(&self, repo: &RepoKey, record: &RecordRef) -> String {
		format!(
			"{}/repos/{}/{}/records/{}",
			self.base_url,
			repo.owner(),
			repo.name(),
			record.id
		)
	}

	async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, UpstreamError> {
		let mut request = self.client.get(url);
		if let Some(token) = &self.token {
			request = request.bearer_auth(token.expose());
		}
		let response = request.send().await?;
		let status = response.status();
		if !status.is_success() {
			return Err(UpstreamError::Status {
				status: status.as_u16(),
				url: url.to_string(),
			});
		}
		let body = response.bytes().await?;
		Ok(serde_json::from_slice(&body)?)
	}
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
	async fn fetch_manifest(&self, repo: &RepoKey) -> Result<Vec<RecordRef>, UpstreamError> {
		let url = self.manifest_url(repo);
		retry(&self.retry, "fetch_manifest", || self.get_json(&url)).await
	}

	async fn fetch_record(
		&self,
		repo: &RepoKey,
		record: &RecordRef,
	) -> Result<RemoteRecord, UpstreamError> {
		let url = self.record_url(repo, record);
		retry(&self.retry, "fetch_record", || self.get_json(&url)).await
	}
}
