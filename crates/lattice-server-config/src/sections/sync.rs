// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Upstream record synchronization configuration section.

use std::time::Duration;

use lattice_common_http::RetryConfig;
use lattice_common_secret::SecretString;
use serde::{Deserialize, Serialize};

fn default_upstream_base_url() -> String {
	"https://api.github.com".to_string()
}

fn default_max_concurrent_fetches() -> usize {
	8
}

/// Retry tuning layer for upstream fetches. Finalizes into
/// [`RetryConfig`]; unset fields keep that type's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetryConfigLayer {
	#[serde(default)]
	pub max_attempts: Option<u32>,
	#[serde(default)]
	pub base_delay_ms: Option<u64>,
	#[serde(default)]
	pub max_delay_ms: Option<u64>,
}

impl RetryConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.max_attempts.is_some() {
			self.max_attempts = other.max_attempts;
		}
		if other.base_delay_ms.is_some() {
			self.base_delay_ms = other.base_delay_ms;
		}
		if other.max_delay_ms.is_some() {
			self.max_delay_ms = other.max_delay_ms;
		}
	}

	pub fn finalize(self) -> RetryConfig {
		let defaults = RetryConfig::default();
		RetryConfig {
			max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
			base_delay: self
				.base_delay_ms
				.map(Duration::from_millis)
				.unwrap_or(defaults.base_delay),
			max_delay: self
				.max_delay_ms
				.map(Duration::from_millis)
				.unwrap_or(defaults.max_delay),
		}
	}
}

/// Sync configuration layer (partial, for merging).
///
/// The upstream token is not part of the layer. It is only accepted from the
/// environment so it can never end up in a config file on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncConfigLayer {
	#[serde(default)]
	pub upstream_base_url: Option<String>,
	#[serde(default)]
	pub max_concurrent_fetches: Option<usize>,
	#[serde(default)]
	pub retry: Option<RetryConfigLayer>,
}

impl SyncConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.upstream_base_url.is_some() {
			self.upstream_base_url = other.upstream_base_url;
		}
		if other.max_concurrent_fetches.is_some() {
			self.max_concurrent_fetches = other.max_concurrent_fetches;
		}
		if let Some(other_retry) = other.retry {
			match self.retry.as_mut() {
				Some(retry) => retry.merge(other_retry),
				None => self.retry = Some(other_retry),
			}
		}
	}

	pub fn finalize(self, upstream_token: Option<SecretString>) -> SyncConfig {
		SyncConfig {
			upstream_base_url: self
				.upstream_base_url
				.unwrap_or_else(default_upstream_base_url),
			max_concurrent_fetches: self
				.max_concurrent_fetches
				.unwrap_or_else(default_max_concurrent_fetches),
			retry: self.retry.unwrap_or_default().finalize(),
			upstream_token,
		}
	}
}

/// Sync configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct SyncConfig {
	pub upstream_base_url: String,
	pub max_concurrent_fetches: usize,
	pub retry: RetryConfig,
	pub upstream_token: Option<SecretString>,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			upstream_base_url: default_upstream_base_url(),
			max_concurrent_fetches: default_max_concurrent_fetches(),
			retry: RetryConfig::default(),
			upstream_token: None,
		}
	}
}
