// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Webhook ingestion configuration section.

use std::time::Duration;

use lattice_common_secret::SecretString;
use serde::{Deserialize, Serialize};

fn default_max_payload_bytes() -> usize {
	1024 * 1024
}

fn default_dedupe_retention_secs() -> u64 {
	6 * 60 * 60
}

fn default_dedupe_shards() -> usize {
	16
}

/// Ingestion configuration layer (partial, for merging).
///
/// The webhook secret is not part of the layer. It is only accepted from the
/// environment so it can never end up in a config file on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestConfigLayer {
	#[serde(default)]
	pub max_payload_bytes: Option<usize>,
	#[serde(default)]
	pub dedupe_retention_secs: Option<u64>,
	#[serde(default)]
	pub dedupe_shards: Option<usize>,
}

impl IngestConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.max_payload_bytes.is_some() {
			self.max_payload_bytes = other.max_payload_bytes;
		}
		if other.dedupe_retention_secs.is_some() {
			self.dedupe_retention_secs = other.dedupe_retention_secs;
		}
		if other.dedupe_shards.is_some() {
			self.dedupe_shards = other.dedupe_shards;
		}
	}

	pub fn finalize(self, webhook_secret: Option<SecretString>) -> IngestConfig {
		IngestConfig {
			max_payload_bytes: self.max_payload_bytes.unwrap_or_else(default_max_payload_bytes),
			dedupe_retention: Duration::from_secs(
				self.dedupe_retention_secs
					.unwrap_or_else(default_dedupe_retention_secs),
			),
			dedupe_shards: self.dedupe_shards.unwrap_or_else(default_dedupe_shards),
			webhook_secret,
		}
	}
}

/// Ingestion configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct IngestConfig {
	pub max_payload_bytes: usize,
	pub dedupe_retention: Duration,
	pub dedupe_shards: usize,
	pub webhook_secret: Option<SecretString>,
}

impl Default for IngestConfig {
	fn default() -> Self {
		Self {
			max_payload_bytes: default_max_payload_bytes(),
			dedupe_retention: Duration::from_secs(default_dedupe_retention_secs()),
			dedupe_shards: default_dedupe_shards(),
			webhook_secret: None,
		}
	}
}
