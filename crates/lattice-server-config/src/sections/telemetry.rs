// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Telemetry pipeline configuration section.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_queue_capacity() -> usize {
	10_000
}

fn default_history_capacity() -> usize {
	1_000
}

fn default_history_retention_secs() -> u64 {
	24 * 60 * 60
}

fn default_error_window_minutes() -> usize {
	60
}

/// What to do with an incoming record when the telemetry queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOverflowPolicy {
	/// Drop the incoming record and count the drop.
	#[default]
	DropNewest,
	/// Wait for queue space. Callers stall under sustained overload.
	Block,
}

/// Telemetry configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfigLayer {
	#[serde(default)]
	pub queue_capacity: Option<usize>,
	#[serde(default)]
	pub queue_overflow_policy: Option<QueueOverflowPolicy>,
	#[serde(default)]
	pub history_capacity: Option<usize>,
	#[serde(default)]
	pub history_retention_secs: Option<u64>,
	#[serde(default)]
	pub error_window_minutes: Option<usize>,
	#[serde(default)]
	pub ledger_db_path: Option<PathBuf>,
}

impl TelemetryConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.queue_capacity.is_some() {
			self.queue_capacity = other.queue_capacity;
		}
		if other.queue_overflow_policy.is_some() {
			self.queue_overflow_policy = other.queue_overflow_policy;
		}
		if other.history_capacity.is_some() {
			self.history_capacity = other.history_capacity;
		}
		if other.history_retention_secs.is_some() {
			self.history_retention_secs = other.history_retention_secs;
		}
		if other.error_window_minutes.is_some() {
			self.error_window_minutes = other.error_window_minutes;
		}
		if other.ledger_db_path.is_some() {
			self.ledger_db_path = other.ledger_db_path;
		}
	}

	pub fn finalize(self) -> TelemetryConfig {
		TelemetryConfig {
			queue_capacity: self.queue_capacity.unwrap_or_else(default_queue_capacity),
			queue_overflow_policy: self.queue_overflow_policy.unwrap_or_default(),
			history_capacity: self.history_capacity.unwrap_or_else(default_history_capacity),
			history_retention: Duration::from_secs(
				self.history_retention_secs
					.unwrap_or_else(default_history_retention_secs),
			),
			error_window_minutes: self
				.error_window_minutes
				.unwrap_or_else(default_error_window_minutes),
			ledger_db_path: self.ledger_db_path,
		}
	}
}

/// Telemetry configuration (runtime, fully resolved).
///
/// `ledger_db_path` of `None` means no durable ledger; the in-memory history
/// ring still runs.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
	pub queue_capacity: usize,
	pub queue_overflow_policy: QueueOverflowPolicy,
	pub history_capacity: usize,
	pub history_retention: Duration,
	pub error_window_minutes: usize,
	pub ledger_db_path: Option<PathBuf>,
}

impl Default for TelemetryConfig {
	fn default() -> Self {
		Self {
			queue_capacity: default_queue_capacity(),
			queue_overflow_policy: QueueOverflowPolicy::default(),
			history_capacity: default_history_capacity(),
			history_retention: Duration::from_secs(default_history_retention_secs()),
			error_window_minutes: default_error_window_minutes(),
			ledger_db_path: None,
		}
	}
}
