// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded-retention delivery-id store.
//!
//! The upstream platform delivers at least once; the deduper makes processing
//! exactly-once within the retention window. Ids are hash-partitioned across a
//! fixed shard array so concurrent deliveries only contend when they land on
//! the same shard. Critical sections are synchronous and never held across an
//! await point.

use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

use lattice_ingest_core::DeliveryId;

const DEFAULT_SHARD_COUNT: usize = 16;
const DEFAULT_RETENTION_SECS: u64 = 6 * 60 * 60;

/// A shard sweeps expired ids at most this often, amortizing prune cost
/// over inserts.
const PRUNE_INTERVAL_SECS: i64 = 60;

/// Whether a delivery id has been seen within the retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeDecision {
	Fresh,
	Duplicate,
}

struct Shard {
	entries: HashMap<String, DateTime<Utc>>,
	last_prune: DateTime<Utc>,
}

/// Sharded delivery-id store with bounded retention.
pub struct DeliveryDeduper {
	shards: Vec<Mutex<Shard>>,
	retention: chrono::Duration,
	recorded: AtomicU64,
	duplicates: AtomicU64,
}

impl Default for DeliveryDeduper {
	fn default() -> Self {
		Self::new(
			std::time::Duration::from_secs(DEFAULT_RETENTION_SECS),
			DEFAULT_SHARD_COUNT,
		)
	}
}

impl DeliveryDeduper {
	pub fn new(retention: std::time::Duration, shard_count: usize) -> Self {
		let now = Utc::now();
		let shards = (0..shard_count.max(1))
			.map(|_| {
				Mutex::new(Shard {
					entries: HashMap::new(),
					last_prune: now,
				})
			})
			.collect();
		Self {
			shards,
			retention: chrono::Duration::from_std(retention)
				.unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_RETENTION_SECS as i64)),
			recorded: AtomicU64::new(0),
			duplicates: AtomicU64::new(0),
		}
	}

	/// Record a delivery id, reporting whether it was already seen.
	///
	/// The first call for an id within the retention window is `Fresh` and
	/// records it; every later call is `Duplicate`. An id whose entry has
	/// expired counts as fresh again.
	pub fn check_and_record(&self, id: &DeliveryId) -> DedupeDecision {
		self.check_at(id.as_str(), Utc::now())
	}

	fn check_at(&self, id: &str, now: DateTime<Utc>) -> DedupeDecision {
		let shard = &self.shards[self.shard_for(id)];
		let mut shard = shard.lock().expect("deduper shard lock poisoned");

		if now.signed_duration_since(shard.last_prune).num_seconds() >= PRUNE_INTERVAL_SECS {
			let horizon = now - self.retention;
			let before = shard.entries.len();
			shard.entries.retain(|_, seen_at| *seen_at > horizon);
			let pruned = before - shard.entries.len();
			if pruned > 0 {
				debug!(pruned, "pruned expired delivery ids");
			}
			shard.last_prune = now;
		}

		match shard.entries.get(id) {
			Some(seen_at) if now.signed_duration_since(*seen_at) <= self.retention => {
				self.duplicates.fetch_add(1, Ordering::Relaxed);
				DedupeDecision::Duplicate
			}
			_ => {
				shard.entries.insert(id.to_string(), now);
				self.recorded.fetch_add(1, Ordering::Relaxed);
				DedupeDecision::Fresh
			}
		}
	}

	/// Sweep every shard now, regardless of the amortized schedule.
	pub fn prune_expired(&self) {
		self.prune_expired_at(Utc::now());
	}

	fn prune_expired_at(&self, now: DateTime<Utc>) {
		let horizon = now - self.retention;
		for shard in &self.shards {
			let mut shard = shard.lock().expect("deduper shard lock poisoned");
			shard.entries.retain(|_, seen_at| *seen_at > horizon);
			shard.last_prune = now;
		}
	}

	/// Ids currently tracked across all shards.
	pub fn tracked_count(&self) -> usize {
		self.shards
			.iter()
			.map(|shard| {
				shard
					.lock()
					.expect("deduper shard lock poisoned")
					.entries
					.len()
			})
			.sum()
	}

	/// Fresh ids recorded since construction.
	pub fn recorded_count(&self) -> u64 {
		self.recorded.load(Ordering::Relaxed)
	}

	/// Duplicate hits since construction.
	pub fn duplicate_count(&self) -> u64 {
		self.duplicates.load(Ordering::Relaxed)
	}

	fn shard_for(&self, id: &str) -> usize {
		let mut hasher = DefaultHasher::new();
		id.hash(&mut hasher);
		(hasher.finish() as usize) % self.shards.len()
	}
}
