// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lock-free delivery counters, the rolling error window, and the snapshot
//! types served to operators.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use lattice_ingest_core::{DeliveryOutcome, EventKind, WebhookEventRecord};

/// Per-kind and per-outcome delivery totals.
///
/// Fixed arrays indexed by the enums' `ALL` ordering; every update is a
/// single relaxed `fetch_add`, so the ingest hot path never takes a lock.
#[derive(Debug)]
pub(crate) struct DeliveryCounters {
	by_kind: [AtomicU64; EventKind::ALL.len()],
	by_outcome: [AtomicU64; DeliveryOutcome::ALL.len()],
}

impl DeliveryCounters {
	pub(crate) fn new() -> Self {
		Self {
			by_kind: std::array::from_fn(|_| AtomicU64::new(0)),
			by_outcome: std::array::from_fn(|_| AtomicU64::new(0)),
		}
	}

	pub(crate) fn record(&self, kind: EventKind, outcome: DeliveryOutcome) {
		if let Some(i) = EventKind::ALL.iter().position(|k| *k == kind) {
			self.by_kind[i].fetch_add(1, Ordering::Relaxed);
		}
		if let Some(i) = DeliveryOutcome::ALL.iter().position(|o| *o == outcome) {
			self.by_outcome[i].fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Every kind appears in the snapshot, including ones still at zero.
	pub(crate) fn kind_snapshot(&self) -> BTreeMap<String, u64> {
		EventKind::ALL
			.iter()
			.zip(&self.by_kind)
			.map(|(kind, count)| (kind.as_str().to_string(), count.load(Ordering::Relaxed)))
			.collect()
	}

	pub(crate) fn outcome_snapshot(&self) -> BTreeMap<String, u64> {
		DeliveryOutcome::ALL
			.iter()
			.zip(&self.by_outcome)
			.map(|(outcome, count)| (outcome.as_str().to_string(), count.load(Ordering::Relaxed)))
			.collect()
	}

	pub(crate) fn total(&self) -> u64 {
		self.by_outcome.iter().map(|c| c.load(Ordering::Relaxed)).sum()
	}

	pub(crate) fn failed(&self) -> u64 {
		DeliveryOutcome::ALL
			.iter()
			.zip(&self.by_outcome)
			.filter(|(outcome, _)| outcome.is_failure())
			.map(|(_, count)| count.load(Ordering::Relaxed))
			.sum()
	}
}

/// Failure rate over a fixed trailing window, in one-minute buckets.
///
/// Each bucket is tagged with the minute it covers; a writer landing on a
/// stale bucket claims it and resets the counts. Readers skip buckets whose
/// tag falls outside the window, so expiry needs no background sweeper.
#[derive(Debug)]
pub struct RollingErrorWindow {
	buckets: Vec<WindowBucket>,
}

#[derive(Debug)]
struct WindowBucket {
	/// Minute-since-epoch this bucket currently covers, -1 when untouched.
	minute: AtomicI64,
	total: AtomicU64,
	failed: AtomicU64,
}

impl RollingErrorWindow {
	pub fn new(window_minutes: usize) -> Self {
		let buckets = (0..window_minutes.max(1))
			.map(|_| WindowBucket {
				minute: AtomicI64::new(-1),
				total: AtomicU64::new(0),
				failed: AtomicU64::new(0),
			})
			.collect();
		Self { buckets }
	}

	/// Count one finished delivery against the current minute.
	pub fn record(&self, failed: bool) {
		self.record_at(Utc::now(), failed);
	}

	fn record_at(&self, now: DateTime<Utc>, failed: bool) {
		let minute = now.timestamp().div_euclid(60);
		let bucket = &self.buckets[minute.rem_euclid(self.buckets.len() as i64) as usize];

		let tagged = bucket.minute.load(Ordering::Acquire);
		if tagged != minute
			&& bucket
				.minute
				.compare_exchange(tagged, minute, Ordering::AcqRel, Ordering::Acquire)
				.is_ok()
		{
			// This writer claimed the rollover; concurrent writers on the
			// same minute see the tag already updated and skip the reset.
			bucket.total.store(0, Ordering::Release);
			bucket.failed.store(0, Ordering::Release);
		}

		bucket.total.fetch_add(1, Ordering::Relaxed);
		if failed {
			bucket.failed.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Fraction of failed deliveries inside the window, 0.0 when idle.
	pub fn error_rate(&self) -> f64 {
		self.error_rate_at(Utc::now())
	}

	fn error_rate_at(&self, now: DateTime<Utc>) -> f64 {
		let current = now.timestamp().div_euclid(60);
		let oldest = current - self.buckets.len() as i64 + 1;

		let mut total = 0u64;
		let mut failed = 0u64;
		for bucket in &self.buckets {
			let minute = bucket.minute.load(Ordering::Acquire);
			if minute < oldest || minute > current {
				continue;
			}
			total += bucket.total.load(Ordering::Relaxed);
			failed += bucket.failed.load(Ordering::Relaxed);
		}

		if total == 0 {
			0.0
		} else {
			failed as f64 / total as f64
		}
	}
}

/// Point-in-time application metrics.
///
/// Installation gauges are folded from registry events and are best-effort;
/// reconcile against the registry itself when exactness matters.
#[derive(Debug, Clone, Serialize)]
pub struct AppMetrics {
	/// Lifetime count of first-time installation registrations.
	pub installations_total: u64,
	pub installations_active: u64,
	pub repositories_tracked: u64,
	pub events_processed: u64,
	pub events_failed: u64,
	/// Failure fraction over the trailing error window, 0.0 when idle.
	pub error_rate: f64,
	/// Records the overflow policy discarded. They are counted in the
	/// totals above but absent from the history ring and the ledger.
	pub records_dropped: u64,
	pub computed_at: DateTime<Utc>,
}

/// Webhook delivery breakdown by kind and outcome.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookStats {
	pub by_kind: BTreeMap<String, u64>,
	pub by_outcome: BTreeMap<String, u64>,
	/// Fraction of deliveries that finished without failure, 1.0 when idle.
	pub success_rate: f64,
	pub recent_failures: Vec<WebhookEventRecord>,
	pub computed_at: DateTime<Utc>,
}
