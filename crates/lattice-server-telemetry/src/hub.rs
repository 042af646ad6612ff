// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The telemetry hub: a bounded queue in front of a background worker.
//!
//! Counters and the error window update inline on the caller's thread, so
//! the ingest hot path never waits on telemetry. Everything that needs a
//! lock or a sink write (the history ring, the repository set, ledger
//! publishing) flows through the queue and is applied by the worker in
//! arrival order.
//!
//! The hub implements the observer traits of the registry, the trace store,
//! and the ingest gateway, so wiring it up is three `with_observer` calls
//! on an `Arc<TelemetryHub>`.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use lattice_ingest_core::{DeliveryObserver, EventKind, WebhookEventRecord};
use lattice_server_config::{QueueOverflowPolicy, TelemetryConfig};
use lattice_tenants_core::{RegistryEvent, RegistryObserver};
use lattice_trace_core::{AuditEntry, ChangeObserver};

use crate::metrics::{AppMetrics, DeliveryCounters, RollingErrorWindow, WebhookStats};
use crate::sink::LedgerSink;

/// How many failing records a stats snapshot carries.
const RECENT_FAILURES_LIMIT: usize = 10;

enum TelemetryMessage {
	Delivery(WebhookEventRecord),
	Mutation { project: String, entry: AuditEntry },
	Shutdown,
}

/// State shared between the hub handle and its worker.
struct HubShared {
	counters: DeliveryCounters,
	window: RollingErrorWindow,
	registrations_total: AtomicU64,
	installations_active: AtomicU64,
	dropped_records: AtomicU64,
	history: RwLock<VecDeque<WebhookEventRecord>>,
	repositories: RwLock<BTreeSet<String>>,
	history_capacity: usize,
	history_retention: TimeDelta,
}

/// Aggregation hub for delivery records, project mutations, and registry
/// lifecycle events.
pub struct TelemetryHub {
	tx: mpsc::Sender<TelemetryMessage>,
	overflow_policy: QueueOverflowPolicy,
	shared: Arc<HubShared>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryHub {
	/// Spawn the background worker. Requires a running Tokio runtime.
	///
	/// `config.ledger_db_path` is not consumed here; the caller decides
	/// which sinks to construct and passes them in.
	pub fn new(config: TelemetryConfig, sinks: Vec<Arc<dyn LedgerSink>>) -> Self {
		let shared = Arc::new(HubShared {
			counters: DeliveryCounters::new(),
			window: RollingErrorWindow::new(config.error_window_minutes),
			registrations_total: AtomicU64::new(0),
			installations_active: AtomicU64::new(0),
			dropped_records: AtomicU64::new(0),
			history: RwLock::new(VecDeque::new()),
			repositories: RwLock::new(BTreeSet::new()),
			history_capacity: config.history_capacity.max(1),
			history_retention: TimeDelta::from_std(config.history_retention)
				.unwrap_or(TimeDelta::MAX),
		});

		let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
		let worker = tokio::spawn(Self::background_task(rx, Arc::clone(&shared), sinks));

		Self {
			tx,
			overflow_policy: config.queue_overflow_policy,
			shared,
			worker: Mutex::new(Some(worker)),
		}
	}

	/// Ingest one terminal delivery record.
	///
	/// Counters and the error window update before this returns; the record
	/// itself is queued for the history ring and the ledger sinks. Returns
	/// false when the drop-newest policy discarded the record, in which case
	/// it is still counted in the aggregates but absent from the ledger.
	pub fn record_delivery(&self, record: WebhookEventRecord) -> bool {
		self.shared.counters.record(record.kind, record.outcome);
		self.shared.window.record(record.is_failure());
		self.enqueue(TelemetryMessage::Delivery(record))
	}

	fn enqueue(&self, message: TelemetryMessage) -> bool {
		match self.overflow_policy {
			QueueOverflowPolicy::Block => {
				let tx = self.tx.clone();
				tokio::spawn(async move {
					let _ = tx.send(message).await;
				});
				true
			}
			QueueOverflowPolicy::DropNewest => {
				let queued = self.tx.try_send(message).is_ok();
				if !queued {
					self.shared.dropped_records.fetch_add(1, Ordering::Relaxed);
				}
				queued
			}
		}
	}

	/// Drain the queue and stop the worker.
	///
	/// Everything submitted before this call is processed; submissions that
	/// race with shutdown may be discarded. Safe to call more than once.
	pub async fn shutdown(&self) {
		let _ = self.tx.send(TelemetryMessage::Shutdown).await;
		let worker = self.worker.lock().await.take();
		if let Some(worker) = worker {
			if let Err(e) = worker.await {
				warn!(error = %e, "telemetry worker ended abnormally");
			}
		}
	}

	/// Records discarded by the drop-newest overflow policy so far.
	pub fn dropped_records(&self) -> u64 {
		self.shared.dropped_records.load(Ordering::Relaxed)
	}

	/// Point-in-time application metrics.
	pub async fn app_metrics(&self) -> AppMetrics {
		AppMetrics {
			installations_total: self.shared.registrations_total.load(Ordering::Relaxed),
			installations_active: self.shared.installations_active.load(Ordering::Relaxed),
			repositories_tracked: self.shared.repositories.read().await.len() as u64,
			events_processed: self.shared.counters.total(),
			events_failed: self.shared.counters.failed(),
			error_rate: self.shared.window.error_rate(),
			records_dropped: self.shared.dropped_records.load(Ordering::Relaxed),
			computed_at: Utc::now(),
		}
	}

	/// Delivery breakdown by kind and outcome, with the most recent
	/// failures from the history ring.
	pub async fn webhook_stats(&self) -> WebhookStats {
		let total = self.shared.counters.total();
		let failed = self.shared.counters.failed();
		let success_rate = if total == 0 {
			1.0
		} else {
			1.0 - failed as f64 / total as f64
		};

		let history = self.shared.history.read().await;
		let recent_failures = history
			.iter()
			.rev()
			.filter(|record| record.is_failure())
			.take(RECENT_FAILURES_LIMIT)
			.cloned()
			.collect();

		WebhookStats {
			by_kind: self.shared.counters.kind_snapshot(),
			by_outcome: self.shared.counters.outcome_snapshot(),
			success_rate,
			recent_failures,
			computed_at: Utc::now(),
		}
	}

	/// Newest-first slice of the event history ring, optionally filtered
	/// by kind. Records past the retention window are excluded even when
	/// the ring has not evicted them yet.
	pub async fn webhook_history(
		&self,
		kind: Option<EventKind>,
		limit: usize,
	) -> Vec<WebhookEventRecord> {
		let cutoff = Utc::now().checked_sub_signed(self.shared.history_retention);
		let history = self.shared.history.read().await;
		history
			.iter()
			.rev()
			.filter(|record| kind.map_or(true, |k| record.kind == k))
			.filter(|record| cutoff.map_or(true, |c| record.processed_at >= c))
			.take(limit)
			.cloned()
			.collect()
	}

	async fn background_task(
		mut rx: mpsc::Receiver<TelemetryMessage>,
		shared: Arc<HubShared>,
		sinks: Vec<Arc<dyn LedgerSink>>,
	) {
		while let Some(message) = rx.recv().await {
			match message {
				TelemetryMessage::Delivery(record) => {
					Self::remember(&shared, record.clone()).await;
					for sink in &sinks {
						if let Err(e) = sink.publish_event(&record).await {
							warn!(
								sink = sink.name(),
								error = %e,
								"ledger sink rejected event record"
							);
						}
					}
				}
				TelemetryMessage::Mutation { project, entry } => {
					shared.repositories.write().await.insert(project.clone());
					for sink in &sinks {
						if let Err(e) = sink.publish_mutation(&project, &entry).await {
							warn!(
								sink = sink.name(),
								error = %e,
								"ledger sink rejected audit entry"
							);
						}
					}
				}
				TelemetryMessage::Shutdown => break,
			}
		}
		debug!("telemetry worker stopped");
	}

	/// Append to the history ring, evicting by retention then by capacity.
	/// Arrival order matches processing order, so the front is always the
	/// oldest record.
	async fn remember(shared: &HubShared, record: WebhookEventRecord) {
		let cutoff = Utc::now().checked_sub_signed(shared.history_retention);
		let mut history = shared.history.write().await;
		history.push_back(record);
		if let Some(cutoff) = cutoff {
			while history
				.front()
				.is_some_and(|record| record.processed_at < cutoff)
			{
				history.pop_front();
			}
		}
		while history.len() > shared.history_capacity {
			history.pop_front();
		}
	}
}

impl DeliveryObserver for TelemetryHub {
	fn delivery_processed(&self, record: &WebhookEventRecord) {
		self.record_delivery(record.clone());
	}
}

impl ChangeObserver for TelemetryHub {
	fn change_applied(&self, project: &str, entry: &AuditEntry) {
		self.enqueue(TelemetryMessage::Mutation {
			project: project.to_string(),
			entry: entry.clone(),
		});
	}
}

impl RegistryObserver for TelemetryHub {
	/// Fold lifecycle events into the installation gauges.
	///
	/// The registry emits suspend and unsuspend without checking the prior
	/// status, so the active gauge is best-effort and clamped at zero.
	fn registry_event(&self, event: RegistryEvent) {
		match event {
			RegistryEvent::InstallationRegistered { created: true, .. } => {
				self.shared
					.registrations_total
					.fetch_add(1, Ordering::Relaxed);
				self.shared
					.installations_active
					.fetch_add(1, Ordering::Relaxed);
			}
			// A redelivered registration overwrote an existing record;
			// nothing new to count.
			RegistryEvent::InstallationRegistered { created: false, .. }
			| RegistryEvent::InstallationUpdated { .. }
			| RegistryEvent::SettingsUpdated { .. } => {}
			RegistryEvent::InstallationSuspended { .. }
			| RegistryEvent::InstallationDeregistered { .. } => {
				decrement_gauge(&self.shared.installations_active);
			}
			RegistryEvent::InstallationUnsuspended { .. } => {
				self.shared
					.installations_active
					.fetch_add(1, Ordering::Relaxed);
			}
		}
	}
}

fn decrement_gauge(gauge: &AtomicU64) {
	let _ = gauge.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
		Some(v.saturating_sub(1))
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::sync::atomic::AtomicUsize;
	use std::time::Duration;

	use async_trait::async_trait;
	use tokio::sync::Semaphore;

	use lattice_ingest_core::{DeliveryId, DeliveryOutcome, WebhookDelivery};
	use lattice_tenants_core::InstallationId;
	use lattice_trace_core::{Actor, AuditAction};

	use crate::error::LedgerSinkError;

	fn test_config() -> TelemetryConfig {
		TelemetryConfig {
			queue_capacity: 64,
			queue_overflow_policy: QueueOverflowPolicy::DropNewest,
			history_capacity: 16,
			history_retention: Duration::from_secs(24 * 60 * 60),
			error_window_minutes: 5,
			ledger_db_path: None,
		}
	}

	fn record(event: &str, outcome: DeliveryOutcome) -> WebhookEventRecord {
		let delivery = WebhookDelivery::new(
			DeliveryId::parse("d-hub-1").unwrap(),
			event,
			&b"{}"[..],
		);
		WebhookEventRecord::from_delivery(&delivery, outcome)
	}

	fn entry() -> AuditEntry {
		AuditEntry::new(
			Actor::Webhook {
				delivery_id: "d-hub-1".to_string(),
			},
			AuditAction::EntityUpserted,
			None,
		)
	}

	#[derive(Default)]
	struct TestSink {
		events: AtomicUsize,
		mutations: AtomicUsize,
	}

	#[async_trait]
	impl LedgerSink for TestSink {
		fn name(&self) -> &str {
			"test"
		}

		async fn publish_event(
			&self,
			_record: &WebhookEventRecord,
		) -> Result<(), LedgerSinkError> {
			self.events.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}

		async fn publish_mutation(
			&self,
			_project: &str,
			_entry: &AuditEntry,
		) -> Result<(), LedgerSinkError> {
			self.mutations.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	struct FailingSink;

	#[async_trait]
	impl LedgerSink for FailingSink {
		fn name(&self) -> &str {
			"failing"
		}

		async fn publish_event(
			&self,
			_record: &WebhookEventRecord,
		) -> Result<(), LedgerSinkError> {
			Err(LedgerSinkError::Transient("test error".to_string()))
		}

		async fn publish_mutation(
			&self,
			_project: &str,
			_entry: &AuditEntry,
		) -> Result<(), LedgerSinkError> {
			Err(LedgerSinkError::Transient("test error".to_string()))
		}
	}

	/// Blocks inside `publish_event` until the test releases the gate, and
	/// reports entry on a channel so the test knows the queue is empty.
	struct GatedSink {
		entered: mpsc::UnboundedSender<()>,
		gate: Arc<Semaphore>,
		published: AtomicUsize,
	}

	#[async_trait]
	impl LedgerSink for GatedSink {
		fn name(&self) -> &str {
			"gated"
		}

		async fn publish_event(
			&self,
			_record: &WebhookEventRecord,
		) -> Result<(), LedgerSinkError> {
			let _ = self.entered.send(());
			let permit = self.gate.acquire().await.unwrap();
			permit.forget();
			self.published.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}

		async fn publish_mutation(
			&self,
			_project: &str,
			_entry: &AuditEntry,
		) -> Result<(), LedgerSinkError> {
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_delivery_reaches_sink_and_history() {
		let sink = Arc::new(TestSink::default());
		let hub = TelemetryHub::new(test_config(), vec![sink.clone() as Arc<dyn LedgerSink>]);

		assert!(hub.record_delivery(record("ping", DeliveryOutcome::Accepted)));
		hub.shutdown().await;

		assert_eq!(sink.events.load(Ordering::SeqCst), 1);
		assert_eq!(hub.webhook_history(None, 10).await.len(), 1);
	}

	#[tokio::test]
	async fn test_mutation_reaches_sink_and_tracks_project() {
		let sink = Arc::new(TestSink::default());
		let hub = TelemetryHub::new(test_config(), vec![sink.clone() as Arc<dyn LedgerSink>]);

		hub.change_applied("acme-corp/device-firmware", &entry());
		hub.change_applied("acme-corp/device-firmware", &entry());
		hub.change_applied("acme-corp/ground-station", &entry());
		hub.shutdown().await;

		assert_eq!(sink.mutations.load(Ordering::SeqCst), 3);
		assert_eq!(hub.app_metrics().await.repositories_tracked, 2);
	}

	#[tokio::test]
	async fn test_fan_out_to_multiple_sinks() {
		let first = Arc::new(TestSink::default());
		let second = Arc::new(TestSink::default());
		let hub = TelemetryHub::new(
			test_config(),
			vec![
				first.clone() as Arc<dyn LedgerSink>,
				second.clone() as Arc<dyn LedgerSink>,
			],
		);

		hub.record_delivery(record("push", DeliveryOutcome::Accepted));
		hub.shutdown().await;

		assert_eq!(first.events.load(Ordering::SeqCst), 1);
		assert_eq!(second.events.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_failing_sink_does_not_block_others() {
		let good = Arc::new(TestSink::default());
		let hub = TelemetryHub::new(
			test_config(),
			vec![
				Arc::new(FailingSink) as Arc<dyn LedgerSink>,
				good.clone() as Arc<dyn LedgerSink>,
			],
		);

		hub.record_delivery(record("push", DeliveryOutcome::Accepted));
		hub.change_applied("acme-corp/device-firmware", &entry());
		hub.shutdown().await;

		assert_eq!(good.events.load(Ordering::SeqCst), 1);
		assert_eq!(good.mutations.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_shutdown_drains_backlog() {
		let sink = Arc::new(TestSink::default());
		let hub = TelemetryHub::new(test_config(), vec![sink.clone() as Arc<dyn LedgerSink>]);

		for _ in 0..20 {
			assert!(hub.record_delivery(record("push", DeliveryOutcome::Accepted)));
		}
		hub.shutdown().await;

		assert_eq!(sink.events.load(Ordering::SeqCst), 20);
	}

	#[tokio::test]
	async fn test_shutdown_is_idempotent() {
		let hub = TelemetryHub::new(test_config(), vec![]);
		hub.shutdown().await;
		hub.shutdown().await;
	}

	#[tokio::test]
	async fn test_drop_newest_counts_discarded_records() {
		let gate = Arc::new(Semaphore::new(0));
		let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
		let sink = Arc::new(GatedSink {
			entered: entered_tx,
			gate: gate.clone(),
			published: AtomicUsize::new(0),
		});

		let mut config = test_config();
		config.queue_capacity = 1;
		let hub = TelemetryHub::new(config, vec![sink.clone() as Arc<dyn LedgerSink>]);

		// First record: the worker dequeues it and parks inside the sink.
		assert!(hub.record_delivery(record("ping", DeliveryOutcome::Accepted)));
		entered_rx.recv().await.unwrap();

		// Second fills the single queue slot, third has nowhere to go.
		assert!(hub.record_delivery(record("ping", DeliveryOutcome::Accepted)));
		assert!(!hub.record_delivery(record("ping", DeliveryOutcome::Accepted)));
		assert_eq!(hub.dropped_records(), 1);

		gate.add_permits(2);
		hub.shutdown().await;

		assert_eq!(sink.published.load(Ordering::SeqCst), 2);
		let metrics = hub.app_metrics().await;
		assert_eq!(metrics.events_processed, 3);
		assert_eq!(metrics.records_dropped, 1);
		assert_eq!(hub.webhook_history(None, 10).await.len(), 2);
	}

	#[tokio::test]
	async fn test_block_policy_never_drops() {
		let sink = Arc::new(TestSink::default());
		let mut config = test_config();
		config.queue_capacity = 1;
		config.queue_overflow_policy = QueueOverflowPolicy::Block;
		let hub = TelemetryHub::new(config, vec![sink.clone() as Arc<dyn LedgerSink>]);

		for _ in 0..5 {
			assert!(hub.record_delivery(record("push", DeliveryOutcome::Accepted)));
		}

		// Block submissions run on spawned tasks; give them time to land
		// before the shutdown sentinel goes in.
		tokio::time::sleep(Duration::from_millis(50)).await;
		hub.shutdown().await;

		assert_eq!(sink.events.load(Ordering::SeqCst), 5);
		assert_eq!(hub.dropped_records(), 0);
	}

	#[tokio::test]
	async fn test_history_ring_evicts_oldest() {
		let mut config = test_config();
		config.history_capacity = 2;
		let hub = TelemetryHub::new(config, vec![]);

		hub.record_delivery(record("ping", DeliveryOutcome::Accepted));
		hub.record_delivery(record("push", DeliveryOutcome::Accepted));
		hub.record_delivery(record("installation", DeliveryOutcome::Accepted));
		hub.shutdown().await;

		let history = hub.webhook_history(None, 10).await;
		assert_eq!(history.len(), 2);
		assert_eq!(history[0].kind, EventKind::InstallationLifecycle);
		assert_eq!(history[1].kind, EventKind::ContentChange);
	}

	#[tokio::test]
	async fn test_history_filters_by_kind_and_limit() {
		let hub = TelemetryHub::new(test_config(), vec![]);

		hub.record_delivery(record("ping", DeliveryOutcome::Accepted));
		hub.record_delivery(record("push", DeliveryOutcome::Accepted));
		hub.record_delivery(record("push", DeliveryOutcome::Accepted));
		hub.shutdown().await;

		let pings = hub.webhook_history(Some(EventKind::Ping), 10).await;
		assert_eq!(pings.len(), 1);

		let limited = hub.webhook_history(None, 2).await;
		assert_eq!(limited.len(), 2);
	}

	#[tokio::test]
	async fn test_webhook_stats_breakdown() {
		let hub = TelemetryHub::new(test_config(), vec![]);

		hub.record_delivery(record("push", DeliveryOutcome::Accepted));
		hub.record_delivery(record("push", DeliveryOutcome::Accepted));
		hub.record_delivery(record("bogus", DeliveryOutcome::Rejected));
		hub.shutdown().await;

		let stats = hub.webhook_stats().await;
		assert_eq!(stats.by_outcome["accepted"], 2);
		assert_eq!(stats.by_outcome["rejected"], 1);
		assert_eq!(stats.by_kind["content_change"], 2);
		assert_eq!(stats.by_kind["unknown"], 1);
		assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
		assert_eq!(stats.recent_failures.len(), 1);
		assert_eq!(stats.recent_failures[0].outcome, DeliveryOutcome::Rejected);
	}

	#[tokio::test]
	async fn test_stats_on_idle_hub() {
		let hub = TelemetryHub::new(test_config(), vec![]);

		let stats = hub.webhook_stats().await;
		assert_eq!(stats.success_rate, 1.0);
		assert!(stats.recent_failures.is_empty());

		let metrics = hub.app_metrics().await;
		assert_eq!(metrics.events_processed, 0);
		assert_eq!(metrics.error_rate, 0.0);
		hub.shutdown().await;
	}

	#[tokio::test]
	async fn test_registry_events_fold_into_gauges() {
		let hub = TelemetryHub::new(test_config(), vec![]);

		hub.registry_event(RegistryEvent::InstallationRegistered {
			id: InstallationId(1),
			account: "acme-corp".to_string(),
			created: true,
		});
		hub.registry_event(RegistryEvent::InstallationRegistered {
			id: InstallationId(2),
			account: "globex".to_string(),
			created: true,
		});
		hub.registry_event(RegistryEvent::InstallationSuspended {
			id: InstallationId(1),
		});

		let metrics = hub.app_metrics().await;
		assert_eq!(metrics.installations_total, 2);
		assert_eq!(metrics.installations_active, 1);

		hub.registry_event(RegistryEvent::InstallationUnsuspended {
			id: InstallationId(1),
		});
		hub.registry_event(RegistryEvent::InstallationDeregistered {
			id: InstallationId(2),
		});
		// A redelivered registration overwrites; the gauges hold still.
		hub.registry_event(RegistryEvent::InstallationRegistered {
			id: InstallationId(2),
			account: "globex".to_string(),
			created: false,
		});

		let metrics = hub.app_metrics().await;
		assert_eq!(metrics.installations_total, 2);
		assert_eq!(metrics.installations_active, 1);
		hub.shutdown().await;
	}

	#[tokio::test]
	async fn test_active_gauge_clamps_at_zero() {
		let hub = TelemetryHub::new(test_config(), vec![]);

		hub.registry_event(RegistryEvent::InstallationDeregistered {
			id: InstallationId(9),
		});

		assert_eq!(hub.app_metrics().await.installations_active, 0);
		hub.shutdown().await;
	}

	#[tokio::test]
	async fn test_observer_trait_objects_dispatch() {
		let hub = Arc::new(TelemetryHub::new(test_config(), vec![]));

		let delivery_observer: Arc<dyn DeliveryObserver> = hub.clone();
		delivery_observer.delivery_processed(&record("ping", DeliveryOutcome::Accepted));

		let change_observer: Arc<dyn ChangeObserver> = hub.clone();
		change_observer.change_applied("acme-corp/device-firmware", &entry());

		hub.shutdown().await;

		let metrics = hub.app_metrics().await;
		assert_eq!(metrics.events_processed, 1);
		assert_eq!(metrics.repositories_tracked, 1);
	}
}
