// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed ledger sink.
//!
//! Keeps two append-only tables: `webhook_events` for processed delivery
//! records and `audit_log` for committed project mutations. The schema is
//! created on first connect, so a fresh database file needs no migration
//! step.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use lattice_ingest_core::WebhookEventRecord;
use lattice_trace_core::AuditEntry;

use crate::error::LedgerSinkError;
use crate::sink::LedgerSink;

const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS webhook_events (
		id TEXT PRIMARY KEY,
		delivery_id TEXT NOT NULL,
		event TEXT NOT NULL,
		kind TEXT NOT NULL,
		action TEXT,
		installation_id INTEGER,
		repository TEXT,
		outcome TEXT NOT NULL,
		reason TEXT,
		received_at TEXT NOT NULL,
		processed_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_webhook_events_processed_at
		ON webhook_events (processed_at)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS audit_log (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		project TEXT NOT NULL,
		at TEXT NOT NULL,
		actor TEXT NOT NULL,
		action TEXT NOT NULL,
		entity TEXT,
		before_state TEXT,
		after_state TEXT
	)
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_audit_log_project
		ON audit_log (project)
	"#,
];

/// Ledger sink writing to a local SQLite database.
pub struct SqliteLedgerSink {
	pool: SqlitePool,
	name: String,
}

impl SqliteLedgerSink {
	/// Open (or create) the ledger database at `path` and ensure the schema.
	pub async fn connect(path: impl AsRef<Path>) -> Result<Self, LedgerSinkError> {
		let options = SqliteConnectOptions::new()
			.filename(path.as_ref())
			.create_if_missing(true);
		let pool = SqlitePoolOptions::new()
			.connect_with(options)
			.await
			.map_err(sink_error)?;
		Self::with_pool(pool).await
	}

	/// Wrap an existing pool, creating the ledger tables if missing.
	pub async fn with_pool(pool: SqlitePool) -> Result<Self, LedgerSinkError> {
		for statement in SCHEMA {
			sqlx::query(statement)
				.execute(&pool)
				.await
				.map_err(sink_error)?;
		}
		Ok(Self {
			pool,
			name: "sqlite".to_string(),
		})
	}
}

#[async_trait]
impl LedgerSink for SqliteLedgerSink {
	fn name(&self) -> &str {
		&self.name
	}

	async fn publish_event(&self, record: &WebhookEventRecord) -> Result<(), LedgerSinkError> {
		sqlx::query(
			r#"
			INSERT INTO webhook_events (
				id, delivery_id, event, kind, action, installation_id,
				repository, outcome, reason, received_at, processed_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(record.id.to_string())
		.bind(record.delivery_id.as_str())
		.bind(&record.event)
		.bind(record.kind.as_str())
		.bind(&record.action)
		.bind(record.installation_id.map(|id| id.0))
		.bind(record.repository.as_ref().map(|repo| repo.as_str().to_string()))
		.bind(record.outcome.as_str())
		.bind(&record.reason)
		.bind(record.received_at.to_rfc3339())
		.bind(record.processed_at.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(sink_error)?;

		Ok(())
	}

	async fn publish_mutation(
		&self,
		project: &str,
		entry: &AuditEntry,
	) -> Result<(), LedgerSinkError> {
		sqlx::query(
			r#"
			INSERT INTO audit_log (
				project, at, actor, action, entity, before_state, after_state
			)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(project)
		.bind(entry.at.to_rfc3339())
		.bind(entry.actor.to_string())
		.bind(entry.action.as_str())
		.bind(entry.entity.as_ref().map(|id| id.as_str().to_string()))
		.bind(&entry.before)
		.bind(&entry.after)
		.execute(&self.pool)
		.await
		.map_err(sink_error)?;

		Ok(())
	}

	async fn health_check(&self) -> Result<(), LedgerSinkError> {
		sqlx::query("SELECT 1")
			.execute(&self.pool)
			.await
			.map_err(|e| LedgerSinkError::Transient(format!("health check failed: {e}")))?;
		Ok(())
	}
}

fn sink_error(e: sqlx::Error) -> LedgerSinkError {
	if is_transient_error(&e) {
		LedgerSinkError::Transient(format!("database error: {e}"))
	} else {
		LedgerSinkError::Permanent(format!("database error: {e}"))
	}
}

/// Classify a sqlx error. Lock contention and connection trouble are worth
/// retrying; constraint violations and schema problems are not.
fn is_transient_error(e: &sqlx::Error) -> bool {
	match e {
		sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
		sqlx::Error::Database(db_err) => {
			let message = db_err.message().to_lowercase();
			message.contains("busy") || message.contains("locked") || message.contains("timeout")
		}
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use lattice_ingest_core::{DeliveryId, DeliveryOutcome, WebhookDelivery, WebhookEventRecord};
	use lattice_tenants_core::{InstallationId, RepoKey};
	use lattice_trace_core::{Actor, AuditAction, AuditEntry, EntityId};

	fn sample_record() -> WebhookEventRecord {
		let delivery = WebhookDelivery::new(
			DeliveryId::parse("d-ledger-1").unwrap(),
			"push",
			&b"{}"[..],
		);
		WebhookEventRecord::from_delivery(&delivery, DeliveryOutcome::Accepted)
			.with_installation(InstallationId(42))
			.with_repository(RepoKey::new("acme-corp", "device-firmware"))
	}

	async fn open_sink() -> (tempfile::TempDir, SqliteLedgerSink) {
		let dir = tempfile::tempdir().unwrap();
		let sink = SqliteLedgerSink::connect(dir.path().join("ledger.db"))
			.await
			.unwrap();
		(dir, sink)
	}

	#[tokio::test]
	async fn test_event_round_trip() {
		let (_dir, sink) = open_sink().await;
		let record = sample_record();
		sink.publish_event(&record).await.unwrap();

		let (delivery_id, kind, outcome, installation_id): (String, String, String, i64) =
			sqlx::query_as(
				"SELECT delivery_id, kind, outcome, installation_id FROM webhook_events",
			)
			.fetch_one(&sink.pool)
			.await
			.unwrap();

		assert_eq!(delivery_id, "d-ledger-1");
		assert_eq!(kind, "content_change");
		assert_eq!(outcome, "accepted");
		assert_eq!(installation_id, 42);
	}

	#[tokio::test]
	async fn test_mutation_round_trip() {
		let (_dir, sink) = open_sink().await;
		let entry = AuditEntry::new(
			Actor::Webhook {
				delivery_id: "d-ledger-2".to_string(),
			},
			AuditAction::EntityUpserted,
			Some(EntityId::parse("REQ-001").unwrap()),
		)
		.with_after("Approved");
		sink.publish_mutation("acme-corp/device-firmware", &entry)
			.await
			.unwrap();

		let (project, actor, action, entity, after): (
			String,
			String,
			String,
			String,
			String,
		) = sqlx::query_as(
			"SELECT project, actor, action, entity, after_state FROM audit_log",
		)
		.fetch_one(&sink.pool)
		.await
		.unwrap();

		assert_eq!(project, "acme-corp/device-firmware");
		assert_eq!(actor, "webhook:d-ledger-2");
		assert_eq!(action, "entity_upserted");
		assert_eq!(entity, "REQ-001");
		assert_eq!(after, "Approved");
	}

	#[tokio::test]
	async fn test_duplicate_record_id_is_permanent() {
		let (_dir, sink) = open_sink().await;
		let record = sample_record();
		sink.publish_event(&record).await.unwrap();

		let err = sink.publish_event(&record).await.unwrap_err();
		assert!(matches!(err, LedgerSinkError::Permanent(_)), "{err}");
	}

	#[tokio::test]
	async fn test_reopen_preserves_rows() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("ledger.db");

		let sink = SqliteLedgerSink::connect(&path).await.unwrap();
		sink.publish_event(&sample_record()).await.unwrap();
		sink.pool.close().await;
		drop(sink);

		let reopened = SqliteLedgerSink::connect(&path).await.unwrap();
		let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM webhook_events")
			.fetch_one(&reopened.pool)
			.await
			.unwrap();
		assert_eq!(count, 1);
	}

	#[tokio::test]
	async fn test_health_check_on_open_pool() {
		let (_dir, sink) = open_sink().await;
		sink.health_check().await.unwrap();
	}

	#[test]
	fn test_transient_classification() {
		assert!(is_transient_error(&sqlx::Error::PoolTimedOut));
		assert!(is_transient_error(&sqlx::Error::PoolClosed));
		assert!(!is_transient_error(&sqlx::Error::RowNotFound));
	}
}
