// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ledger sink abstraction.
//!
//! Sinks receive the processed-event records and committed project
//! mutations the hub's worker drains from its queue. Publishing is
//! best-effort: the hub logs a failed publish and carries on, so one broken
//! sink cannot stall ingestion or starve the other sinks.

use async_trait::async_trait;

use lattice_ingest_core::WebhookEventRecord;
use lattice_trace_core::AuditEntry;

use crate::error::LedgerSinkError;

pub mod sqlite;

/// A durable destination for the event ledger.
#[async_trait]
pub trait LedgerSink: Send + Sync {
	/// Unique name for this sink, used in logs.
	fn name(&self) -> &str;

	/// Persist one processed delivery record.
	async fn publish_event(&self, record: &WebhookEventRecord) -> Result<(), LedgerSinkError>;

	/// Persist one committed project mutation.
	async fn publish_mutation(
		&self,
		project: &str,
		entry: &AuditEntry,
	) -> Result<(), LedgerSinkError>;

	/// Check sink health. Default implementation always reports healthy.
	async fn health_check(&self) -> Result<(), LedgerSinkError> {
		Ok(())
	}
}
