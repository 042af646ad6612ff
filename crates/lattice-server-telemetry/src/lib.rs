// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery aggregation and the durable event ledger.
//!
//! The [`TelemetryHub`] sits behind the observer seams of the other server
//! crates: the ingest gateway reports every processed delivery, the trace
//! store reports every committed mutation, and the tenant registry reports
//! installation lifecycle events. The hub folds them into lock-free
//! counters, a rolling error window, and a bounded in-memory history ring,
//! and fans the durable parts out to [`LedgerSink`]s from a background
//! worker.

pub mod error;
pub mod hub;
pub mod metrics;
pub mod sink;

pub use error::LedgerSinkError;
pub use hub::TelemetryHub;
pub use metrics::{AppMetrics, RollingErrorWindow, WebhookStats};
pub use sink::sqlite::SqliteLedgerSink;
pub use sink::LedgerSink;

// Configuration types used to build a hub live in the config crate.
pub use lattice_server_config::{QueueOverflowPolicy, TelemetryConfig};
