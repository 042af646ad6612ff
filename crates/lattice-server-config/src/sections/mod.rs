// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for the Lattice server.

pub mod ingest;
pub mod logging;
pub mod sync;
pub mod telemetry;

pub use ingest::{IngestConfig, IngestConfigLayer};
pub use logging::{init_tracing, LogFormat, LoggingConfig, LoggingConfigLayer};
pub use sync::{RetryConfigLayer, SyncConfig, SyncConfigLayer};
pub use telemetry::{QueueOverflowPolicy, TelemetryConfig, TelemetryConfigLayer};
