// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Traceability project store and upstream synchronizer for Lattice.
//!
//! [`TraceStore`] keeps one immutable [`lattice_trace_core::ProjectData`]
//! snapshot per repository; readers clone an `Arc` and never block writers.
//! [`ProjectSynchronizer`] is the writer facade: single changesets from
//! webhook and API paths, plus full reconciliation passes that pull record
//! manifests from the hosting platform through an [`UpstreamClient`].

pub mod error;
pub mod store;
pub mod sync;
pub mod upstream;

pub use error::{Result, SyncError, UpstreamError};
pub use store::{ProjectExport, RecordFailure, SyncBatchReport, TraceStore};
pub use sync::{ProjectSynchronizer, SyncReport};
pub use upstream::{HttpUpstreamClient, RecordRef, RemoteRecord, UpstreamClient};
