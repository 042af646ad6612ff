// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core traceability domain for Lattice.
//!
//! # Overview
//!
//! Each repository owns one [`ProjectData`]: requirements, test cases, risks,
//! and configuration items, plus the mirrored [`LinkGraph`] connecting them,
//! an append-only audit log, and rollup [`ProjectMetrics`]. Mutations are
//! expressed as [`Change`] values so webhook handlers, API callers, and the
//! repository synchronizer all share one validation and audit pipeline.
//!
//! This crate is purely in-memory domain logic. Storage, locking, and
//! synchronization live in `lattice-server-trace`.
//!
//! # Example
//!
//! ```
//! use lattice_trace_core::{Actor, Change, EntityId, ProjectData, TraceEntity};
//!
//! let actor = Actor::Api { user: "jane".to_string() };
//! let mut project = ProjectData::new("acme-corp/device-firmware");
//!
//! let req = EntityId::parse("REQ-001")?;
//! let tc = EntityId::parse("TC-001")?;
//! project.upsert_entity(TraceEntity::new(req.clone(), "pump stops on occlusion", actor.clone()), &actor)?;
//! project.upsert_entity(TraceEntity::new(tc.clone(), "occlusion alarm test", actor.clone()), &actor)?;
//! project.link(&req, &tc, &actor)?;
//!
//! assert_eq!(project.neighbors(&tc, None)?, vec![req]);
//! # Ok::<(), lattice_trace_core::TraceError>(())
//! ```

pub mod change;
pub mod entity;
pub mod error;
pub mod graph;
pub mod project;

pub use change::{
	AuditAction, AuditEntry, Change, ChangeObserver, NoopChangeObserver, RollupPolicy,
};
pub use entity::{
	Actor, ConfigItemStatus, EntityId, EntityKind, EntityStatus, RequirementStatus, RiskStatus,
	TestCaseStatus, TraceEntity, MAX_DESCRIPTION_LEN,
};
pub use error::{Result, TraceError};
pub use graph::{LinkGraph, LinkSet};
pub use project::{ProjectData, ProjectMetrics};
