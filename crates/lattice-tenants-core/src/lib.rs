// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core tenant types for the Lattice ingestion engine.
//!
//! This crate provides the shared installation and settings model used by the
//! tenant registry (`lattice-server-tenants`) and the ingestion gateway
//! (`lattice-server-ingest`).
//!
//! # Overview
//!
//! The tenancy model supports:
//! - Numeric installation identities assigned by the hosting platform
//! - All-or-selected repository scoping per installation
//! - Ordered subscription plans with closed-enum capability entitlements
//! - Soft deletion: deregistered installations become tombstones
//!
//! # Example
//!
//! ```
//! use lattice_tenants_core::{
//!     AccountRef, Capability, Installation, InstallationId, SettingsPatch,
//!     SubscriptionPlan, TenantSettings,
//! };
//!
//! let installation = Installation::new(
//!     InstallationId(12345),
//!     AccountRef::organization("acme-corp"),
//! );
//! assert!(installation.is_active());
//!
//! let mut settings = TenantSettings::defaults_for(SubscriptionPlan::Team);
//! settings.apply(SettingsPatch::enable(Capability::RiskManagement)).unwrap();
//! assert!(settings.has_feature(Capability::RiskManagement));
//! ```

pub mod error;
pub mod installation;
pub mod observer;
pub mod settings;

pub use error::{Result, TenantsError};
pub use installation::{
	AccountRef, AccountType, Installation, InstallationId, InstallationStatus, PermissionLevel,
	RepoKey, RepositorySelection,
};
pub use observer::{NoopRegistryObserver, RegistryEvent, RegistryObserver};
pub use settings::{AuditLevel, Capability, SettingsPatch, SubscriptionPlan, TenantSettings};
