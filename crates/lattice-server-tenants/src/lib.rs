// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant registry service for Lattice.
//!
//! Holds every installation this deployment serves together with its
//! settings, keyed by installation id. Webhook handlers drive installation
//! lifecycle; the settings API drives plan and capability changes; both kinds
//! of mutation are reported to a [`lattice_tenants_core::RegistryObserver`]
//! after they commit.

pub mod registry;

pub use registry::{Registration, TenantRecord, TenantRegistry};
