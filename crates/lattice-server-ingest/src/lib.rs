// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Webhook ingestion pipeline for Lattice.
//!
//! # Overview
//!
//! The [`IngestGateway`] is the single entry point: the transport layer hands
//! it a `WebhookDelivery` and always gets a terminal `WebhookEventRecord`
//! back. Inside, the stages are fixed and ordered:
//!
//! 1. size gate, then signature verification ([`verify_delivery`]) against
//!    the [`SecretResolver`]'s secret for the installation
//! 2. deduplication by delivery id ([`DeliveryDeduper`]) over a bounded
//!    retention window
//! 3. dispatch ([`EventRouter`]) to the handler for the event's routing class
//!
//! Verification precedes deduplication so forged deliveries can never occupy
//! a delivery id. Handlers tolerate out-of-order lifecycle events; content
//! changes gate hard on registration, entitlement, and repository scope.

pub mod dedupe;
pub mod gateway;
pub mod router;
pub mod verify;

pub use dedupe::{DedupeDecision, DeliveryDeduper};
pub use gateway::{IngestGateway, DEFAULT_MAX_PAYLOAD_BYTES};
pub use router::{EventRouter, RouteOutcome};
pub use verify::{verify_delivery, SecretResolver};
