// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Webhook ingestion domain types for Lattice.
//!
//! # Overview
//!
//! The transport layer builds a [`WebhookDelivery`] from the raw request:
//! delivery id, event name, claimed signature, and the exact body bytes.
//! [`EventKind::classify`] maps the event name onto a closed routing class;
//! everything the router does not recognize is [`EventKind::Unknown`] and is
//! recorded without being dispatched. Processing always terminates in a
//! [`DeliveryOutcome`], captured on an immutable [`WebhookEventRecord`].
//!
//! Verification, deduplication, and routing live in `lattice-server-ingest`;
//! this crate is the shared vocabulary.

pub mod delivery;
pub mod error;
pub mod observer;
pub mod payload;

pub use delivery::{
	DeliveryId, DeliveryOutcome, EventKind, WebhookDelivery, WebhookEventRecord,
};
pub use error::{IngestError, Result};
pub use observer::{DeliveryObserver, NoopDeliveryObserver};
pub use payload::{
	parse_payload, AccountPayload, ChangedRecordPayload, ContentChangePayload, InstallationAction,
	InstallationEventPayload, InstallationPayload, InstallationRefPayload, RepositoriesAction,
	RepositoriesEventPayload, RepositoryEventPayload, RepositoryPayload,
};
