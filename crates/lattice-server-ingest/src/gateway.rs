// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery pipeline: the single entry point for inbound webhooks.
//!
//! Stage order is fixed: size gate, signature verification, deduplication,
//! dispatch. Verification runs before the dedupe store is touched, so a
//! forged delivery can never occupy a delivery id and shadow the legitimate
//! redelivery that follows. Every path terminates in a
//! [`WebhookEventRecord`] handed to the observer exactly once; the transport
//! layer can acknowledge upstream no matter what happened inside.

use std::sync::Arc;
use tracing::{debug, info, warn};

use lattice_ingest_core::{
	DeliveryObserver, DeliveryOutcome, EventKind, NoopDeliveryObserver, WebhookDelivery,
	WebhookEventRecord,
};

use crate::dedupe::{DedupeDecision, DeliveryDeduper};
use crate::router::EventRouter;
use crate::verify::{verify_delivery, SecretResolver};

/// Payload cap applied before any other work, including the HMAC.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Verified, deduplicated, routed webhook processing.
pub struct IngestGateway {
	resolver: SecretResolver,
	deduper: Arc<DeliveryDeduper>,
	router: EventRouter,
	observer: Arc<dyn DeliveryObserver>,
	max_payload_bytes: usize,
}

impl IngestGateway {
	pub fn new(
		resolver: SecretResolver,
		deduper: Arc<DeliveryDeduper>,
		router: EventRouter,
	) -> Self {
		Self {
			resolver,
			deduper,
			router,
			observer: Arc::new(NoopDeliveryObserver),
			max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
		}
	}

	pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
		self.observer = observer;
		self
	}

	pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
		self.max_payload_bytes = max_payload_bytes;
		self
	}

	/// Process one delivery to its terminal record.
	///
	/// Infallible by contract: every failure mode folds into the record's
	/// outcome. The observer sees exactly one record per delivery, rejects
	/// and duplicates included.
	pub async fn process_delivery(&self, delivery: WebhookDelivery) -> WebhookEventRecord {
		let record = self.process_inner(&delivery).await;
		self.observer.delivery_processed(&record);
		record
	}

	async fn process_inner(&self, delivery: &WebhookDelivery) -> WebhookEventRecord {
		if delivery.body.len() > self.max_payload_bytes {
			warn!(
				delivery = %delivery.delivery_id,
				size = delivery.body.len(),
				limit = self.max_payload_bytes,
				"rejecting oversized payload"
			);
			return WebhookEventRecord::from_delivery(delivery, DeliveryOutcome::Rejected)
				.with_reason(format!(
					"payload of {} bytes exceeds the {} byte limit",
					delivery.body.len(),
					self.max_payload_bytes
				));
		}

		if let Err(err) = verify_delivery(&self.resolver, delivery) {
			warn!(delivery = %delivery.delivery_id, error = %err, "rejecting unauthenticated delivery");
			return WebhookEventRecord::from_delivery(delivery, DeliveryOutcome::Rejected)
				.with_reason(err.reason());
		}

		if self.deduper.check_and_record(&delivery.delivery_id) == DedupeDecision::Duplicate {
			debug!(delivery = %delivery.delivery_id, "dropping duplicate delivery");
			return WebhookEventRecord::from_delivery(delivery, DeliveryOutcome::Duplicate);
		}

		match delivery.kind() {
			EventKind::Ping => {
				debug!(delivery = %delivery.delivery_id, "ping acknowledged");
				WebhookEventRecord::from_delivery(delivery, DeliveryOutcome::Accepted)
			}
			EventKind::Unknown => {
				info!(
					delivery = %delivery.delivery_id,
					event = %delivery.event,
					"recording unrecognized event without dispatch"
				);
				WebhookEventRecord::from_delivery(delivery, DeliveryOutcome::Accepted)
					.with_reason("unrecognized event type; not dispatched")
			}
			_ => match self.router.route(delivery).await {
				Ok(outcome) => {
					let mut record =
						WebhookEventRecord::from_delivery(delivery, DeliveryOutcome::Accepted);
					if let Some(action) = outcome.action {
						record = record.with_action(action);
					}
					if let Some(installation) = outcome.installation {
						record = record.with_installation(installation);
					}
					if let Some(repository) = outcome.repository {
						record = record.with_repository(repository);
					}
					record
				}
				Err(err) => {
					warn!(
						delivery = %delivery.delivery_id,
						event = %delivery.event,
						error = %err,
						"delivery failed during dispatch"
					);
					WebhookEventRecord::from_delivery(delivery, DeliveryOutcome::Failed)
						.with_reason(err.reason())
				}
			},
		}
	}
}
