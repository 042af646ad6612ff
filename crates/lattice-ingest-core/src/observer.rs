// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Observer seam for processed deliveries.
//!
//! The ingest gateway reports every terminal [`WebhookEventRecord`] here,
//! including rejects and duplicates. Implementations must hand off and return;
//! a slow observer must never stall delivery acknowledgment.

use crate::delivery::WebhookEventRecord;

/// Receives the terminal record of every processed delivery.
///
/// Must not block: the gateway calls this on the request path.
pub trait DeliveryObserver: Send + Sync {
	fn delivery_processed(&self, record: &WebhookEventRecord);
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDeliveryObserver;

impl DeliveryObserver for NoopDeliveryObserver {
	fn delivery_processed(&self, _record: &WebhookEventRecord) {}
}
