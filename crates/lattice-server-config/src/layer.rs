// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	IngestConfigLayer, LoggingConfigLayer, SyncConfigLayer, TelemetryConfigLayer,
};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatticeConfigLayer {
	#[serde(default)]
	pub ingest: Option<IngestConfigLayer>,
	#[serde(default)]
	pub telemetry: Option<TelemetryConfigLayer>,
	#[serde(default)]
	pub sync: Option<SyncConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl LatticeConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: LatticeConfigLayer) {
		merge_option(&mut self.ingest, other.ingest, IngestConfigLayer::merge);
		merge_option(
			&mut self.telemetry,
			other.telemetry,
			TelemetryConfigLayer::merge,
		);
		merge_option(&mut self.sync, other.sync, SyncConfigLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}
