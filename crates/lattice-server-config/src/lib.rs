// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the Lattice server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`LATTICE_SERVER_*`)
//!
//! Secrets (the webhook secret, the upstream API token) never pass through
//! the layer system. They are read from the environment during finalization
//! and carried as [`lattice_common_secret::SecretString`].
//!
//! # Usage
//!
//! ```ignore
//! use lattice_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("dedupe shards: {}", config.ingest.dedupe_shards);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::LatticeConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use lattice_common_secret::load_secret_env;
use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct LatticeConfig {
	pub ingest: IngestConfig,
	pub telemetry: TelemetryConfig,
	pub sync: SyncConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`LATTICE_SERVER_*`)
/// 2. Config file (`/etc/lattice/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<LatticeConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	];

	sources.sort_by_key(|s| s.precedence());

	let mut merged = LatticeConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<LatticeConfig, ConfigError> {
	let mut merged = LatticeConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<LatticeConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	];

	sources.sort_by_key(|s| s.precedence());

	let mut merged = LatticeConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: LatticeConfigLayer) -> Result<LatticeConfig, ConfigError> {
	let webhook_secret = load_secret_env("LATTICE_SERVER_WEBHOOK_SECRET")
		.map_err(|e| ConfigError::Secret(e.to_string()))?;
	let ingest = layer.ingest.unwrap_or_default().finalize(webhook_secret);

	let telemetry = layer.telemetry.unwrap_or_default().finalize();

	let upstream_token = load_secret_env("LATTICE_SERVER_SYNC_UPSTREAM_TOKEN")
		.map_err(|e| ConfigError::Secret(e.to_string()))?;
	let sync = layer.sync.unwrap_or_default().finalize(upstream_token);

	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&ingest, &telemetry)?;

	info!(
		max_payload_bytes = ingest.max_payload_bytes,
		dedupe_shards = ingest.dedupe_shards,
		webhook_secret_configured = ingest.webhook_secret.is_some(),
		telemetry_queue_capacity = telemetry.queue_capacity,
		ledger_configured = telemetry.ledger_db_path.is_some(),
		upstream = %sync.upstream_base_url,
		max_concurrent_fetches = sync.max_concurrent_fetches,
		"Server configuration loaded"
	);

	Ok(LatticeConfig {
		ingest,
		telemetry,
		sync,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(ingest: &IngestConfig, telemetry: &TelemetryConfig) -> Result<(), ConfigError> {
	if ingest.max_payload_bytes == 0 {
		return Err(ConfigError::Validation(
			"LATTICE_SERVER_INGEST_MAX_PAYLOAD_BYTES must be at least 1".to_string(),
		));
	}

	if ingest.dedupe_shards == 0 {
		return Err(ConfigError::Validation(
			"LATTICE_SERVER_INGEST_DEDUPE_SHARDS must be at least 1".to_string(),
		));
	}

	if telemetry.queue_capacity == 0 {
		return Err(ConfigError::Validation(
			"LATTICE_SERVER_TELEMETRY_QUEUE_CAPACITY must be at least 1".to_string(),
		));
	}

	Ok(())
}
