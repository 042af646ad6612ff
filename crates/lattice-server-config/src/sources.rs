// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::LatticeConfigLayer;
use crate::sections::{
	IngestConfigLayer, LogFormat, LoggingConfigLayer, QueueOverflowPolicy, RetryConfigLayer,
	SyncConfigLayer, TelemetryConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<LatticeConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<LatticeConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(LatticeConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/lattice/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<LatticeConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(LatticeConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: LatticeConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: LATTICE_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<LatticeConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(LatticeConfigLayer {
			ingest: Some(load_ingest_from_env()?),
			telemetry: Some(load_telemetry_from_env()?),
			sync: Some(load_sync_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid usize value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_ingest_from_env() -> Result<IngestConfigLayer, ConfigError> {
	Ok(IngestConfigLayer {
		max_payload_bytes: env_usize("LATTICE_SERVER_INGEST_MAX_PAYLOAD_BYTES")?,
		dedupe_retention_secs: env_u64("LATTICE_SERVER_INGEST_DEDUPE_RETENTION_SECS")?,
		dedupe_shards: env_usize("LATTICE_SERVER_INGEST_DEDUPE_SHARDS")?,
	})
}

fn load_telemetry_from_env() -> Result<TelemetryConfigLayer, ConfigError> {
	let queue_overflow_policy = env_var("LATTICE_SERVER_TELEMETRY_QUEUE_OVERFLOW_POLICY").map(|v| {
		match v.to_lowercase().as_str() {
			"block" => QueueOverflowPolicy::Block,
			_ => QueueOverflowPolicy::DropNewest,
		}
	});

	Ok(TelemetryConfigLayer {
		queue_capacity: env_usize("LATTICE_SERVER_TELEMETRY_QUEUE_CAPACITY")?,
		queue_overflow_policy,
		history_capacity: env_usize("LATTICE_SERVER_TELEMETRY_HISTORY_CAPACITY")?,
		history_retention_secs: env_u64("LATTICE_SERVER_TELEMETRY_HISTORY_RETENTION_SECS")?,
		error_window_minutes: env_usize("LATTICE_SERVER_TELEMETRY_ERROR_WINDOW_MINUTES")?,
		ledger_db_path: env_var("LATTICE_SERVER_TELEMETRY_LEDGER_DB_PATH").map(PathBuf::from),
	})
}

fn load_sync_from_env() -> Result<SyncConfigLayer, ConfigError> {
	let retry = RetryConfigLayer {
		max_attempts: env_u32("LATTICE_SERVER_SYNC_RETRY_MAX_ATTEMPTS")?,
		base_delay_ms: env_u64("LATTICE_SERVER_SYNC_RETRY_BASE_DELAY_MS")?,
		max_delay_ms: env_u64("LATTICE_SERVER_SYNC_RETRY_MAX_DELAY_MS")?,
	};

	Ok(SyncConfigLayer {
		upstream_base_url: env_var("LATTICE_SERVER_SYNC_UPSTREAM_BASE_URL"),
		max_concurrent_fetches: env_usize("LATTICE_SERVER_SYNC_MAX_CONCURRENT_FETCHES")?,
		retry: Some(retry),
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = env_var("LATTICE_SERVER_LOG_FORMAT").map(|v| match v.to_lowercase().as_str() {
		"json" => LogFormat::Json,
		_ => LogFormat::Pretty,
	});

	Ok(LoggingConfigLayer {
		level: env_var("LATTICE_SERVER_LOG_LEVEL"),
		format,
	})
}
