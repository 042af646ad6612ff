// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Helpers for loading secrets from environment variables.
//!
//! Supports the container convention of `NAME_FILE` companions: when
//! `NAME` is unset but `NAME_FILE` points at a file, the secret is read from
//! that file with trailing whitespace trimmed.

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::SecretString;

/// Errors loading a secret from the environment.
#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("both {name} and {name}_FILE are set; remove one")]
	BothSet { name: String },

	#[error("failed to read secret file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("{name} contains invalid UTF-8")]
	InvalidUtf8 { name: String },
}

/// Error for secrets that must be present.
#[derive(Debug, Error)]
pub enum RequiredSecretError {
	#[error("required secret {name} is not set (set {name} or {name}_FILE)")]
	Missing { name: String },

	#[error(transparent)]
	Env(#[from] SecretEnvError),
}

/// Load an optional secret from `name`, falling back to `name_FILE`.
///
/// Returns `Ok(None)` when neither variable is set or both are empty.
pub fn load_secret_env(name: &str) -> Result<Option<SecretString>, SecretEnvError> {
	let direct = read_env(name)?;
	let file_var = format!("{name}_FILE");
	let file_path = read_env(&file_var)?;

	match (direct, file_path) {
		(Some(_), Some(_)) => Err(SecretEnvError::BothSet {
			name: name.to_string(),
		}),
		(Some(value), None) => Ok(Some(SecretString::new(value))),
		(None, Some(path)) => {
			let path = PathBuf::from(path);
			debug!(name, path = %path.display(), "loading secret from file");
			let contents =
				std::fs::read_to_string(&path).map_err(|source| SecretEnvError::FileRead {
					path: path.clone(),
					source,
				})?;
			let trimmed = contents.trim_end().to_string();
			if trimmed.is_empty() {
				Ok(None)
			} else {
				Ok(Some(SecretString::new(trimmed)))
			}
		}
		(None, None) => Ok(None),
	}
}

/// Load a secret that must be present.
pub fn require_secret_env(name: &str) -> Result<SecretString, RequiredSecretError> {
	load_secret_env(name)?.ok_or_else(|| RequiredSecretError::Missing {
		name: name.to_string(),
	})
}

fn read_env(name: &str) -> Result<Option<String>, SecretEnvError> {
	match std::env::var(name) {
		Ok(value) if value.is_empty() => Ok(None),
		Ok(value) => Ok(Some(value)),
		Err(std::env::VarError::NotPresent) => Ok(None),
		Err(std::env::VarError::NotUnicode(_)) => Err(SecretEnvError::InvalidUtf8 {
			name: name.to_string(),
		}),
	}
}
