// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret wrapper that prevents accidental logging of sensitive values.
//!
//! [`Secret<T>`] shields webhook secrets, API tokens and similar values from
//! `Debug`/`Display` output and zeroizes the inner value on drop. Access to
//! the wrapped value is always explicit via [`Secret::expose`].
//!
//! # Example
//!
//! ```
//! use lattice_common_secret::SecretString;
//!
//! let secret = SecretString::new("hunter2".to_string());
//! assert_eq!(format!("{:?}", secret), "[REDACTED]");
//! assert_eq!(secret.expose(), "hunter2");
//! ```

pub mod env;

pub use env::{load_secret_env, require_secret_env, RequiredSecretError, SecretEnvError};

use std::fmt;

use zeroize::Zeroize;

/// Placeholder emitted wherever a secret would otherwise appear in output.
pub const REDACTED: &str = "[REDACTED]";

/// A value that must never appear in logs, traces, or serialized debug dumps.
///
/// The inner value is zeroized when the wrapper is dropped. Serde support
/// (behind the `serde` feature) is transparent so secrets can participate in
/// configuration layers; serialization sites are responsible for where that
/// output lands.
pub struct Secret<T: Zeroize>(T);

/// The common case: a secret backed by a `String`.
pub type SecretString = Secret<String>;

impl<T: Zeroize> Secret<T> {
	/// Wrap a sensitive value.
	pub fn new(value: T) -> Self {
		Self(value)
	}

	/// Access the wrapped value.
	///
	/// Call sites name the exposure on purpose so secret use is greppable.
	pub fn expose(&self) -> &T {
		&self.0
	}
}

impl<T: Zeroize> Drop for Secret<T> {
	fn drop(&mut self) {
		self.0.zeroize();
	}
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<T: Zeroize + Default> Default for Secret<T> {
	fn default() -> Self {
		Self(T::default())
	}
}

impl<T: Zeroize + PartialEq> PartialEq for Secret<T> {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl<T: Zeroize + Eq> Eq for Secret<T> {}

impl<T: Zeroize> fmt::Debug for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T: Zeroize> fmt::Display for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

#[cfg(feature = "serde")]
impl<T: Zeroize + serde::Serialize> serde::Serialize for Secret<T> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		self.0.serialize(serializer)
	}
}

#[cfg(feature = "serde")]
impl<'de, T: Zeroize + serde::Deserialize<'de>> serde::Deserialize<'de> for Secret<T> {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		T::deserialize(deserializer).map(Secret::new)
	}
}
