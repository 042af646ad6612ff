// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared HMAC-SHA256 webhook signature utilities.
//!
//! Hosting platforms sign webhook deliveries with an HMAC-SHA256 digest of the
//! raw request body, sent as `sha256=<hex>` in a signature header. This crate
//! provides the digest primitives plus header-level verification that fails
//! closed on any malformed input.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header prefix the hosting platform uses for SHA-256 signatures.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Signature verification failure.
///
/// Deliberately carries no detail about which byte mismatched; callers treat
/// every variant as an authentication failure and fail closed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
	#[error("missing signature header")]
	MissingSignature,

	#[error("no webhook secret available")]
	MissingSecret,

	#[error("invalid signature format: missing 'sha256=' prefix")]
	MissingPrefix,

	#[error("signature verification failed")]
	Mismatch,
}

/// Compute an HMAC-SHA256 signature for a payload.
///
/// Returns the hex-encoded signature without any prefix.
pub fn compute_hmac_sha256(secret: &[u8], payload: &[u8]) -> String {
	let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
	mac.update(payload);
	let result = mac.finalize();
	hex::encode(result.into_bytes())
}

/// Verify an HMAC-SHA256 signature for a payload.
///
/// The `signature` should be the raw hex-encoded signature (no prefix).
/// Comparison is constant-time via `Mac::verify_slice`.
pub fn verify_hmac_sha256(secret: &[u8], payload: &[u8], signature: &str) -> bool {
	let expected_bytes = match hex::decode(signature) {
		Ok(bytes) => bytes,
		Err(_) => return false,
	};

	let mut mac = match HmacSha256::new_from_slice(secret) {
		Ok(m) => m,
		Err(_) => return false,
	};

	mac.update(payload);
	mac.verify_slice(&expected_bytes).is_ok()
}

/// Compute the full signature header value for a payload.
///
/// Returns `sha256=<hex>`, the format delivery transports put on the wire.
/// Useful for signing outbound test deliveries.
pub fn sign_header(secret: &[u8], body: &[u8]) -> String {
	format!("{}{}", SIGNATURE_PREFIX, compute_hmac_sha256(secret, body))
}

/// Verify a `sha256=<hex>` signature header against the raw request body.
///
/// The body must be the exact bytes as received; any re-serialization breaks
/// the digest. Fails closed: a missing prefix, invalid hex, or digest mismatch
/// all reject the delivery.
pub fn verify_signature_header(
	secret: &[u8],
	signature_header: &str,
	body: &[u8],
) -> Result<(), SignatureError> {
	let Some(expected_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
		warn!("invalid webhook signature format: missing 'sha256=' prefix");
		return Err(SignatureError::MissingPrefix);
	};

	if verify_hmac_sha256(secret, body, expected_hex) {
		debug!("webhook signature verified");
		Ok(())
	} else {
		warn!("webhook signature verification failed");
		Err(SignatureError::Mismatch)
	}
}


#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn prop_roundtrip(
			secret in proptest::collection::vec(proptest::num::u8::ANY, 1..100),
			payload in proptest::collection::vec(proptest::num::u8::ANY, 0..1000)
		) {
			let sig = compute_hmac_sha256(&secret, &payload);
			prop_assert!(verify_hmac_sha256(&secret, &payload, &sig));
		}

		#[test]
		fn prop_signature_is_64_hex_chars(
			secret in proptest::collection::vec(proptest::num::u8::ANY, 1..100),
			payload in proptest::collection::vec(proptest::num::u8::ANY, 0..1000)
		) {
			let sig = compute_hmac_sha256(&secret, &payload);
			prop_assert_eq!(sig.len(), 64);
			prop_assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
		}

		#[test]
		fn prop_wrong_secret_fails(
			secret1 in proptest::collection::vec(proptest::num::u8::ANY, 1..100),
			secret2 in proptest::collection::vec(proptest::num::u8::ANY, 1..100),
			payload in proptest::collection::vec(proptest::num::u8::ANY, 1..500)
		) {
			if secret1 != secret2 {
				let sig = compute_hmac_sha256(&secret1, &payload);
				prop_assert!(!verify_hmac_sha256(&secret2, &payload, &sig));
			}
		}

		/// **Property: Signed headers always verify against the exact body**
		///
		/// Why: Ensures the header round-trip is correct for any secret/body pair.
		#[test]
		fn prop_signed_header_always_verifies(
			secret in "[a-zA-Z0-9]{8,64}",
			body in proptest::collection::vec(proptest::num::u8::ANY, 1..1000)
		) {
			let header = sign_header(secret.as_bytes(), &body);
			prop_assert!(verify_signature_header(secret.as_bytes(), &header, &body).is_ok());
		}

		/// **Property: Tampered bodies always fail header verification**
		///
		/// Why: Security critical - any byte flip in the body must reject the delivery.
		#[test]
		fn prop_tampered_body_fails_header_verification(
			secret in "[a-zA-Z0-9]{8,64}",
			body in proptest::collection::vec(proptest::num::u8::ANY, 2..500),
			tamper_index in 0usize..500usize
		) {
			let header = sign_header(secret.as_bytes(), &body);

			let mut tampered = body.clone();
			let idx = tamper_index % tampered.len();
			tampered[idx] = tampered[idx].wrapping_add(1);

			if tampered != body {
				let result = verify_signature_header(secret.as_bytes(), &header, &tampered);
				prop_assert!(result.is_err());
			}
		}
	}
}
