// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard (X25519) key generation and base64 encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::secret::SecretString;

pub const KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
	#[error("key is not valid base64")]
	InvalidBase64,

	#[error("key must be {KEY_LEN} bytes, got {0}")]
	InvalidLength(usize),
}

/// A WireGuard private/public keypair. The public half is always derived
/// from the private half.
pub struct WgKeyPair {
	secret: StaticSecret,
	public: PublicKey,
}

impl WgKeyPair {
	pub fn generate() -> Self {
		let mut bytes = [0u8; KEY_LEN];
		OsRng.fill_bytes(&mut bytes);
		let pair = Self::from_bytes(bytes);
		bytes.zeroize();
		pair
	}

	/// Rebuild a keypair from a base64 private key as produced by `wg genkey`.
	pub fn from_private_base64(encoded: &str) -> Result<Self, KeyError> {
		let mut decoded = STANDARD
			.decode(encoded.trim())
			.map_err(|_| KeyError::InvalidBase64)?;
		let len = decoded.len();
		let result = <[u8; KEY_LEN]>::try_from(decoded.as_slice())
			.map(Self::from_bytes)
			.map_err(|_| KeyError::InvalidLength(len));
		decoded.zeroize();
		result
	}

	fn from_bytes(mut bytes: [u8; KEY_LEN]) -> Self {
		// Curve25519 clamping, matching `wg genkey` output.
		bytes[0] &= 248;
		bytes[31] &= 127;
		bytes[31] |= 64;
		let secret = StaticSecret::from(bytes);
		bytes.zeroize();
		let public = PublicKey::from(&secret);
		Self { secret, public }
	}

	pub fn public_key_base64(&self) -> String {
		STANDARD.encode(self.public.as_bytes())
	}

	pub fn private_key_base64(&self) -> SecretString {
		SecretString::new(STANDARD.encode(self.secret.as_bytes()))
	}
}

impl std::fmt::Debug for WgKeyPair {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WgKeyPair")
			.field("public", &self.public_key_base64())
			.field("secret", &crate::secret::REDACTED)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_keys_are_44_char_base64() {
		let pair = WgKeyPair::generate();
		assert_eq!(pair.public_key_base64().len(), 44);
		assert_eq!(pair.private_key_base64().expose().len(), 44);
	}

	#[test]
	fn private_key_roundtrip_derives_same_public() {
		let pair = WgKeyPair::generate();
		let restored = WgKeyPair::from_private_base64(pair.private_key_base64().expose()).unwrap();
		assert_eq!(restored.public_key_base64(), pair.public_key_base64());
	}

	#[test]
	fn two_generations_differ() {
		let a = WgKeyPair::generate();
		let b = WgKeyPair::generate();
		assert_ne!(a.public_key_base64(), b.public_key_base64());
	}

	#[test]
	fn rejects_bad_input() {
		assert_eq!(
			WgKeyPair::from_private_base64("not base64!").unwrap_err(),
			KeyError::InvalidBase64
		);
		assert_eq!(
			WgKeyPair::from_private_base64(&STANDARD.encode([1u8; 16])).unwrap_err(),
			KeyError::InvalidLength(16)
		);
	}

	#[test]
	fn debug_hides_private_key() {
		let pair = WgKeyPair::generate();
		let debug = format!("{pair:?}");
		assert!(debug.contains("[REDACTED]"));
		assert!(!debug.contains(pair.private_key_base64().expose().as_str()));
	}

	#[test]
	fn known_vector_from_rfc7748() {
		// Alice's key pair from RFC 7748 section 6.1.
		let private = "dwdtCnMYpX08FsFyUbJmRd9ML4frwJkqsXf7pR25LCo=";
		let pair = WgKeyPair::from_private_base64(private).unwrap();
		assert_eq!(
			pair.public_key_base64(),
			"hSDwCYkwp1R0i33ctD73Wg2/Og0mOBr066SpjqqbTmo="
		);
	}
}
