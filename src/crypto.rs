// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Small cryptographic helpers: opaque tokens, PKCE, constant-time compare.
//!
//! All randomness comes from `ring::rand::SystemRandom`.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

/// Number of random bytes in session tokens, codes, and PKCE verifiers.
pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("system random number generator failed")]
    Rng,
}

/// Fill `N` bytes from the system RNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| CryptoError::Rng)?;
    Ok(buf)
}

/// 32 random bytes, base64url without padding (43 characters).
pub fn random_token() -> Result<String, CryptoError> {
    let bytes = random_bytes::<TOKEN_BYTES>()?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// PKCE code challenge methods (RFC 7636).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkceMethod {
    S256,
    Plain,
}

impl PkceMethod {
    /// Absent means `plain`, as RFC 7636 §4.3 specifies.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("plain") => Some(PkceMethod::Plain),
            Some("S256") => Some(PkceMethod::S256),
            Some(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PkceMethod::S256 => "S256",
            PkceMethod::Plain => "plain",
        }
    }
}

/// `BASE64URL(SHA256(verifier))`.
pub fn pkce_s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    Base64UrlUnpadded::encode_string(&digest)
}

/// Check a `code_verifier` against the stored challenge.
pub fn verify_pkce(method: PkceMethod, verifier: &str, challenge: &str) -> bool {
    // RFC 7636 §4.1: 43..=128 characters
    if !(43..=128).contains(&verifier.len()) {
        return false;
    }
    let computed = match method {
        PkceMethod::S256 => pkce_s256_challenge(verifier),
        PkceMethod::Plain => verifier.to_string(),
    };
    constant_time_eq(computed.as_bytes(), challenge.as_bytes())
}

/// Compare secrets without leaking the position of the first difference.
#[allow(deprecated)]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    ring::constant_time::verify_slices_are_equal(a, b).is_ok()
}
