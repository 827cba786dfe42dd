// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential digest (C1) — deterministic fingerprint of an `(apiKey,
//! accessToken)` pair used for session affinity, never for secrecy.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 fingerprint of a credential pair.
///
/// Deterministic and side-effect-free. Never logged alongside the secret
/// material it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CredentialDigest([u8; 32]);

impl CredentialDigest {
    /// Compute the digest of `api_key` and `access_token`.
    ///
    /// The two fields are joined with a byte that cannot appear in either
    /// value's UTF-8 encoding ambiguity-free (a NUL separator), so
    /// `digest("a", "bc") != digest("ab", "c")`.
    pub fn compute(api_key: &str, access_token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        hasher.update([0u8]);
        hasher.update(access_token.as_bytes());
        let out = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&out);
        Self(bytes)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CredentialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
