// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Presence metadata codec.
//!
//! The fingerprint travels as opaque user data attached to the local member
//! before it becomes visible to peers. The transport imposes a maximum
//! user-data length; a fingerprint that does not fit aborts member startup
//! (fail-fast, never silently unauthenticated). On the inbound side, any
//! buffer that is not exactly [`FINGERPRINT_LEN`] bytes decodes to `None`
//! and is treated as non-matching.

use crate::fingerprint::{Fingerprint, FINGERPRINT_LEN};
use crate::{Error, Result};

/// Encode a fingerprint into presence metadata bounded by `max_len`.
///
/// # Errors
///
/// Returns [`Error::UserDataTooLarge`] when the fingerprint exceeds the
/// transport limit. Callers must treat this as fatal and refuse to join
/// the domain.
pub fn encode(fp: &Fingerprint, max_len: usize) -> Result<Vec<u8>> {
    if FINGERPRINT_LEN > max_len {
        return Err(Error::UserDataTooLarge {
            len: FINGERPRINT_LEN,
            max: max_len,
        });
    }
    Ok(fp.as_bytes().to_vec())
}

/// Decode a remote member's presence metadata.
///
/// Returns `None` for a missing or wrong-length buffer. `None` is a
/// legitimate "no valid fingerprint present" signal, folded into the
/// exclusion decision downstream.
pub fn decode(raw: &[u8]) -> Option<Fingerprint> {
    if raw.len() != FINGERPRINT_LEN {
        return None;
    }
    let mut bytes = [0u8; FINGERPRINT_LEN];
    bytes.copy_from_slice(raw);
    Some(Fingerprint::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_when_it_fits() {
        let fp = Fingerprint::derive("round trip");
        let encoded = encode(&fp, 64).unwrap();
        assert_eq!(encoded.len(), FINGERPRINT_LEN);
        assert_eq!(decode(&encoded), Some(fp));
    }

    #[test]
    fn encode_fails_when_limit_too_small() {
        let fp = Fingerprint::derive("tight");
        match encode(&fp, FINGERPRINT_LEN - 1) {
            Err(Error::UserDataTooLarge { len, max }) => {
                assert_eq!(len, FINGERPRINT_LEN);
                assert_eq!(max, FINGERPRINT_LEN - 1);
            }
            other => panic!("expected UserDataTooLarge, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn encode_succeeds_at_exact_limit() {
        let fp = Fingerprint::derive("exact");
        assert!(encode(&fp, FINGERPRINT_LEN).is_ok());
    }

    #[test]
    fn decode_rejects_wrong_lengths() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[0u8; FINGERPRINT_LEN - 1]), None);
        assert_eq!(decode(&[0u8; FINGERPRINT_LEN + 1]), None);
    }
}
