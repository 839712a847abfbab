// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport collaborator.
//!
//! Implements the narrow interface the admission subsystem consumes:
//! join/activate a domain member, attach presence metadata before
//! activation, built-in discovery readers per entity kind, one-way
//! idempotent exclusion, and raw byte-payload writer/reader endpoints.
//!
//! # Architecture
//!
//! ```text
//! DomainRegistry (process-global)
//! +-- domains: Mutex<HashMap<DomainId, Weak<DomainState>>>
//!
//! DomainState (one per domain, per process)
//! +-- members:      RwLock<HashMap<Guid, Weak<MemberInner>>>
//! +-- endpoints:    RwLock<Vec<EndpointRecord>>   (for late joiners)
//! +-- reader_ports: RwLock<Vec<ReaderPort>>       (data fan-out)
//! ```
//!
//! Delivery is queue-per-receiver: every built-in reader and data reader
//! owns a channel plus a status condition that wakes the owning dispatch
//! loop. Exclusion is enforced at both ends - writes skip excluded pairs
//! and readers filter excluded sources at take time, so the admission
//! decision holds even when a sample was queued before the decision ran.

mod endpoint;
mod member;
mod registry;

pub use endpoint::{DataReader, DataWriter, Sample};
pub use member::{DiscoveryReader, Member, MemberBuilder};
pub use registry::{DomainId, DomainRegistry, DomainState, MAX_DOMAIN_ID, MAX_USER_DATA_LEN};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque identity key for members and endpoints.
///
/// 16 bytes: process id, creation timestamp, and a process-local counter.
/// Comparably unique per entity; peers treat it as opaque.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid([u8; 16]);

impl Guid {
    /// Reconstruct from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// All-zero placeholder.
    pub const fn zero() -> Self {
        Self([0u8; 16])
    }

    /// Whether this is the all-zero placeholder.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub(crate) fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&std::process::id().to_be_bytes());
        bytes[4..12].copy_from_slice(&nanos.to_be_bytes());
        bytes[12..16].copy_from_slice(&(count as u32).to_be_bytes());
        Self(bytes)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_guids_are_unique() {
        let a = Guid::generate();
        let b = Guid::generate();
        assert_ne!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn zero_guid_is_zero() {
        assert!(Guid::zero().is_zero());
    }
}
