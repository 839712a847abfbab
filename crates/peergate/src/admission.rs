// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Admission decision engine.
//!
//! Compares a discovered member's advertised fingerprint against the local
//! one and, on mismatch, issues a one-way exclusion command to the
//! transport. The decision is fail-closed: a member that advertises
//! nothing, or something malformed, is excluded.
//!
//! The local fingerprint is injected at construction so the engine is
//! testable with arbitrary secrets. All calls are synchronous and run on
//! the dispatch loop's thread; no locking is needed.

use crate::discovery::InstanceHandle;
use crate::fingerprint::Fingerprint;
use crate::Result;
use std::sync::Arc;

/// Transient outcome of comparing fingerprints. Recomputed per discovery
/// event, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Fingerprints match; the member stays eligible for the data plane.
    Accepted,
    /// Fingerprint missing, malformed, or different; the member is cut off.
    Excluded,
}

/// Receiver of exclusion commands, identified by the discovery-assigned
/// member handle.
///
/// Implementations must be idempotent: excluding a member that is already
/// excluded or gone is success.
pub trait ExclusionSink {
    /// Stop all further communication with the member behind `handle`.
    fn exclude(&self, handle: InstanceHandle) -> Result<()>;
}

impl<S: ExclusionSink + ?Sized> ExclusionSink for Arc<S> {
    fn exclude(&self, handle: InstanceHandle) -> Result<()> {
        (**self).exclude(handle)
    }
}

/// Accept/exclude engine bound to the local fingerprint.
pub struct AdmissionEngine {
    local: Fingerprint,
}

impl AdmissionEngine {
    /// Engine trusting exactly `local`.
    pub fn new(local: Fingerprint) -> Self {
        Self { local }
    }

    /// Pure decision: accepted iff the remote fingerprint is present and
    /// byte-identical to the local one.
    pub fn decide(&self, remote: Option<Fingerprint>) -> AdmissionDecision {
        match remote {
            Some(fp) if fp == self.local => AdmissionDecision::Accepted,
            _ => AdmissionDecision::Excluded,
        }
    }

    /// Decide and, on [`AdmissionDecision::Excluded`], issue the exclusion
    /// command for `handle`. The command is one-way and not retried.
    pub fn admit<S>(
        &self,
        remote: Option<Fingerprint>,
        handle: InstanceHandle,
        sink: &S,
    ) -> Result<AdmissionDecision>
    where
        S: ExclusionSink + ?Sized,
    {
        let decision = self.decide(remote);
        if decision == AdmissionDecision::Excluded {
            log::info!(
                "[ADMISSION] fingerprint mismatch, excluding member handle={}",
                handle
            );
            sink.exclude(handle)?;
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingSink {
        excluded: Mutex<Vec<InstanceHandle>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                excluded: Mutex::new(Vec::new()),
            }
        }
    }

    impl ExclusionSink for RecordingSink {
        fn exclude(&self, handle: InstanceHandle) -> Result<()> {
            self.excluded.lock().push(handle);
            Ok(())
        }
    }

    fn engine() -> AdmissionEngine {
        AdmissionEngine::new(Fingerprint::derive("the shared secret"))
    }

    #[test]
    fn matching_fingerprint_is_accepted() {
        let remote = Some(Fingerprint::derive("the shared secret"));
        assert_eq!(engine().decide(remote), AdmissionDecision::Accepted);
    }

    #[test]
    fn mismatched_fingerprint_is_excluded() {
        let remote = Some(Fingerprint::derive("some other secret"));
        assert_eq!(engine().decide(remote), AdmissionDecision::Excluded);
    }

    #[test]
    fn missing_fingerprint_is_excluded() {
        // Fail-closed: no metadata is never trusted-by-default.
        assert_eq!(engine().decide(None), AdmissionDecision::Excluded);
    }

    #[test]
    fn admit_issues_exactly_one_exclusion_on_mismatch() {
        let sink = RecordingSink::new();
        let handle = InstanceHandle::from_raw(7);
        let decision = engine()
            .admit(Some(Fingerprint::derive("wrong")), handle, &sink)
            .unwrap();
        assert_eq!(decision, AdmissionDecision::Excluded);
        assert_eq!(sink.excluded.lock().as_slice(), &[handle]);
    }

    #[test]
    fn admit_takes_no_action_on_match() {
        let sink = RecordingSink::new();
        let decision = engine()
            .admit(
                Some(Fingerprint::derive("the shared secret")),
                InstanceHandle::from_raw(7),
                &sink,
            )
            .unwrap();
        assert_eq!(decision, AdmissionDecision::Accepted);
        assert!(sink.excluded.lock().is_empty());
    }
}
