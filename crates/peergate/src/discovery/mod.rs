// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery records and the per-kind listener set.
//!
//! The bus delivers lifecycle events for three kinds of remote entities:
//! domain members, writer endpoints, and reader endpoints. Each kind has
//! its own built-in reader and its own listener; listeners react only to
//! newly observed records (the readers hand out each record once), so
//! repeated wake-ups are idempotent.
//!
//! Only the member listener makes a decision. Endpoint listeners emit a
//! structured log line and nothing else.

use crate::admission::{AdmissionEngine, ExclusionSink};
use crate::bus::Guid;
use crate::fingerprint::Fingerprint;
use crate::{presence, Result};
use std::fmt;

/// Discovery-assigned handle for a remote member, scoped to the local
/// member that observed it. Exclusion commands are addressed by handle,
/// not by raw identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    /// Reconstruct from a raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value.
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// A remote participant observed through discovery.
///
/// Owned by the transport; listeners read it transiently during one
/// invocation and must not retain references beyond that.
#[derive(Debug, Clone)]
pub struct DiscoveredMember {
    /// Identity key of the remote member.
    pub key: Guid,
    /// Handle assigned by the local discovery cache.
    pub handle: InstanceHandle,
    /// Presence metadata the member advertised (may be empty).
    pub user_data: Vec<u8>,
    /// False for lifecycle notices about an already-departed member.
    pub valid: bool,
}

/// Endpoint direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Publishing side (data writer).
    Writer,
    /// Subscribing side (data reader).
    Reader,
}

/// A remote endpoint observed through discovery. Informational only; no
/// admission logic applies to endpoints.
#[derive(Debug, Clone)]
pub struct DiscoveredEndpoint {
    /// Direction of the endpoint.
    pub kind: EndpointKind,
    /// Identity key of the endpoint itself.
    pub key: Guid,
    /// Identity key of the owning member.
    pub member_key: Guid,
    /// Topic the endpoint is bound to.
    pub topic: String,
    /// False for lifecycle notices about an already-departed endpoint.
    pub valid: bool,
}

/// Common view over discovery records, used by the built-in readers for
/// exclusion filtering.
pub trait DiscoveryRecord: Send + 'static {
    /// Identity key of the member this record originates from.
    fn member_key(&self) -> Guid;
}

impl DiscoveryRecord for DiscoveredMember {
    fn member_key(&self) -> Guid {
        self.key
    }
}

impl DiscoveryRecord for DiscoveredEndpoint {
    fn member_key(&self) -> Guid {
        self.member_key
    }
}

/// Reaction to a batch of newly observed records of one kind.
///
/// One listener instance exists per kind; the dispatch loop invokes them
/// strictly sequentially. Records marked invalid are skipped inside the
/// listener (no-op, not an error).
pub trait NewInstanceListener: Send {
    /// Record kind this listener reacts to.
    type Record: DiscoveryRecord;

    /// Process one batch drained from the built-in reader.
    fn on_new_instances(&mut self, records: Vec<Self::Record>) -> Result<()>;
}

/// Member-kind listener: decodes presence metadata and drives the
/// admission engine. The only listener with side effects beyond logging.
pub struct MemberGateListener<S: ExclusionSink> {
    engine: AdmissionEngine,
    sink: S,
}

impl<S: ExclusionSink> MemberGateListener<S> {
    /// Gate trusting `local`, issuing exclusions through `sink`.
    pub fn new(local: Fingerprint, sink: S) -> Self {
        Self {
            engine: AdmissionEngine::new(local),
            sink,
        }
    }
}

impl<S: ExclusionSink + Send> NewInstanceListener for MemberGateListener<S> {
    type Record = DiscoveredMember;

    fn on_new_instances(&mut self, records: Vec<DiscoveredMember>) -> Result<()> {
        for record in records {
            if !record.valid {
                continue;
            }
            let remote = presence::decode(&record.user_data);
            match remote {
                Some(fp) => log::info!(
                    "[BUILTIN] found member key={} fingerprint={} handle={}",
                    record.key,
                    fp,
                    record.handle
                ),
                None => log::info!(
                    "[BUILTIN] found member key={} fingerprint=<none> handle={}",
                    record.key,
                    record.handle
                ),
            }
            self.engine.admit(remote, record.handle, &self.sink)?;
        }
        Ok(())
    }
}

/// Endpoint-kind listener: logs the endpoint and its owning member.
/// Instantiated once for writer events and once for reader events.
pub struct EndpointLogListener;

impl EndpointLogListener {
    /// New logging listener.
    pub fn new() -> Self {
        Self
    }
}

impl Default for EndpointLogListener {
    fn default() -> Self {
        Self::new()
    }
}

impl NewInstanceListener for EndpointLogListener {
    type Record = DiscoveredEndpoint;

    fn on_new_instances(&mut self, records: Vec<DiscoveredEndpoint>) -> Result<()> {
        for record in records {
            if !record.valid {
                continue;
            }
            let word = match record.kind {
                EndpointKind::Writer => "publisher",
                EndpointKind::Reader => "subscriber",
            };
            log::info!(
                "[BUILTIN] found {} key={} member={} topic={}",
                word,
                record.key,
                record.member_key,
                record.topic
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct RecordingSink {
        excluded: Mutex<Vec<InstanceHandle>>,
    }

    impl ExclusionSink for RecordingSink {
        fn exclude(&self, handle: InstanceHandle) -> Result<()> {
            self.excluded.lock().push(handle);
            Ok(())
        }
    }

    fn member(handle: u64, user_data: Vec<u8>, valid: bool) -> DiscoveredMember {
        DiscoveredMember {
            key: Guid::generate(),
            handle: InstanceHandle::from_raw(handle),
            user_data,
            valid,
        }
    }

    #[test]
    fn gate_excludes_mismatch_and_accepts_match() {
        let local = Fingerprint::derive("right");
        let sink = Arc::new(RecordingSink {
            excluded: Mutex::new(Vec::new()),
        });
        let mut gate = MemberGateListener::new(local, Arc::clone(&sink));

        let good = member(1, local.as_bytes().to_vec(), true);
        let bad = member(2, Fingerprint::derive("wrong").as_bytes().to_vec(), true);
        let silent = member(3, Vec::new(), true);
        gate.on_new_instances(vec![good, bad, silent]).unwrap();

        let excluded = sink.excluded.lock();
        assert_eq!(
            excluded.as_slice(),
            &[InstanceHandle::from_raw(2), InstanceHandle::from_raw(3)]
        );
    }

    #[test]
    fn gate_skips_invalid_records() {
        let local = Fingerprint::derive("right");
        let sink = Arc::new(RecordingSink {
            excluded: Mutex::new(Vec::new()),
        });
        let mut gate = MemberGateListener::new(local, Arc::clone(&sink));

        // Departure notice for a member with mismatched (stale) metadata:
        // silently skipped, never excluded.
        let departed = member(9, Fingerprint::derive("wrong").as_bytes().to_vec(), false);
        gate.on_new_instances(vec![departed]).unwrap();
        assert!(sink.excluded.lock().is_empty());
    }

    #[test]
    fn endpoint_listener_makes_no_decision() {
        let mut listener = EndpointLogListener::new();
        let record = DiscoveredEndpoint {
            kind: EndpointKind::Writer,
            key: Guid::generate(),
            member_key: Guid::generate(),
            topic: "Triangle".into(),
            valid: true,
        };
        // Logging only; must not error.
        listener.on_new_instances(vec![record]).unwrap();
    }
}
