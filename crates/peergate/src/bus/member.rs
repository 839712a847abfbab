// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local domain member: builder, two-phase activation, built-in discovery
//! readers, and member-level exclusion.
//!
//! Creation is two-phase so discovery listeners can be installed before
//! the member becomes visible: `Member::builder(..).build()?` joins the
//! domain silently, `enable()` activates it. Presence metadata must be
//! supplied to the builder; it cannot change after activation.

use super::endpoint::{DataReader, DataWriter, Sample};
use super::registry::{DomainId, DomainRegistry, DomainState, ReaderPort, MAX_DOMAIN_ID};
use super::Guid;
use crate::admission::ExclusionSink;
use crate::discovery::{
    DiscoveredEndpoint, DiscoveredMember, DiscoveryRecord, EndpointKind, InstanceHandle,
};
use crate::dispatch::{Condition, StatusCondition};
use crate::{Error, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Channel + status condition pair feeding one built-in reader.
pub(crate) struct BuiltinPort<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    condition: Arc<StatusCondition>,
}

impl<T> BuiltinPort<T> {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            condition: Arc::new(StatusCondition::new()),
        }
    }

    fn push(&self, record: T) {
        // rx lives as long as the member, so the send cannot fail while
        // the port is reachable.
        if self.tx.send(record).is_ok() {
            self.condition.set_trigger(true);
        }
    }
}

/// Discovery cache: handle assignment is first-observation, per local
/// member. Exclusion commands resolve handles back to identity keys.
struct HandleCache {
    next: u64,
    by_guid: HashMap<Guid, InstanceHandle>,
    by_handle: HashMap<InstanceHandle, Guid>,
}

impl HandleCache {
    fn new() -> Self {
        Self {
            next: 1,
            by_guid: HashMap::new(),
            by_handle: HashMap::new(),
        }
    }

    fn assign(&mut self, guid: Guid) -> InstanceHandle {
        if let Some(handle) = self.by_guid.get(&guid) {
            return *handle;
        }
        let handle = InstanceHandle::from_raw(self.next);
        self.next += 1;
        self.by_guid.insert(guid, handle);
        self.by_handle.insert(handle, guid);
        handle
    }

    fn resolve(&self, handle: InstanceHandle) -> Option<Guid> {
        self.by_handle.get(&handle).copied()
    }
}

pub(crate) struct MemberInner {
    pub(crate) guid: Guid,
    pub(crate) name: String,
    pub(crate) user_data: Vec<u8>,
    pub(crate) domain: Arc<DomainState>,
    enabled: AtomicBool,
    exclusions: RwLock<HashSet<Guid>>,
    handles: Mutex<HandleCache>,
    members_port: BuiltinPort<DiscoveredMember>,
    pubs_port: BuiltinPort<DiscoveredEndpoint>,
    subs_port: BuiltinPort<DiscoveredEndpoint>,
}

impl MemberInner {
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn excludes(&self, guid: &Guid) -> bool {
        self.exclusions.read().contains(guid)
    }

    pub(crate) fn deliver_member_record(&self, remote: Guid, user_data: Vec<u8>, valid: bool) {
        let handle = self.handles.lock().assign(remote);
        self.members_port.push(DiscoveredMember {
            key: remote,
            handle,
            user_data,
            valid,
        });
    }

    pub(crate) fn deliver_endpoint_record(&self, record: DiscoveredEndpoint) {
        match record.kind {
            EndpointKind::Writer => self.pubs_port.push(record),
            EndpointKind::Reader => self.subs_port.push(record),
        }
    }
}

/// Built-in reader for one discovery record kind.
///
/// `take_new` drains only records not yet taken; records originating from
/// an excluded member are dropped before any listener sees them.
pub struct DiscoveryReader<T> {
    rx: Receiver<T>,
    condition: Arc<StatusCondition>,
    owner: Arc<MemberInner>,
}

impl<T: DiscoveryRecord> DiscoveryReader<T> {
    /// Drain the newly observed records.
    pub fn take_new(&self) -> Vec<T> {
        // Clear first: a record arriving mid-drain re-triggers.
        self.condition.set_trigger(false);
        let mut records = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            if self.owner.excludes(&record.member_key()) {
                continue;
            }
            records.push(record);
        }
        records
    }

    /// Condition for waitset attachment; triggers on arrival.
    pub fn condition(&self) -> Arc<dyn Condition> {
        Arc::clone(&self.condition) as Arc<dyn Condition>
    }
}

/// The local process's representative in a domain.
pub struct Member {
    inner: Arc<MemberInner>,
}

impl Member {
    /// Start building a member.
    pub fn builder(name: &str) -> MemberBuilder {
        MemberBuilder {
            name: name.to_string(),
            domain_id: 0,
            user_data: Vec::new(),
        }
    }

    /// Identity key of this member.
    pub fn guid(&self) -> Guid {
        self.inner.guid
    }

    /// Application name of this member.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Domain this member joined.
    pub fn domain_id(&self) -> DomainId {
        self.inner.domain.domain_id()
    }

    /// Transport-imposed presence metadata limit.
    pub fn max_user_data_len(&self) -> usize {
        self.inner.domain.max_user_data_len()
    }

    /// Activate the member: it becomes visible to peers and starts
    /// receiving discovery records. Install listeners first. Idempotent.
    pub fn enable(&self) -> Result<()> {
        if self.inner.enabled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.domain.activate(&self.inner);
        log::info!(
            "[BUS] member '{}' {} enabled in domain {}",
            self.inner.name,
            self.inner.guid,
            self.inner.domain.domain_id()
        );
        Ok(())
    }

    /// Built-in reader for remote member discovery.
    pub fn builtin_members(&self) -> DiscoveryReader<DiscoveredMember> {
        DiscoveryReader {
            rx: self.inner.members_port.rx.clone(),
            condition: Arc::clone(&self.inner.members_port.condition),
            owner: Arc::clone(&self.inner),
        }
    }

    /// Built-in reader for remote writer-endpoint discovery.
    pub fn builtin_publications(&self) -> DiscoveryReader<DiscoveredEndpoint> {
        DiscoveryReader {
            rx: self.inner.pubs_port.rx.clone(),
            condition: Arc::clone(&self.inner.pubs_port.condition),
            owner: Arc::clone(&self.inner),
        }
    }

    /// Built-in reader for remote reader-endpoint discovery.
    pub fn builtin_subscriptions(&self) -> DiscoveryReader<DiscoveredEndpoint> {
        DiscoveryReader {
            rx: self.inner.subs_port.rx.clone(),
            condition: Arc::clone(&self.inner.subs_port.condition),
            owner: Arc::clone(&self.inner),
        }
    }

    /// Stop all further communication with the member behind `handle`.
    ///
    /// One-way and idempotent: an unknown or already-excluded handle is
    /// success (the member is gone either way).
    pub fn ignore(&self, handle: InstanceHandle) -> Result<()> {
        let Some(guid) = self.inner.handles.lock().resolve(handle) else {
            log::debug!("[BUS] ignore: handle {} unknown or already gone", handle);
            return Ok(());
        };
        if self.inner.exclusions.write().insert(guid) {
            log::info!(
                "[BUS] member '{}' now ignoring {} (handle {})",
                self.inner.name,
                guid,
                handle
            );
        }
        Ok(())
    }

    /// Create a writer endpoint on `topic`.
    pub fn create_writer(&self, topic: &str) -> Result<DataWriter> {
        if !self.inner.is_enabled() {
            return Err(Error::InvalidState(
                "cannot create writer on a disabled member".into(),
            ));
        }
        let key = Guid::generate();
        self.inner.domain.register_writer(&self.inner, key, topic);
        Ok(DataWriter::new(Arc::clone(&self.inner), key, topic))
    }

    /// Create a reader endpoint on `topic`.
    pub fn create_reader(&self, topic: &str) -> Result<DataReader> {
        if !self.inner.is_enabled() {
            return Err(Error::InvalidState(
                "cannot create reader on a disabled member".into(),
            ));
        }
        let key = Guid::generate();
        let (tx, rx) = unbounded::<Sample>();
        let condition = Arc::new(StatusCondition::new());
        self.inner.domain.register_reader(
            &self.inner,
            ReaderPort {
                key,
                topic: topic.to_string(),
                owner: Arc::downgrade(&self.inner),
                tx,
                condition: Arc::clone(&condition),
            },
        );
        Ok(DataReader::new(
            Arc::clone(&self.inner),
            key,
            topic,
            rx,
            condition,
        ))
    }
}

impl ExclusionSink for Member {
    fn exclude(&self, handle: InstanceHandle) -> Result<()> {
        self.ignore(handle)
    }
}

impl Drop for Member {
    fn drop(&mut self) {
        if self.inner.is_enabled() {
            self.inner.domain.retire(self.inner.guid);
        }
    }
}

/// Builder for [`Member`]. Presence metadata is attached here, before the
/// member can become visible.
pub struct MemberBuilder {
    name: String,
    domain_id: DomainId,
    user_data: Vec<u8>,
}

impl MemberBuilder {
    /// Domain to join (0-232). Default 0.
    pub fn domain_id(mut self, domain_id: DomainId) -> Self {
        self.domain_id = domain_id;
        self
    }

    /// Presence metadata advertised to peers at activation.
    pub fn user_data(mut self, user_data: Vec<u8>) -> Self {
        self.user_data = user_data;
        self
    }

    /// Join the domain without becoming visible; call
    /// [`Member::enable`] once listeners are installed.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDomainId`] for an out-of-range domain,
    /// [`Error::UserDataTooLarge`] when the metadata exceeds the
    /// transport limit. Both are checked before any registry state is
    /// touched.
    pub fn build(self) -> Result<Member> {
        if self.domain_id > MAX_DOMAIN_ID {
            return Err(Error::InvalidDomainId(self.domain_id));
        }
        if self.user_data.len() > super::registry::MAX_USER_DATA_LEN {
            return Err(Error::UserDataTooLarge {
                len: self.user_data.len(),
                max: super::registry::MAX_USER_DATA_LEN,
            });
        }

        let domain = DomainRegistry::global().get_or_create(self.domain_id);
        Ok(Member {
            inner: Arc::new(MemberInner {
                guid: Guid::generate(),
                name: self.name,
                user_data: self.user_data,
                domain,
                enabled: AtomicBool::new(false),
                exclusions: RwLock::new(HashSet::new()),
                handles: Mutex::new(HandleCache::new()),
                members_port: BuiltinPort::new(),
                pubs_port: BuiltinPort::new(),
                subs_port: BuiltinPort::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Distinct domain ids per test: the registry is process-global and
    // tests run in one process.

    fn enabled_member(name: &str, domain_id: DomainId, user_data: &[u8]) -> Member {
        let member = Member::builder(name)
            .domain_id(domain_id)
            .user_data(user_data.to_vec())
            .build()
            .unwrap();
        member.enable().unwrap();
        member
    }

    #[test]
    fn build_rejects_out_of_range_domain() {
        assert!(matches!(
            Member::builder("m").domain_id(233).build(),
            Err(Error::InvalidDomainId(233))
        ));
    }

    #[test]
    fn build_rejects_oversized_user_data_before_joining() {
        let oversized = vec![0u8; super::super::registry::MAX_USER_DATA_LEN + 1];
        assert!(matches!(
            Member::builder("m").domain_id(200).user_data(oversized).build(),
            Err(Error::UserDataTooLarge { .. })
        ));
        // The failed build must not have created the domain.
        assert!(DomainRegistry::global().get(200).is_none());
    }

    #[test]
    fn activation_exchanges_member_records() {
        let a = enabled_member("a", 201, b"aaaaaaaa");
        let b = enabled_member("b", 201, b"bbbbbbbb");

        let seen_by_a = a.builtin_members().take_new();
        assert_eq!(seen_by_a.len(), 1);
        assert_eq!(seen_by_a[0].key, b.guid());
        assert_eq!(seen_by_a[0].user_data, b"bbbbbbbb");
        assert!(seen_by_a[0].valid);

        let seen_by_b = b.builtin_members().take_new();
        assert_eq!(seen_by_b.len(), 1);
        assert_eq!(seen_by_b[0].key, a.guid());
    }

    #[test]
    fn endpoints_are_announced_to_peers_and_late_joiners() {
        let a = enabled_member("a", 202, b"");
        let _writer = a.create_writer("Triangle").unwrap();

        let b = enabled_member("b", 202, b"");
        let pubs_seen_by_b = b.builtin_publications().take_new();
        assert_eq!(pubs_seen_by_b.len(), 1);
        assert_eq!(pubs_seen_by_b[0].member_key, a.guid());
        assert_eq!(pubs_seen_by_b[0].topic, "Triangle");

        let _reader = b.create_reader("Triangle").unwrap();
        let subs_seen_by_a = a.builtin_subscriptions().take_new();
        assert_eq!(subs_seen_by_a.len(), 1);
        assert_eq!(subs_seen_by_a[0].member_key, b.guid());
    }

    #[test]
    fn endpoints_require_an_enabled_member() {
        let member = Member::builder("m").domain_id(203).build().unwrap();
        assert!(matches!(
            member.create_writer("t"),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            member.create_reader("t"),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn ignore_is_idempotent_and_tolerates_unknown_handles() {
        let a = enabled_member("a", 204, b"");
        let _b = enabled_member("b", 204, b"");

        let records = a.builtin_members().take_new();
        let handle = records[0].handle;
        a.ignore(handle).unwrap();
        a.ignore(handle).unwrap();
        a.ignore(InstanceHandle::from_raw(0xdead)).unwrap();
    }

    #[test]
    fn ignored_member_samples_are_never_taken() {
        let a = enabled_member("a", 205, b"");
        let b = enabled_member("b", 205, b"");
        let reader = a.create_reader("Triangle").unwrap();
        let writer = b.create_writer("Triangle").unwrap();

        // Sample queued before the exclusion decision runs.
        writer.write(b"early").unwrap();
        let handle = a.builtin_members().take_new()[0].handle;
        a.ignore(handle).unwrap();
        writer.write(b"late").unwrap();

        assert!(reader.take().is_empty());
    }

    #[test]
    fn departure_delivers_an_invalid_record() {
        let a = enabled_member("a", 206, b"");
        {
            let _b = enabled_member("b", 206, b"");
            let _ = a.builtin_members().take_new();
        }
        let records = a.builtin_members().take_new();
        assert_eq!(records.len(), 1);
        assert!(!records[0].valid);
        assert!(records[0].user_data.is_empty());
    }

    #[test]
    fn enable_is_idempotent() {
        let a = enabled_member("a", 207, b"");
        a.enable().unwrap();
        assert_eq!(
            DomainRegistry::global().get(207).unwrap().member_count(),
            1
        );
    }
}
