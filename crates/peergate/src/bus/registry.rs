// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-global domain registry and per-domain state.
//!
//! One [`DomainState`] exists per (domain id, process). The registry holds
//! weak references so a domain disappears when its last member drops.
//!
//! Lock order inside a domain: `members` -> `endpoints` -> `reader_ports`.
//! Per-member state (handle cache, exclusion set) is a leaf and never
//! takes registry locks.

use super::endpoint::Sample;
use super::member::MemberInner;
use super::Guid;
use crate::discovery::{DiscoveredEndpoint, EndpointKind};
use crate::dispatch::StatusCondition;
use crossbeam::channel::Sender;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

/// Domain ID type (0-232, DDS convention).
pub type DomainId = u32;

/// Highest valid domain id.
pub const MAX_DOMAIN_ID: DomainId = 232;

/// Transport-imposed maximum presence metadata length, queried once at
/// member startup.
pub const MAX_USER_DATA_LEN: usize = 64;

/// Process-global registry of domains.
pub struct DomainRegistry {
    domains: Mutex<HashMap<DomainId, Weak<DomainState>>>,
}

impl DomainRegistry {
    /// The process-wide registry instance.
    pub fn global() -> &'static DomainRegistry {
        static REGISTRY: OnceLock<DomainRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| DomainRegistry {
            domains: Mutex::new(HashMap::new()),
        })
    }

    /// Get the state for a domain, creating it if absent.
    pub fn get_or_create(&self, domain_id: DomainId) -> Arc<DomainState> {
        let mut domains = self.domains.lock();
        domains.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = domains.get(&domain_id).and_then(Weak::upgrade) {
            return existing;
        }
        let state = Arc::new(DomainState::new(domain_id));
        domains.insert(domain_id, Arc::downgrade(&state));
        state
    }

    /// Get the state for a domain if it has live members.
    pub fn get(&self, domain_id: DomainId) -> Option<Arc<DomainState>> {
        self.domains.lock().get(&domain_id).and_then(Weak::upgrade)
    }
}

/// Announced endpoint, kept so late-joining members learn existing
/// endpoints at activation.
struct EndpointRecord {
    kind: EndpointKind,
    key: Guid,
    member_key: Guid,
    topic: String,
}

impl EndpointRecord {
    fn to_discovered(&self, valid: bool) -> DiscoveredEndpoint {
        DiscoveredEndpoint {
            kind: self.kind,
            key: self.key,
            member_key: self.member_key,
            topic: self.topic.clone(),
            valid,
        }
    }
}

/// Delivery port for one data reader.
pub(crate) struct ReaderPort {
    pub(crate) key: Guid,
    pub(crate) topic: String,
    pub(crate) owner: Weak<MemberInner>,
    pub(crate) tx: Sender<Sample>,
    pub(crate) condition: Arc<StatusCondition>,
}

/// Shared state of one domain within this process.
pub struct DomainState {
    domain_id: DomainId,
    members: RwLock<HashMap<Guid, Weak<MemberInner>>>,
    endpoints: RwLock<Vec<EndpointRecord>>,
    reader_ports: RwLock<Vec<ReaderPort>>,
}

impl DomainState {
    fn new(domain_id: DomainId) -> Self {
        Self {
            domain_id,
            members: RwLock::new(HashMap::new()),
            endpoints: RwLock::new(Vec::new()),
            reader_ports: RwLock::new(Vec::new()),
        }
    }

    /// Domain id of this state.
    pub fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    /// Maximum presence metadata length this transport accepts.
    pub fn max_user_data_len(&self) -> usize {
        MAX_USER_DATA_LEN
    }

    /// Number of live, activated members.
    pub fn member_count(&self) -> usize {
        self.members
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .filter(|m| m.is_enabled())
            .count()
    }

    /// Make a member visible: exchange member records with every already
    /// active member, replay existing endpoint announcements to the new
    /// member, then insert it.
    pub(crate) fn activate(&self, inner: &Arc<MemberInner>) {
        let mut members = self.members.write();
        members.retain(|_, weak| weak.strong_count() > 0);

        for other_weak in members.values() {
            let Some(other) = other_weak.upgrade() else {
                continue;
            };
            if !other.is_enabled() {
                continue;
            }
            other.deliver_member_record(inner.guid, inner.user_data.clone(), true);
            inner.deliver_member_record(other.guid, other.user_data.clone(), true);
        }

        for record in self.endpoints.read().iter() {
            if record.member_key == inner.guid {
                continue;
            }
            inner.deliver_endpoint_record(record.to_discovered(true));
        }

        members.insert(inner.guid, Arc::downgrade(inner));
        log::debug!(
            "[BUS] domain {} activated member {}",
            self.domain_id,
            inner.guid
        );
    }

    /// Remove a departing member and notify the remaining members with an
    /// invalid lifecycle record.
    pub(crate) fn retire(&self, guid: Guid) {
        let mut members = self.members.write();
        members.remove(&guid);
        self.endpoints.write().retain(|r| r.member_key != guid);
        self.reader_ports
            .write()
            .retain(|p| p.owner.upgrade().map(|m| m.guid) != Some(guid));

        for other_weak in members.values() {
            let Some(other) = other_weak.upgrade() else {
                continue;
            };
            if !other.is_enabled() {
                continue;
            }
            other.deliver_member_record(guid, Vec::new(), false);
        }
        log::debug!("[BUS] domain {} retired member {}", self.domain_id, guid);
    }

    /// Record a new writer endpoint and announce it to other members.
    pub(crate) fn register_writer(&self, owner: &Arc<MemberInner>, key: Guid, topic: &str) {
        let members = self.members.read();
        self.endpoints.write().push(EndpointRecord {
            kind: EndpointKind::Writer,
            key,
            member_key: owner.guid,
            topic: topic.to_string(),
        });
        self.announce_endpoint(
            &members,
            owner.guid,
            DiscoveredEndpoint {
                kind: EndpointKind::Writer,
                key,
                member_key: owner.guid,
                topic: topic.to_string(),
                valid: true,
            },
        );
    }

    /// Record a new reader endpoint, wire its delivery port, and announce
    /// it to other members.
    pub(crate) fn register_reader(&self, owner: &Arc<MemberInner>, port: ReaderPort) {
        let members = self.members.read();
        let announcement = DiscoveredEndpoint {
            kind: EndpointKind::Reader,
            key: port.key,
            member_key: owner.guid,
            topic: port.topic.clone(),
            valid: true,
        };
        self.endpoints.write().push(EndpointRecord {
            kind: EndpointKind::Reader,
            key: port.key,
            member_key: owner.guid,
            topic: port.topic.clone(),
        });
        self.reader_ports.write().push(port);
        self.announce_endpoint(&members, owner.guid, announcement);
    }

    /// Drop a writer endpoint; remaining members get an invalid record.
    pub(crate) fn unregister_writer(&self, owner_guid: Guid, key: Guid) {
        let members = self.members.read();
        let mut endpoints = self.endpoints.write();
        let Some(pos) = endpoints.iter().position(|r| r.key == key) else {
            return;
        };
        let record = endpoints.swap_remove(pos);
        drop(endpoints);
        self.announce_endpoint(&members, owner_guid, record.to_discovered(false));
    }

    /// Drop a reader endpoint and its delivery port.
    pub(crate) fn unregister_reader(&self, owner_guid: Guid, key: Guid) {
        let members = self.members.read();
        let mut endpoints = self.endpoints.write();
        let Some(pos) = endpoints.iter().position(|r| r.key == key) else {
            return;
        };
        let record = endpoints.swap_remove(pos);
        drop(endpoints);
        self.reader_ports.write().retain(|p| p.key != key);
        self.announce_endpoint(&members, owner_guid, record.to_discovered(false));
    }

    fn announce_endpoint(
        &self,
        members: &HashMap<Guid, Weak<MemberInner>>,
        owner_guid: Guid,
        record: DiscoveredEndpoint,
    ) {
        for other_weak in members.values() {
            let Some(other) = other_weak.upgrade() else {
                continue;
            };
            if other.guid == owner_guid || !other.is_enabled() {
                continue;
            }
            other.deliver_endpoint_record(record.clone());
        }
    }

    /// Fan a sample out to every matched reader whose owner has not
    /// excluded the writer's member (and vice versa).
    pub(crate) fn publish(&self, writer_owner: &Arc<MemberInner>, topic: &str, payload: &[u8]) {
        let ports = self.reader_ports.read();
        for port in ports.iter().filter(|p| p.topic == topic) {
            let Some(reader_owner) = port.owner.upgrade() else {
                continue;
            };
            if reader_owner.excludes(&writer_owner.guid)
                || writer_owner.excludes(&reader_owner.guid)
            {
                continue;
            }
            let sample = Sample {
                source: writer_owner.guid,
                payload: payload.to_vec(),
            };
            // A closed channel means the reader is mid-teardown; skip it.
            if port.tx.send(sample).is_ok() {
                port.condition.set_trigger(true);
            }
        }
    }
}
