// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw byte-payload data endpoints.
//!
//! The data plane is deliberately thin: once a member is admitted, a
//! writer fans samples out to every matched reader and a reader drains its
//! queue when its condition wakes the dispatch loop. Payload encoding is
//! the application's concern.

use super::member::MemberInner;
use super::Guid;
use crate::dispatch::{Condition, StatusCondition};
use crate::Result;
use crossbeam::channel::Receiver;
use std::sync::Arc;

/// One delivered data sample.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Identity key of the member that wrote the sample.
    pub source: Guid,
    /// Application payload bytes.
    pub payload: Vec<u8>,
}

/// Publishing endpoint on one topic.
pub struct DataWriter {
    owner: Arc<MemberInner>,
    key: Guid,
    topic: String,
}

impl DataWriter {
    pub(crate) fn new(owner: Arc<MemberInner>, key: Guid, topic: &str) -> Self {
        Self {
            owner,
            key,
            topic: topic.to_string(),
        }
    }

    /// Identity key of this endpoint.
    pub fn guid(&self) -> Guid {
        self.key
    }

    /// Topic this writer publishes on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Deliver one sample to every matched, non-excluded reader.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        self.owner.domain.publish(&self.owner, &self.topic, payload);
        Ok(())
    }
}

impl Drop for DataWriter {
    fn drop(&mut self) {
        self.owner.domain.unregister_writer(self.owner.guid, self.key);
    }
}

/// Subscribing endpoint on one topic.
pub struct DataReader {
    owner: Arc<MemberInner>,
    key: Guid,
    topic: String,
    rx: Receiver<Sample>,
    condition: Arc<StatusCondition>,
}

impl DataReader {
    pub(crate) fn new(
        owner: Arc<MemberInner>,
        key: Guid,
        topic: &str,
        rx: Receiver<Sample>,
        condition: Arc<StatusCondition>,
    ) -> Self {
        Self {
            owner,
            key,
            topic: topic.to_string(),
            rx,
            condition,
        }
    }

    /// Identity key of this endpoint.
    pub fn guid(&self) -> Guid {
        self.key
    }

    /// Topic this reader subscribes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Drain queued samples.
    ///
    /// Samples from members excluded by the owning member are dropped
    /// here as well, covering samples queued before the admission
    /// decision ran.
    pub fn take(&self) -> Vec<Sample> {
        self.condition.set_trigger(false);
        let mut samples = Vec::new();
        while let Ok(sample) = self.rx.try_recv() {
            if self.owner.excludes(&sample.source) {
                continue;
            }
            samples.push(sample);
        }
        samples
    }

    /// Condition for waitset attachment; triggers on arrival.
    pub fn condition(&self) -> Arc<dyn Condition> {
        Arc::clone(&self.condition) as Arc<dyn Condition>
    }
}

impl Drop for DataReader {
    fn drop(&mut self) {
        self.owner.domain.unregister_reader(self.owner.guid, self.key);
    }
}
