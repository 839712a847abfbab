// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher and subscriber role loops.
//!
//! Both roles follow the same setup order, which is what makes the
//! admission guarantee hold: derive and encode the fingerprint (failing
//! fast if it does not fit the transport limit, before any domain join),
//! build the member with the metadata attached, install every discovery
//! listener, and only then enable the member. Discovery for a remote
//! member is therefore always dispatched before that member's data.

use crate::bus::{Member, Sample, MAX_USER_DATA_LEN};
use crate::discovery::{
    EndpointKind, EndpointLogListener, MemberGateListener, NewInstanceListener,
};
use crate::dispatch::{CancelToken, DispatchLoop, LoopState};
use crate::fingerprint::Fingerprint;
use crate::{presence, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by both roles.
#[derive(Debug, Clone)]
pub struct RoleConfig {
    /// Domain to join.
    pub domain_id: u32,
    /// Samples to write (publisher) or receive (subscriber) before the
    /// loop reaches [`LoopState::Done`].
    pub sample_count: u32,
    /// Shared secret the fingerprint is derived from. Injected, never a
    /// baked-in constant.
    pub secret: String,
    /// Data-plane topic name.
    pub topic: String,
    /// Publisher pacing between writes.
    pub write_period: Duration,
}

impl RoleConfig {
    /// Config with the default one-second write pacing.
    pub fn new(domain_id: u32, sample_count: u32, secret: &str, topic: &str) -> Self {
        Self {
            domain_id,
            sample_count,
            secret: secret.to_string(),
            topic: topic.to_string(),
            write_period: Duration::from_secs(1),
        }
    }

    /// Override the publisher pacing (tests use short periods).
    pub fn with_write_period(mut self, period: Duration) -> Self {
        self.write_period = period;
        self
    }
}

/// How a role run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleOutcome {
    /// Terminal loop state: `Done` (target reached) or `ShuttingDown`
    /// (external cancellation).
    pub state: LoopState,
    /// Samples written or received.
    pub samples: u32,
}

/// Derive the fingerprint and encode it for advertisement.
///
/// # Errors
///
/// [`crate::Error::UserDataTooLarge`] when the fingerprint exceeds
/// `max_len`; the caller must abort before joining the domain.
pub fn advertise(secret: &str, max_len: usize) -> Result<(Fingerprint, Vec<u8>)> {
    let fp = Fingerprint::derive(secret);
    let user_data = presence::encode(&fp, max_len)?;
    Ok((fp, user_data))
}

fn gated_member(
    name: &str,
    cfg: &RoleConfig,
    fp: Fingerprint,
    user_data: Vec<u8>,
    dispatch: &mut DispatchLoop,
    watch: EndpointKind,
) -> Result<Arc<Member>> {
    let member = Arc::new(
        Member::builder(name)
            .domain_id(cfg.domain_id)
            .user_data(user_data)
            .build()?,
    );

    // Member gate first: admission is decided before anything else
    // dispatched from the same wake-up.
    let members = member.builtin_members();
    let mut gate = MemberGateListener::new(fp, Arc::clone(&member));
    dispatch.register(
        members.condition(),
        Box::new(move || gate.on_new_instances(members.take_new())),
    )?;

    let endpoints = match watch {
        EndpointKind::Writer => member.builtin_publications(),
        EndpointKind::Reader => member.builtin_subscriptions(),
    };
    let mut endpoint_log = EndpointLogListener::new();
    dispatch.register(
        endpoints.condition(),
        Box::new(move || endpoint_log.on_new_instances(endpoints.take_new())),
    )?;

    member.enable()?;
    Ok(member)
}

/// Run the publisher role: write one sample per period until the target
/// count or cancellation, servicing discovery listeners in between.
///
/// `sample` produces the payload for sample number `n`.
pub fn run_publisher(
    cfg: &RoleConfig,
    cancel: &CancelToken,
    mut sample: impl FnMut(u32) -> Vec<u8>,
) -> Result<RoleOutcome> {
    let (fp, user_data) = advertise(&cfg.secret, MAX_USER_DATA_LEN)?;
    let mut dispatch = DispatchLoop::new(cancel.clone());
    // The publisher watches remote subscriber endpoints.
    let member = gated_member(
        "publisher",
        cfg,
        fp,
        user_data,
        &mut dispatch,
        EndpointKind::Reader,
    )?;
    let writer = member.create_writer(&cfg.topic)?;

    let mut written = 0u32;
    while written < cfg.sample_count {
        if cancel.is_cancelled() {
            return Ok(RoleOutcome {
                state: LoopState::ShuttingDown,
                samples: written,
            });
        }
        log::info!("[PUBLISHER] writing {}, count {}", cfg.topic, written);
        writer.write(&sample(written))?;
        written += 1;
        dispatch.drive_for(cfg.write_period)?;
    }

    Ok(RoleOutcome {
        state: LoopState::Done,
        samples: written,
    })
}

/// Run the subscriber role: count received samples until the target count
/// or cancellation.
///
/// `on_sample` observes each delivered sample (typically decode and
/// print).
pub fn run_subscriber(
    cfg: &RoleConfig,
    cancel: &CancelToken,
    mut on_sample: impl FnMut(&Sample) + 'static,
) -> Result<RoleOutcome> {
    let (fp, user_data) = advertise(&cfg.secret, MAX_USER_DATA_LEN)?;
    let mut dispatch = DispatchLoop::new(cancel.clone());
    // The subscriber watches remote publisher endpoints.
    let member = gated_member(
        "subscriber",
        cfg,
        fp,
        user_data,
        &mut dispatch,
        EndpointKind::Writer,
    )?;
    let reader = member.create_reader(&cfg.topic)?;

    let received = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&received);
    dispatch.register(
        reader.condition(),
        Box::new(move || {
            for sample in reader.take() {
                counter.fetch_add(1, Ordering::SeqCst);
                on_sample(&sample);
            }
            Ok(())
        }),
    )?;

    let target = cfg.sample_count;
    let progress = Arc::clone(&received);
    let state = dispatch.run(move || progress.load(Ordering::SeqCst) >= target)?;

    Ok(RoleOutcome {
        state,
        samples: received.load(Ordering::SeqCst),
    })
}
