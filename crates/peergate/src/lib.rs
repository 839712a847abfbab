// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # peergate - discovery-gated participant admission control
//!
//! A process joins a shared communication domain, advertises a secret
//! fingerprint through its own presence metadata, and inspects the presence
//! metadata of every peer it discovers to decide whether that peer is
//! trusted. Peers whose fingerprint does not match are excluded from all
//! further communication.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Application Roles                           |
//! |        run_publisher / run_subscriber  (roles module)              |
//! +--------------------------------------------------------------------+
//! |                        Admission Layer                             |
//! |  Fingerprint | presence codec | listeners | AdmissionEngine        |
//! +--------------------------------------------------------------------+
//! |                        Dispatch Layer                              |
//! |  Condition | WaitSet | CancelToken | DispatchLoop                  |
//! +--------------------------------------------------------------------+
//! |                        Bus Layer                                   |
//! |  DomainRegistry | Member | builtin readers | DataWriter/DataReader |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peergate::dispatch::CancelToken;
//! use peergate::roles::{self, RoleConfig};
//!
//! fn main() -> peergate::Result<()> {
//!     let cfg = RoleConfig::new(0, 50, "shared secret", "Triangle");
//!     let cancel = CancelToken::new();
//!     let outcome = roles::run_subscriber(&cfg, &cancel, |sample| {
//!         println!("{} bytes", sample.payload.len());
//!     })?;
//!     println!("received {} samples ({:?})", outcome.samples, outcome.state);
//!     Ok(())
//! }
//! ```
//!
//! ## Trust model
//!
//! The fingerprint is a static shared token, not a negotiated credential.
//! It keeps non-cooperating processes out of the data plane; it does not
//! resist a forging adversary, and trust decisions are not persisted
//! across restarts.

/// Accept/exclude decision engine for discovered members.
pub mod admission;
/// In-process transport: domain registry, members, endpoints.
pub mod bus;
/// Discovery records and the per-kind listener set.
pub mod discovery;
/// Conditions, WaitSet, cancellation, and the dispatch loop.
pub mod dispatch;
/// Shared-secret fingerprint derivation.
pub mod fingerprint;
/// Presence metadata (user data) codec.
pub mod presence;
/// Publisher and subscriber role loops.
pub mod roles;

pub use admission::{AdmissionDecision, AdmissionEngine, ExclusionSink};
pub use bus::{DataReader, DataWriter, DomainRegistry, Guid, Member, MemberBuilder, Sample};
pub use discovery::{
    DiscoveredEndpoint, DiscoveredMember, EndpointKind, EndpointLogListener, InstanceHandle,
    MemberGateListener, NewInstanceListener,
};
pub use dispatch::{CancelToken, Condition, DispatchLoop, GuardCondition, LoopState, WaitSet};
pub use fingerprint::{Fingerprint, FINGERPRINT_LEN};

/// Errors returned by peergate operations.
#[derive(Debug)]
pub enum Error {
    /// Generic configuration error (duplicate waitset attachment, bad CLI value).
    Config(String),
    /// Domain ID out of range (0-232).
    InvalidDomainId(u32),
    /// Invalid state for the requested operation (e.g. endpoint on a disabled member).
    InvalidState(String),
    /// Presence metadata does not fit the transport's user-data limit.
    ///
    /// This is fatal at member startup: a smaller fingerprint cannot be
    /// substituted without breaking cross-process comparison.
    UserDataTooLarge {
        /// Length the caller tried to advertise.
        len: usize,
        /// Transport-imposed maximum.
        max: usize,
    },
    /// A bounded wait elapsed with no condition triggered.
    WouldBlock,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidDomainId(id) => {
                write!(f, "Invalid domain_id: {} (must be 0-232)", id)
            }
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::UserDataTooLarge { len, max } => write!(
                f,
                "Presence metadata exceeds transport limit: {} bytes (max {})",
                len, max
            ),
            Error::WouldBlock => write!(f, "Operation would block"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenient alias for API results using the public [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;
