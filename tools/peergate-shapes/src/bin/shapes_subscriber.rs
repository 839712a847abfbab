// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shapes subscriber: joins the domain, gates discovered peers by
//! fingerprint, and prints every triangle a trusted publisher writes.

use clap::Parser;
use peergate::roles::{self, RoleConfig};
use peergate_shapes::{cancel_on_ctrlc, Args, ShapeType, SHAPE_TOPIC};

fn main() {
    let args = Args::parse();
    args.init_logging();
    let cancel = cancel_on_ctrlc();

    let cfg = RoleConfig::new(args.domain_id, args.sample_count, &args.secret, SHAPE_TOPIC);
    let result = roles::run_subscriber(&cfg, &cancel, |sample| {
        match ShapeType::decode(&sample.payload) {
            Some(shape) => println!("{}", shape),
            None => log::warn!(
                "[SUBSCRIBER] undecodable sample from {} ({} bytes)",
                sample.source,
                sample.payload.len()
            ),
        }
    });

    match result {
        Ok(outcome) => {
            log::info!(
                "[SUBSCRIBER] done: received {} samples ({:?})",
                outcome.samples,
                outcome.state
            );
        }
        Err(e) => {
            eprintln!("shapes-subscriber: {}", e);
            std::process::exit(1);
        }
    }
}
