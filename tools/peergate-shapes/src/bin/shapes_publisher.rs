// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shapes publisher: joins the domain, gates discovered peers by
//! fingerprint, and writes one triangle per second.

use clap::Parser;
use peergate::roles::{self, RoleConfig};
use peergate_shapes::{cancel_on_ctrlc, Args, ShapeType, SHAPE_TOPIC};

fn main() {
    let args = Args::parse();
    args.init_logging();
    let cancel = cancel_on_ctrlc();

    let cfg = RoleConfig::new(args.domain_id, args.sample_count, &args.secret, SHAPE_TOPIC);
    match roles::run_publisher(&cfg, &cancel, |n| ShapeType::demo(n).encode()) {
        Ok(outcome) => {
            log::info!(
                "[PUBLISHER] done: wrote {} samples ({:?})",
                outcome.samples,
                outcome.state
            );
        }
        Err(e) => {
            eprintln!("shapes-publisher: {}", e);
            std::process::exit(1);
        }
    }
}
