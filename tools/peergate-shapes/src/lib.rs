// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared pieces of the shapes demo pair: the payload type, the CLI
//! surface, and logger/Ctrl-C wiring.

use clap::Parser;
use peergate::dispatch::CancelToken;

/// Secret every cooperating demo process is built from. Override with
/// `--secret` to watch a process get excluded.
pub const DEFAULT_SHARED_SECRET: &str =
    "Now is the time for all good men to come to the aid of the party";

/// Data-plane topic the demo pair exchanges shapes on.
pub const SHAPE_TOPIC: &str = "Triangle";

/// Command-line arguments shared by both demo binaries.
#[derive(Parser, Debug)]
pub struct Args {
    /// Domain to join
    #[arg(long, default_value = "0")]
    pub domain_id: u32,

    /// Samples to write/receive before exiting
    #[arg(long, default_value = "50")]
    pub sample_count: u32,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    pub verbosity: String,

    /// Shared secret the fingerprint is derived from
    #[arg(long, default_value = DEFAULT_SHARED_SECRET)]
    pub secret: String,
}

impl Args {
    /// Initialise env_logger from `--verbosity`.
    pub fn init_logging(&self) {
        let level = self
            .verbosity
            .parse::<log::LevelFilter>()
            .unwrap_or(log::LevelFilter::Info);
        env_logger::Builder::new().filter_level(level).init();
    }
}

/// Cancel token wired to Ctrl-C.
pub fn cancel_on_ctrlc() -> CancelToken {
    let cancel = CancelToken::new();
    let handler = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.cancel()) {
        log::warn!("[DEMO] could not install Ctrl-C handler: {}", e);
    }
    cancel
}

/// The demo payload (the original DDS shapes type, extended variant).
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeType {
    pub color: String,
    pub x: i32,
    pub y: i32,
    pub shapesize: i32,
    pub fillkind: u32,
    pub angle: f32,
}

impl ShapeType {
    /// Demo sample for write number `n`: a blue triangle wandering across
    /// the canvas.
    pub fn demo(n: u32) -> Self {
        Self {
            color: "BLUE".to_string(),
            x: (n as i32 * 5) % 240,
            y: (n as i32 * 3) % 270,
            shapesize: 30,
            fillkind: 0,
            angle: (n as f32 * 15.0) % 360.0,
        }
    }

    /// Encode as length-prefixed color plus little-endian fields.
    pub fn encode(&self) -> Vec<u8> {
        let color = self.color.as_bytes();
        let mut buf = Vec::with_capacity(4 + color.len() + 20);
        buf.extend_from_slice(&(color.len() as u32).to_le_bytes());
        buf.extend_from_slice(color);
        buf.extend_from_slice(&self.x.to_le_bytes());
        buf.extend_from_slice(&self.y.to_le_bytes());
        buf.extend_from_slice(&self.shapesize.to_le_bytes());
        buf.extend_from_slice(&self.fillkind.to_le_bytes());
        buf.extend_from_slice(&self.angle.to_le_bytes());
        buf
    }

    /// Decode a buffer produced by [`ShapeType::encode`]. `None` on a
    /// truncated or malformed buffer.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        fn word(buf: &[u8], offset: &mut usize) -> Option<[u8; 4]> {
            let bytes = buf.get(*offset..*offset + 4)?.try_into().ok()?;
            *offset += 4;
            Some(bytes)
        }

        let mut offset = 0;
        let color_len = u32::from_le_bytes(word(buf, &mut offset)?) as usize;
        let color = String::from_utf8(buf.get(4..4 + color_len)?.to_vec()).ok()?;
        offset += color_len;
        Some(Self {
            color,
            x: i32::from_le_bytes(word(buf, &mut offset)?),
            y: i32::from_le_bytes(word(buf, &mut offset)?),
            shapesize: i32::from_le_bytes(word(buf, &mut offset)?),
            fillkind: u32::from_le_bytes(word(buf, &mut offset)?),
            angle: f32::from_le_bytes(word(buf, &mut offset)?),
        })
    }
}

impl std::fmt::Display for ShapeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} x={} y={} size={} angle={}",
            self.color, self.x, self.y, self.shapesize, self.angle
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_round_trips() {
        let shape = ShapeType::demo(7);
        assert_eq!(ShapeType::decode(&shape.encode()), Some(shape));
    }

    #[test]
    fn truncated_buffer_decodes_to_none() {
        let buf = ShapeType::demo(1).encode();
        assert_eq!(ShapeType::decode(&buf[..buf.len() - 1]), None);
        assert_eq!(ShapeType::decode(&[]), None);
    }
}
