//! # Limitless Control Library for LimitlessLED / MiLight bridges
//!
//! `limitless-control-lib` drives LimitlessLED (MiLight, EasyBulb) wifi bridges
//! over their UDP protocol. It keeps a session with each bridge, funnels
//! every command through a single serializer per bridge, encodes commands
//! for both the legacy (v1-v5) and the v6 protocol, and runs timed
//! animations on groups of bulbs.
//!
//! ## Features
//!
//! - Session handling for v6 bridges: handshake, keep-alive and reconnect
//! - Rate limited, zone-selection aware command queue per bridge
//! - Command sets for white, dimmer, RGBW, RGBWW, WRGB and RGBCCT bulbs and the bridge lamp
//! - Pipelines of stages (transitions, flashes, waits, repeats, callbacks) run per group
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use limitless_control_lib::bridge::{Bridge, BridgeConfig};
//! use limitless_control_lib::group::TransitionTarget;
//! use limitless_control_lib::led::color::RGB;
//! use limitless_control_lib::pipeline::Pipeline;
//! use limitless_control_lib::protocol::LedType;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = Bridge::connect("192.168.1.50", BridgeConfig::default()).await?;
//!     let kitchen = bridge.add_group(1, "kitchen", LedType::Rgbww)?;
//!
//!     kitchen.turn_on().await?;
//!     kitchen.set_brightness(0.8).await?;
//!
//!     let fade = Pipeline::new()
//!         .color(RGB::RED)
//!         .transition(Duration::from_secs(3), TransitionTarget::default().color(RGB::BLUE));
//!     kitchen.enqueue(fade)?;
//!
//!     bridge.finish().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Disclaimer
//!
//! This project is not affiliated with, authorized by, endorsed by, or in any way officially connected
//! with LimitlessLED, MiLight or their affiliates.

// The `bridge` module owns the UDP socket of a bridge: the serializer task,
// the v6 keep-alive, bridge configuration and status reporting.
pub mod bridge;

pub mod error;

// The `group` module turns property changes on a zone into commands and runs
// pipelines and transitions for it.
pub mod group;

// Color model shared by groups and the command line tool.
pub mod led;

pub mod pipeline;

pub mod presets;

// The `protocol` module holds the per-generation command sets and frame
// encoders. It performs no I/O.
pub mod protocol;

pub mod registry;

pub mod util;

pub use bridge::{Bridge, BridgeConfig, BridgeStatus, SessionState};
pub use error::{Error, Result};
pub use group::{Group, TransitionTarget};
pub use pipeline::Pipeline;
pub use protocol::LedType;
