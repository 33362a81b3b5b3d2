//! Ready made pipelines.

use std::time::Duration;

use crate::group::TransitionTarget;
use crate::led::color::RGB;
use crate::pipeline::Pipeline;

/// Flash red until stopped.
pub fn alarm() -> Pipeline {
    Pipeline::new()
        .on()
        .color(RGB::RED)
        .flash(Duration::ZERO)
        .repeat(None, 1)
}

/// Fade red, green, blue, ten seconds each, until stopped.
pub fn colorloop() -> Pipeline {
    let leg = Duration::from_secs(10);
    Pipeline::new()
        .on()
        .transition(leg, TransitionTarget::default().color(RGB::RED))
        .transition(leg, TransitionTarget::default().color(RGB::GREEN))
        .transition(leg, TransitionTarget::default().color(RGB::BLUE))
        .repeat(None, 3)
}
