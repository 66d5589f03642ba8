//! Slow sinusoidal detune of the fundamental.

use std::f64::consts::TAU;

use tracing::debug;

use crate::backend::{AudioContext, ParamId};

/// The drift process of one graph. Each tick writes the fundamental's
/// frequency directly (no ramp) at the context's current time.
#[derive(Debug, Clone)]
pub struct DriftProcess {
    target: ParamId,
    base_hz: f64,
    amplitude_hz: f64,
    rate_hz: f64,
    active: bool,
}

impl DriftProcess {
    pub fn new(target: ParamId, base_hz: f64, amplitude_hz: f64, rate_hz: f64) -> Self {
        DriftProcess {
            target,
            base_hz,
            amplitude_hz,
            rate_hz,
            active: true,
        }
    }

    /// Frequency the fundamental should have at context time `t`.
    pub fn frequency_at(&self, t: f64) -> f64 {
        self.base_hz + self.amplitude_hz * (TAU * self.rate_hz * t).sin()
    }

    /// Write one drift sample. Returns the frequency written, or `None` once
    /// the process has stopped. A rejected write (closed context) stops the
    /// process for good.
    pub fn tick<C: AudioContext + ?Sized>(&mut self, ctx: &mut C) -> Option<f64> {
        if !self.active {
            return None;
        }
        let t = ctx.current_time();
        let freq = self.frequency_at(t);
        match ctx.set_value_at_time(self.target, freq, t) {
            Ok(()) => Some(freq),
            Err(e) => {
                debug!(error = %e, "drift stopped: context rejected write");
                self.active = false;
                None
            }
        }
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
