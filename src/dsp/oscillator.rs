//! Sine oscillator with a continuously settable frequency.

use std::f64::consts::TAU;

/// Phase-accumulating sine oscillator. The frequency may change every
/// sample without phase discontinuities.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub frequency: f64,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        Oscillator {
            frequency,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Phase increment per sample.
    fn phase_inc(&self) -> f64 {
        self.frequency / self.sample_rate
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self) -> f64 {
        let sample = (TAU * self.phase).sin();
        self.phase += self.phase_inc();
        self.phase -= self.phase.floor();
        sample
    }
}
