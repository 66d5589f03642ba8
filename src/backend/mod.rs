//! Audio backends: the capability surface the tone engine builds on.
//!
//! The engine only ever talks to an [`AudioContext`]: it creates sine
//! oscillators and gain stages, wires them together, and automates their
//! parameters on the context's own clock. Parameter semantics follow
//! WebAudio: the computed value of a parameter is its automation value plus
//! the sum of every node output connected to it.

pub mod offline;
pub mod recording;
#[cfg(target_arch = "wasm32")]
pub mod web;

use crate::error::ToneError;

/// Handle to a node inside one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Frequency,
    Gain,
}

/// An automatable parameter of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId {
    pub node: NodeId,
    pub kind: ParamKind,
}

impl NodeId {
    pub fn gain(self) -> ParamId {
        ParamId { node: self, kind: ParamKind::Gain }
    }

    pub fn frequency(self) -> ParamId {
        ParamId { node: self, kind: ParamKind::Frequency }
    }
}

/// Where a node's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Node(NodeId),
    Param(ParamId),
    Destination,
}

/// One live audio processing context.
pub trait AudioContext {
    /// Seconds on the context's monotonic clock. Starts at 0.
    fn current_time(&self) -> f64;

    /// Create a sine oscillator. It is silent until [`AudioContext::start`].
    fn create_oscillator(&mut self, frequency: f64) -> Result<NodeId, ToneError>;

    fn create_gain(&mut self, gain: f64) -> Result<NodeId, ToneError>;

    fn connect(&mut self, from: NodeId, to: Input) -> Result<(), ToneError>;

    fn set_value_at_time(&mut self, param: ParamId, value: f64, time: f64) -> Result<(), ToneError>;

    /// Ramp linearly from the previous automation event to `value` at `end_time`.
    fn linear_ramp_to_value_at_time(
        &mut self,
        param: ParamId,
        value: f64,
        end_time: f64,
    ) -> Result<(), ToneError>;

    /// Drop every automation event after `time` and pin the value the
    /// parameter has at `time`. A ramp scheduled next starts from there.
    fn hold_at_time(&mut self, param: ParamId, time: f64) -> Result<(), ToneError>;

    fn start(&mut self, oscillator: NodeId) -> Result<(), ToneError>;

    /// Stop an oscillator. Returns [`ToneError::AlreadyStopped`] if the
    /// platform already stopped it.
    fn stop(&mut self, oscillator: NodeId) -> Result<(), ToneError>;

    fn disconnect(&mut self, node: NodeId) -> Result<(), ToneError>;

    /// Release the context. Calling it twice is harmless.
    fn close(&mut self);
}

/// Factory for audio contexts on one platform.
pub trait AudioBackend {
    type Context: AudioContext;

    fn create_context(&mut self) -> Result<Self::Context, ToneError>;
}
