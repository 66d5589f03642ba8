//! Recording backend, a silent test double with a hand-driven clock.
//!
//! Every call made on a context is appended to a shared journal so tests
//! can assert on the exact automation the engine scheduled, and on which
//! contexts are still open. Cloning the backend shares the journal and the
//! clock, so a test keeps one clone while the engine owns the other.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use super::{AudioBackend, AudioContext, Input, NodeId, ParamId};
use crate::error::ToneError;

/// A clock advanced by hand. Contexts read it relative to their creation.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        self.now.get()
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

/// One recorded context call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateOscillator { node: NodeId, frequency: f64 },
    CreateGain { node: NodeId, gain: f64 },
    Connect { from: NodeId, to: Input },
    SetValue { param: ParamId, value: f64, time: f64 },
    LinearRamp { param: ParamId, value: f64, end_time: f64 },
    Hold { param: ParamId, time: f64 },
    Start(NodeId),
    Stop(NodeId),
    Disconnect(NodeId),
    Close,
}

#[derive(Debug, Default)]
struct ContextRecord {
    created_at: f64,
    calls: Vec<Call>,
    next_node: usize,
    stopped: HashSet<NodeId>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Journal {
    contexts: Vec<ContextRecord>,
    unavailable: bool,
    fail_next_context: Option<String>,
    /// Node creations allowed before node creation starts failing.
    node_budget: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    clock: ManualClock,
    journal: Rc<RefCell<Journal>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend for a runtime with no audio at all.
    pub fn unavailable() -> Self {
        let backend = Self::default();
        backend.journal.borrow_mut().unavailable = true;
        backend
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Make the next `create_context` fail with a context acquisition error.
    pub fn fail_next_context(&self, reason: &str) {
        self.journal.borrow_mut().fail_next_context = Some(reason.to_string());
    }

    /// Allow only `count` more node creations across all contexts.
    pub fn limit_nodes(&self, count: usize) {
        self.journal.borrow_mut().node_budget = Some(count);
    }

    /// Simulate the platform stopping a node behind the engine's back.
    pub fn stop_externally(&self, context: usize, node: NodeId) {
        if let Some(record) = self.journal.borrow_mut().contexts.get_mut(context) {
            record.stopped.insert(node);
        }
    }

    /// Contexts ever created.
    pub fn context_count(&self) -> usize {
        self.journal.borrow().contexts.len()
    }

    /// Contexts created and not yet closed.
    pub fn open_contexts(&self) -> usize {
        self.journal.borrow().contexts.iter().filter(|c| !c.closed).count()
    }

    pub fn is_closed(&self, context: usize) -> bool {
        self.journal.borrow().contexts.get(context).is_some_and(|c| c.closed)
    }

    pub fn calls(&self, context: usize) -> Vec<Call> {
        self.journal
            .borrow()
            .contexts
            .get(context)
            .map(|c| c.calls.clone())
            .unwrap_or_default()
    }

    /// Oscillators created in a context, in creation order.
    pub fn oscillators(&self, context: usize) -> Vec<NodeId> {
        self.calls(context)
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateOscillator { node, .. } => Some(node),
                _ => None,
            })
            .collect()
    }

    /// Oscillators that were started and are not stopped yet.
    pub fn running_oscillators(&self, context: usize) -> Vec<NodeId> {
        let journal = self.journal.borrow();
        let Some(record) = journal.contexts.get(context) else {
            return Vec::new();
        };
        record
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Start(node) if !record.stopped.contains(node) => Some(*node),
                _ => None,
            })
            .collect()
    }

    /// Most recent automation target scheduled on `param`.
    pub fn last_target(&self, context: usize, param: ParamId) -> Option<f64> {
        self.calls(context).into_iter().rev().find_map(|c| match c {
            Call::SetValue { param: p, value, .. } | Call::LinearRamp { param: p, value, .. } if p == param => {
                Some(value)
            }
            _ => None,
        })
    }
}

pub struct RecordingContext {
    index: usize,
    clock: ManualClock,
    journal: Rc<RefCell<Journal>>,
}

impl RecordingContext {
    fn record(&self, call: Call) -> Result<(), ToneError> {
        let mut journal = self.journal.borrow_mut();
        let record = &mut journal.contexts[self.index];
        if record.closed {
            return Err(ToneError::Graph("context is closed".into()));
        }
        record.calls.push(call);
        Ok(())
    }

    fn new_node(&mut self) -> Result<NodeId, ToneError> {
        let mut journal = self.journal.borrow_mut();
        if let Some(budget) = journal.node_budget.as_mut() {
            if *budget == 0 {
                return Err(ToneError::Graph("node limit reached".into()));
            }
            *budget -= 1;
        }
        let record = &mut journal.contexts[self.index];
        if record.closed {
            return Err(ToneError::Graph("context is closed".into()));
        }
        let node = NodeId(record.next_node);
        record.next_node += 1;
        Ok(node)
    }
}

impl AudioContext for RecordingContext {
    fn current_time(&self) -> f64 {
        let created_at = self.journal.borrow().contexts[self.index].created_at;
        (self.clock.now() - created_at).max(0.0)
    }

    fn create_oscillator(&mut self, frequency: f64) -> Result<NodeId, ToneError> {
        let node = self.new_node()?;
        self.record(Call::CreateOscillator { node, frequency })?;
        Ok(node)
    }

    fn create_gain(&mut self, gain: f64) -> Result<NodeId, ToneError> {
        let node = self.new_node()?;
        self.record(Call::CreateGain { node, gain })?;
        Ok(node)
    }

    fn connect(&mut self, from: NodeId, to: Input) -> Result<(), ToneError> {
        self.record(Call::Connect { from, to })
    }

    fn set_value_at_time(&mut self, param: ParamId, value: f64, time: f64) -> Result<(), ToneError> {
        self.record(Call::SetValue { param, value, time })
    }

    fn linear_ramp_to_value_at_time(
        &mut self,
        param: ParamId,
        value: f64,
        end_time: f64,
    ) -> Result<(), ToneError> {
        self.record(Call::LinearRamp { param, value, end_time })
    }

    fn hold_at_time(&mut self, param: ParamId, time: f64) -> Result<(), ToneError> {
        self.record(Call::Hold { param, time })
    }

    fn start(&mut self, oscillator: NodeId) -> Result<(), ToneError> {
        self.record(Call::Start(oscillator))
    }

    fn stop(&mut self, oscillator: NodeId) -> Result<(), ToneError> {
        let mut journal = self.journal.borrow_mut();
        let record = &mut journal.contexts[self.index];
        if record.closed || !record.stopped.insert(oscillator) {
            return Err(ToneError::AlreadyStopped);
        }
        record.calls.push(Call::Stop(oscillator));
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), ToneError> {
        self.record(Call::Disconnect(node))
    }

    fn close(&mut self) {
        let mut journal = self.journal.borrow_mut();
        let record = &mut journal.contexts[self.index];
        if !record.closed {
            record.calls.push(Call::Close);
            record.closed = true;
        }
    }
}

impl AudioBackend for RecordingBackend {
    type Context = RecordingContext;

    fn create_context(&mut self) -> Result<RecordingContext, ToneError> {
        let mut journal = self.journal.borrow_mut();
        if journal.unavailable {
            return Err(ToneError::PlatformUnavailable);
        }
        if let Some(reason) = journal.fail_next_context.take() {
            return Err(ToneError::ContextAcquisition(reason));
        }
        journal.contexts.push(ContextRecord {
            created_at: self.clock.now(),
            ..ContextRecord::default()
        });
        Ok(RecordingContext {
            index: journal.contexts.len() - 1,
            clock: self.clock.clone(),
            journal: Rc::clone(&self.journal),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_clock_starts_at_zero() {
        let mut backend = RecordingBackend::new();
        backend.clock().set(5.0);
        let ctx = backend.create_context().unwrap();
        assert_eq!(ctx.current_time(), 0.0);
        backend.clock().advance(1.5);
        assert_eq!(ctx.current_time(), 1.5);
    }

    #[test]
    fn records_calls_in_order() {
        let mut backend = RecordingBackend::new();
        let mut ctx = backend.create_context().unwrap();
        let osc = ctx.create_oscillator(432.0).unwrap();
        let gain = ctx.create_gain(0.5).unwrap();
        ctx.connect(osc, Input::Node(gain)).unwrap();
        ctx.start(osc).unwrap();

        assert_eq!(
            backend.calls(0),
            vec![
                Call::CreateOscillator { node: osc, frequency: 432.0 },
                Call::CreateGain { node: gain, gain: 0.5 },
                Call::Connect { from: osc, to: Input::Node(gain) },
                Call::Start(osc),
            ]
        );
        assert_eq!(backend.running_oscillators(0), vec![osc]);
    }

    #[test]
    fn second_stop_is_already_stopped() {
        let mut backend = RecordingBackend::new();
        let mut ctx = backend.create_context().unwrap();
        let osc = ctx.create_oscillator(432.0).unwrap();
        ctx.start(osc).unwrap();
        backend.stop_externally(0, osc);
        assert_eq!(ctx.stop(osc), Err(ToneError::AlreadyStopped));
        assert!(backend.running_oscillators(0).is_empty());
    }

    #[test]
    fn closed_context_rejects_calls() {
        let mut backend = RecordingBackend::new();
        let mut ctx = backend.create_context().unwrap();
        ctx.close();
        ctx.close();
        assert!(backend.is_closed(0));
        assert_eq!(backend.open_contexts(), 0);
        assert!(ctx.create_gain(1.0).is_err());
        assert_eq!(backend.calls(0), vec![Call::Close]);
    }

    #[test]
    fn failure_modes() {
        let mut backend = RecordingBackend::unavailable();
        assert!(matches!(backend.create_context(), Err(ToneError::PlatformUnavailable)));

        let mut backend = RecordingBackend::new();
        backend.fail_next_context("denied");
        assert!(matches!(backend.create_context(), Err(ToneError::ContextAcquisition(_))));
        assert!(backend.create_context().is_ok());
        assert_eq!(backend.context_count(), 1);
    }
}
