//! Offline software backend.
//!
//! Every context created here is rendered sample by sample when the backend
//! is asked for output, like a sound card pulling from all open contexts.
//! Used for previews, the CLI renderer, and tests that need real audio.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::{AudioBackend, AudioContext, Input, NodeId, ParamId, ParamKind};
use crate::dsp::oscillator::Oscillator;
use crate::dsp::param::AutomationParam;
use crate::error::ToneError;

/// Frames rendered between automation housekeeping passes.
pub const RENDER_QUANTUM: usize = 128;

#[derive(Debug, Clone)]
enum NodeKind {
    Oscillator {
        osc: Oscillator,
        frequency: AutomationParam,
        started: bool,
        stopped: bool,
    },
    Gain {
        gain: AutomationParam,
    },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    /// Nodes feeding this node's audio input.
    inputs: Vec<NodeId>,
    /// Nodes feeding this node's gain parameter.
    gain_inputs: Vec<NodeId>,
}

/// The render state of one context.
#[derive(Debug)]
struct Graph {
    sample_rate: f64,
    frame: u64,
    nodes: Vec<Node>,
    destination_inputs: Vec<NodeId>,
    closed: bool,
}

impl Graph {
    fn time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ToneError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| ToneError::Graph(format!("unknown node {}", id.0)))
    }

    fn param_mut(&mut self, param: ParamId) -> Result<&mut AutomationParam, ToneError> {
        if self.closed {
            return Err(ToneError::Graph("context is closed".into()));
        }
        match (&mut self.node_mut(param.node)?.kind, param.kind) {
            (NodeKind::Oscillator { frequency, .. }, ParamKind::Frequency) => Ok(frequency),
            (NodeKind::Gain { gain }, ParamKind::Gain) => Ok(gain),
            _ => Err(ToneError::Graph(format!("node {} has no {:?} parameter", param.node.0, param.kind))),
        }
    }

    /// Render `frames` samples and add them into `out`.
    fn render_into(&mut self, out: &mut [f32]) {
        let mut values: Vec<Option<f64>> = vec![None; self.nodes.len()];
        // Wiring cannot change while the context is borrowed for rendering
        let destinations = std::mem::take(&mut self.destination_inputs);
        for (i, slot) in out.iter_mut().enumerate() {
            if i % RENDER_QUANTUM == 0 {
                let now = self.time();
                for node in &mut self.nodes {
                    match &mut node.kind {
                        NodeKind::Oscillator { frequency, .. } => frequency.prune_before(now),
                        NodeKind::Gain { gain } => gain.prune_before(now),
                    }
                }
            }
            let t = self.time();
            values.iter_mut().for_each(|v| *v = None);

            for (idx, node) in self.nodes.iter_mut().enumerate() {
                if let NodeKind::Oscillator { osc, frequency, started, stopped } = &mut node.kind {
                    values[idx] = Some(if *started && !*stopped {
                        osc.frequency = frequency.value_at(t);
                        osc.next_sample()
                    } else {
                        0.0
                    });
                }
            }

            let mut sum = 0.0;
            for id in &destinations {
                sum += self.eval(*id, t, &mut values);
            }
            *slot += sum as f32;
            self.frame += 1;
        }
        self.destination_inputs = destinations;
    }

    /// Output of a node at time `t`. Oscillators must already be in `values`.
    fn eval(&self, id: NodeId, t: f64, values: &mut [Option<f64>]) -> f64 {
        if let Some(v) = values[id.0] {
            return v;
        }
        let node = &self.nodes[id.0];
        let v = match &node.kind {
            NodeKind::Oscillator { .. } => 0.0,
            NodeKind::Gain { gain } => {
                let input: f64 = node.inputs.iter().map(|i| self.eval(*i, t, values)).sum();
                let modulation: f64 = node.gain_inputs.iter().map(|i| self.eval(*i, t, values)).sum();
                input * (gain.value_at(t) + modulation)
            }
        };
        values[id.0] = Some(v);
        v
    }
}

/// Context handle given to the engine. Shares its render state with the
/// backend that created it.
#[derive(Debug, Clone)]
pub struct OfflineContext {
    graph: Rc<RefCell<Graph>>,
}

impl AudioContext for OfflineContext {
    fn current_time(&self) -> f64 {
        self.graph.borrow().time()
    }

    fn create_oscillator(&mut self, frequency: f64) -> Result<NodeId, ToneError> {
        let sample_rate = self.graph.borrow().sample_rate;
        self.push_node(NodeKind::Oscillator {
            osc: Oscillator::new(frequency, sample_rate),
            frequency: AutomationParam::new(frequency),
            started: false,
            stopped: false,
        })
    }

    fn create_gain(&mut self, gain: f64) -> Result<NodeId, ToneError> {
        self.push_node(NodeKind::Gain { gain: AutomationParam::new(gain) })
    }

    fn connect(&mut self, from: NodeId, to: Input) -> Result<(), ToneError> {
        let mut graph = self.graph.borrow_mut();
        if graph.closed {
            return Err(ToneError::Graph("context is closed".into()));
        }
        graph.node_mut(from)?;
        match to {
            Input::Destination => graph.destination_inputs.push(from),
            Input::Node(target) => {
                let node = graph.node_mut(target)?;
                if !matches!(node.kind, NodeKind::Gain { .. }) {
                    return Err(ToneError::Graph(format!("node {} has no audio input", target.0)));
                }
                node.inputs.push(from);
            }
            Input::Param(param) => {
                if param.kind != ParamKind::Gain {
                    return Err(ToneError::Graph("only gain parameters accept audio inputs".into()));
                }
                match &mut graph.node_mut(param.node)?.kind {
                    NodeKind::Gain { .. } => {}
                    NodeKind::Oscillator { .. } => {
                        return Err(ToneError::Graph(format!("node {} has no gain parameter", param.node.0)));
                    }
                }
                graph.node_mut(param.node)?.gain_inputs.push(from);
            }
        }
        Ok(())
    }

    fn set_value_at_time(&mut self, param: ParamId, value: f64, time: f64) -> Result<(), ToneError> {
        self.graph.borrow_mut().param_mut(param)?.set_value_at_time(value, time);
        Ok(())
    }

    fn linear_ramp_to_value_at_time(
        &mut self,
        param: ParamId,
        value: f64,
        end_time: f64,
    ) -> Result<(), ToneError> {
        self.graph.borrow_mut().param_mut(param)?.linear_ramp_to_value_at_time(value, end_time);
        Ok(())
    }

    fn hold_at_time(&mut self, param: ParamId, time: f64) -> Result<(), ToneError> {
        self.graph.borrow_mut().param_mut(param)?.hold_at_time(time);
        Ok(())
    }

    fn start(&mut self, oscillator: NodeId) -> Result<(), ToneError> {
        let mut graph = self.graph.borrow_mut();
        match &mut graph.node_mut(oscillator)?.kind {
            NodeKind::Oscillator { started, .. } => {
                *started = true;
                Ok(())
            }
            NodeKind::Gain { .. } => Err(ToneError::Graph(format!("node {} is not an oscillator", oscillator.0))),
        }
    }

    fn stop(&mut self, oscillator: NodeId) -> Result<(), ToneError> {
        let mut graph = self.graph.borrow_mut();
        if graph.closed {
            return Err(ToneError::AlreadyStopped);
        }
        match &mut graph.node_mut(oscillator)?.kind {
            NodeKind::Oscillator { stopped: true, .. } => Err(ToneError::AlreadyStopped),
            NodeKind::Oscillator { stopped, .. } => {
                *stopped = true;
                Ok(())
            }
            NodeKind::Gain { .. } => Err(ToneError::Graph(format!("node {} is not an oscillator", oscillator.0))),
        }
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), ToneError> {
        let mut graph = self.graph.borrow_mut();
        graph.node_mut(node)?;
        graph.destination_inputs.retain(|id| *id != node);
        for n in &mut graph.nodes {
            n.inputs.retain(|id| *id != node);
            n.gain_inputs.retain(|id| *id != node);
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut graph = self.graph.borrow_mut();
        if !graph.closed {
            trace!(frame = graph.frame, "offline context closed");
            graph.closed = true;
        }
    }
}

impl OfflineContext {
    fn push_node(&mut self, kind: NodeKind) -> Result<NodeId, ToneError> {
        let mut graph = self.graph.borrow_mut();
        if graph.closed {
            return Err(ToneError::Graph("context is closed".into()));
        }
        graph.nodes.push(Node {
            kind,
            inputs: Vec::new(),
            gain_inputs: Vec::new(),
        });
        Ok(NodeId(graph.nodes.len() - 1))
    }
}

/// Software "sound card" that renders every open context it created.
#[derive(Debug, Clone)]
pub struct OfflineBackend {
    sample_rate: f64,
    graphs: Rc<RefCell<Vec<Rc<RefCell<Graph>>>>>,
}

impl OfflineBackend {
    pub fn new(sample_rate: f64) -> Self {
        OfflineBackend {
            sample_rate,
            graphs: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of contexts that have not been closed.
    pub fn open_contexts(&self) -> usize {
        self.graphs.borrow().iter().filter(|g| !g.borrow().closed).count()
    }

    /// Advance every open context by `frames` and return the summed mono mix.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        let mut graphs = self.graphs.borrow_mut();
        graphs.retain(|g| !g.borrow().closed);
        for graph in graphs.iter() {
            graph.borrow_mut().render_into(&mut out);
        }
        out
    }
}

impl AudioBackend for OfflineBackend {
    type Context = OfflineContext;

    fn create_context(&mut self) -> Result<OfflineContext, ToneError> {
        let graph = Rc::new(RefCell::new(Graph {
            sample_rate: self.sample_rate,
            frame: 0,
            nodes: Vec::new(),
            destination_inputs: Vec::new(),
            closed: false,
        }));
        self.graphs.borrow_mut().push(Rc::clone(&graph));
        Ok(OfflineContext { graph })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f32]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len().max(1) as f64).sqrt()
    }

    #[test]
    fn silent_until_started() {
        let mut backend = OfflineBackend::new(8000.0);
        let mut ctx = backend.create_context().unwrap();
        let osc = ctx.create_oscillator(440.0).unwrap();
        ctx.connect(osc, Input::Destination).unwrap();
        assert!(backend.render(800).iter().all(|&s| s == 0.0));

        ctx.start(osc).unwrap();
        assert!(rms(&backend.render(800)) > 0.5);
    }

    #[test]
    fn gain_scales_output() {
        let mut backend = OfflineBackend::new(8000.0);
        let mut ctx = backend.create_context().unwrap();
        let osc = ctx.create_oscillator(200.0).unwrap();
        let gain = ctx.create_gain(0.25).unwrap();
        ctx.connect(osc, Input::Node(gain)).unwrap();
        ctx.connect(gain, Input::Destination).unwrap();
        ctx.start(osc).unwrap();

        let out = backend.render(8000);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.25).abs() < 0.01, "Peak should be ~0.25, got {peak}");
    }

    #[test]
    fn node_output_modulates_gain_param() {
        let mut backend = OfflineBackend::new(8000.0);
        let mut ctx = backend.create_context().unwrap();
        let carrier = ctx.create_oscillator(400.0).unwrap();
        let lfo = ctx.create_oscillator(1.0).unwrap();
        let depth = ctx.create_gain(0.5).unwrap();
        let master = ctx.create_gain(0.0).unwrap();
        ctx.connect(lfo, Input::Node(depth)).unwrap();
        ctx.connect(depth, Input::Param(master.gain())).unwrap();
        ctx.connect(carrier, Input::Node(master)).unwrap();
        ctx.connect(master, Input::Destination).unwrap();
        ctx.start(carrier).unwrap();
        ctx.start(lfo).unwrap();

        // Intrinsic gain is 0, so all output comes from the LFO path
        let out = backend.render(8000);
        assert!(rms(&out) > 0.1, "Modulated master should be audible");
    }

    #[test]
    fn ramps_follow_context_clock() {
        let mut backend = OfflineBackend::new(1000.0);
        let mut ctx = backend.create_context().unwrap();
        let g = ctx.create_gain(1.0).unwrap();
        ctx.set_value_at_time(g.gain(), 0.0, 0.0).unwrap();
        ctx.linear_ramp_to_value_at_time(g.gain(), 1.0, 1.0).unwrap();
        backend.render(500);
        assert!((ctx.current_time() - 0.5).abs() < 1e-12);
        let v = ctx.graph.borrow().nodes[0].kind.clone();
        match v {
            NodeKind::Gain { gain } => assert!((gain.value_at(0.5) - 0.5).abs() < 1e-9),
            _ => panic!("expected gain"),
        }
    }

    #[test]
    fn stop_twice_reports_already_stopped() {
        let mut backend = OfflineBackend::new(8000.0);
        let mut ctx = backend.create_context().unwrap();
        let osc = ctx.create_oscillator(440.0).unwrap();
        ctx.start(osc).unwrap();
        assert!(ctx.stop(osc).is_ok());
        assert_eq!(ctx.stop(osc), Err(ToneError::AlreadyStopped));
    }

    #[test]
    fn closed_context_is_silent_and_dropped() {
        let mut backend = OfflineBackend::new(8000.0);
        let mut ctx = backend.create_context().unwrap();
        let osc = ctx.create_oscillator(440.0).unwrap();
        ctx.connect(osc, Input::Destination).unwrap();
        ctx.start(osc).unwrap();
        assert_eq!(backend.open_contexts(), 1);

        ctx.close();
        ctx.close();
        assert_eq!(backend.open_contexts(), 0);
        assert!(backend.render(100).iter().all(|&s| s == 0.0));
        assert!(ctx.create_gain(1.0).is_err());
    }

    #[test]
    fn oscillator_created_on_shared_context_renders() {
        let mut backend = OfflineBackend::new(8000.0);
        let ctx = backend.create_context().unwrap();
        let mut handle = ctx.clone();
        let osc = handle.create_oscillator(100.0).unwrap();
        handle.connect(osc, Input::Destination).unwrap();
        handle.start(osc).unwrap();
        assert_eq!(osc, NodeId(0));
        assert!(rms(&backend.render(800)) > 0.5);
    }

    #[test]
    fn destinations_survive_repeated_renders() {
        let mut backend = OfflineBackend::new(8000.0);
        let mut ctx = backend.create_context().unwrap();
        let osc = ctx.create_oscillator(200.0).unwrap();
        ctx.connect(osc, Input::Destination).unwrap();
        ctx.start(osc).unwrap();
        for _ in 0..3 {
            assert!(rms(&backend.render(400)) > 0.5);
        }
        assert_eq!(ctx.graph.borrow().destination_inputs, vec![osc]);
    }

    #[test]
    fn contexts_are_mixed() {
        let mut backend = OfflineBackend::new(8000.0);
        for _ in 0..2 {
            let mut ctx = backend.create_context().unwrap();
            let osc = ctx.create_oscillator(100.0).unwrap();
            let g = ctx.create_gain(0.25).unwrap();
            ctx.connect(osc, Input::Node(g)).unwrap();
            ctx.connect(g, Input::Destination).unwrap();
            ctx.start(osc).unwrap();
        }
        let out = backend.render(8000);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.01, "Two in-phase contexts should sum, got {peak}");
    }
}
