//! The live audio graph of one playback session.
//!
//! ```text
//! partial osc ─▶ partial gain ─┐
//! partial osc ─▶ partial gain ─┼─▶ master gain ─▶ destination
//!        ...                   │        ▲ (gain param)
//! lfo osc ─▶ depth gain ───────┼────────┘
//! ```

use tracing::{debug, trace, warn};

use super::drift::DriftProcess;
use crate::backend::{AudioContext, Input, NodeId};
use crate::config::ToneBankConfig;
use crate::error::ToneError;

#[derive(Debug, Clone, Copy)]
struct PartialStage {
    oscillator: NodeId,
    gain: NodeId,
    relative_gain: f64,
    /// Gain value the stage is at or ramping towards.
    target: f64,
}

#[derive(Debug, Clone, Copy)]
struct ModulationStage {
    oscillator: NodeId,
    depth: NodeId,
    depth_weight: f64,
    target: f64,
}

/// One fully-owned audio context plus every node created in it.
pub struct ToneGraph<C: AudioContext> {
    context: C,
    partials: Vec<PartialStage>,
    modulation: Option<ModulationStage>,
    master: Option<NodeId>,
    drift: Option<DriftProcess>,
    released: bool,
}

impl<C: AudioContext> ToneGraph<C> {
    /// Build and start the graph in `context`. On failure every node created
    /// so far is stopped and the context is closed before returning.
    pub fn build(context: C, config: &ToneBankConfig, volume: f64) -> Result<Self, ToneError> {
        let mut graph = ToneGraph {
            context,
            partials: Vec::with_capacity(config.partials.len()),
            modulation: None,
            master: None,
            drift: None,
            released: false,
        };
        if let Err(e) = graph.wire(config, volume) {
            graph.release();
            return Err(e);
        }
        Ok(graph)
    }

    fn wire(&mut self, config: &ToneBankConfig, volume: f64) -> Result<(), ToneError> {
        let ctx = &mut self.context;
        let now = ctx.current_time();

        for partial in &config.partials {
            let oscillator = ctx.create_oscillator(partial.frequency_hz)?;
            ctx.set_value_at_time(oscillator.frequency(), partial.frequency_hz, now)?;
            let target = volume * partial.relative_gain;
            let gain = ctx.create_gain(target)?;
            ctx.set_value_at_time(gain.gain(), target, now)?;
            ctx.connect(oscillator, Input::Node(gain))?;
            self.partials.push(PartialStage {
                oscillator,
                gain,
                relative_gain: partial.relative_gain,
                target,
            });
        }

        let lfo = ctx.create_oscillator(config.modulation.frequency_hz)?;
        ctx.set_value_at_time(lfo.frequency(), config.modulation.frequency_hz, now)?;
        let depth_target = volume * config.modulation.depth_weight;
        let depth = ctx.create_gain(depth_target)?;
        ctx.set_value_at_time(depth.gain(), depth_target, now)?;
        ctx.connect(lfo, Input::Node(depth))?;
        self.modulation = Some(ModulationStage {
            oscillator: lfo,
            depth,
            depth_weight: config.modulation.depth_weight,
            target: depth_target,
        });

        let master = ctx.create_gain(0.0)?;
        self.master = Some(master);
        for stage in &self.partials {
            ctx.connect(stage.gain, Input::Node(master))?;
        }
        ctx.connect(depth, Input::Param(master.gain()))?;
        ctx.connect(master, Input::Destination)?;

        // All oscillators start at the same instant
        for stage in &self.partials {
            ctx.start(stage.oscillator)?;
        }
        ctx.start(lfo)?;

        // Unity attack envelope, independent of the volume-scaled stages
        ctx.set_value_at_time(master.gain(), 0.0, now)?;
        ctx.linear_ramp_to_value_at_time(master.gain(), 1.0, now + config.fade_in_seconds)?;

        if let Some(fundamental) = self.partials.first() {
            self.drift = Some(DriftProcess::new(
                fundamental.oscillator.frequency(),
                config.base_frequency_hz,
                config.drift_amplitude_hz,
                config.drift_rate_hz,
            ));
        }
        debug!(partials = self.partials.len(), volume, fade_in = config.fade_in_seconds, "tone graph started");
        Ok(())
    }

    pub fn now(&self) -> f64 {
        self.context.current_time()
    }

    /// Advance the drift process one step.
    pub fn tick_drift(&mut self) -> Option<f64> {
        if self.released {
            return None;
        }
        self.drift.as_mut()?.tick(&mut self.context)
    }

    /// Ramp every stage to the new volume over `ramp_seconds`. Each stage is
    /// ramped independently; a failing stage does not hold up the others.
    pub fn ramp_volume(&mut self, volume: f64, ramp_seconds: f64) {
        if self.released {
            return;
        }
        let now = self.context.current_time();
        let end = now + ramp_seconds;
        for stage in &mut self.partials {
            let target = volume * stage.relative_gain;
            match ramp_param(&mut self.context, stage.gain, target, now, end) {
                Ok(()) => stage.target = target,
                Err(e) => warn!(node = stage.gain.0, error = %e, "partial volume ramp failed"),
            }
        }
        if let Some(stage) = self.modulation.as_mut() {
            let target = volume * stage.depth_weight;
            match ramp_param(&mut self.context, stage.depth, target, now, end) {
                Ok(()) => stage.target = target,
                Err(e) => warn!(node = stage.depth.0, error = %e, "modulation depth ramp failed"),
            }
        }
        trace!(volume, end, "volume ramp scheduled");
    }

    /// Start the fade-out from the master's current value, beginning now.
    /// The modulation depth fades with it, since the LFO feeds the master
    /// gain parameter and would otherwise stay audible until release.
    pub fn fade_out(&mut self, seconds: f64) -> Result<(), ToneError> {
        let master = self
            .master
            .ok_or_else(|| ToneError::Graph("graph has no master stage".into()))?;
        let now = self.context.current_time();
        let end = now + seconds;
        ramp_param(&mut self.context, master, 0.0, now, end)?;
        if let Some(stage) = self.modulation.as_mut() {
            match ramp_param(&mut self.context, stage.depth, 0.0, now, end) {
                Ok(()) => stage.target = 0.0,
                Err(e) => warn!(node = stage.depth.0, error = %e, "modulation fade failed"),
            }
        }
        Ok(())
    }

    /// Per-partial gain targets, in config order.
    pub fn partial_targets(&self) -> Vec<f64> {
        self.partials.iter().map(|s| s.target).collect()
    }

    pub fn modulation_target(&self) -> Option<f64> {
        self.modulation.map(|m| m.target)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop drift, stop and disconnect every node, close the context.
    /// Per-node failures are logged and skipped. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(drift) = self.drift.as_mut() {
            drift.cancel();
        }

        let oscillators = self
            .partials
            .iter()
            .map(|s| s.oscillator)
            .chain(self.modulation.map(|m| m.oscillator));
        for osc in oscillators {
            match self.context.stop(osc) {
                Ok(()) | Err(ToneError::AlreadyStopped) => {}
                Err(e) => warn!(node = osc.0, error = %e, "oscillator stop failed"),
            }
        }

        let nodes = self
            .partials
            .iter()
            .flat_map(|s| [s.oscillator, s.gain])
            .chain(self.modulation.iter().flat_map(|m| [m.oscillator, m.depth]))
            .chain(self.master);
        for node in nodes {
            if let Err(e) = self.context.disconnect(node) {
                trace!(node = node.0, error = %e, "disconnect skipped");
            }
        }

        self.context.close();
        self.drift = None;
        debug!("tone graph released");
    }
}

impl<C: AudioContext> Drop for ToneGraph<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Ramp `node`'s gain from whatever it is at `now` to `value` at `end`.
fn ramp_param<C: AudioContext>(
    ctx: &mut C,
    node: NodeId,
    value: f64,
    now: f64,
    end: f64,
) -> Result<(), ToneError> {
    ctx.hold_at_time(node.gain(), now)?;
    ctx.linear_ramp_to_value_at_time(node.gain(), value, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AudioBackend;
    use crate::backend::recording::{Call, RecordingBackend};

    fn build(backend: &mut RecordingBackend, volume: f64) -> ToneGraph<crate::backend::recording::RecordingContext> {
        let ctx = backend.create_context().unwrap();
        ToneGraph::build(ctx, &ToneBankConfig::default(), volume).unwrap()
    }

    #[test]
    fn wires_partials_through_master() {
        let mut backend = RecordingBackend::new();
        let _graph = build(&mut backend, 0.15);
        let calls = backend.calls(0);

        // 4 partials + lfo
        assert_eq!(backend.oscillators(0).len(), 5);
        assert_eq!(backend.running_oscillators(0).len(), 5);

        let master = calls
            .iter()
            .find_map(|c| match c {
                Call::Connect { from, to: Input::Destination } => Some(*from),
                _ => None,
            })
            .expect("master connected to destination");
        let into_master = calls
            .iter()
            .filter(|c| matches!(c, Call::Connect { to: Input::Node(n), .. } if *n == master))
            .count();
        assert_eq!(into_master, 4);
        assert!(
            calls
                .iter()
                .any(|c| matches!(c, Call::Connect { to: Input::Param(p), .. } if *p == master.gain())),
            "LFO depth should drive the master gain parameter"
        );
    }

    #[test]
    fn oscillators_start_together_after_wiring() {
        let mut backend = RecordingBackend::new();
        let _graph = build(&mut backend, 0.15);
        let calls = backend.calls(0);
        let first_start = calls.iter().position(|c| matches!(c, Call::Start(_))).unwrap();
        let last_connect = calls.iter().rposition(|c| matches!(c, Call::Connect { .. })).unwrap();
        assert!(first_start > last_connect);
        let starts = calls[first_start..first_start + 5]
            .iter()
            .all(|c| matches!(c, Call::Start(_)));
        assert!(starts, "All five starts should be consecutive");
    }

    #[test]
    fn master_ramps_to_unity() {
        let mut backend = RecordingBackend::new();
        let graph = build(&mut backend, 0.15);
        let master = graph.master.unwrap();
        let calls = backend.calls(0);
        assert!(calls.contains(&Call::SetValue { param: master.gain(), value: 0.0, time: 0.0 }));
        assert!(calls.contains(&Call::LinearRamp { param: master.gain(), value: 1.0, end_time: 3.0 }));
    }

    #[test]
    fn failed_build_releases_partial_graph() {
        let mut backend = RecordingBackend::new();
        // Enough for two partials, then node creation fails
        backend.limit_nodes(4);
        let ctx = backend.create_context().unwrap();
        let result = ToneGraph::build(ctx, &ToneBankConfig::default(), 0.15);
        assert!(matches!(result, Err(ToneError::Graph(_))));
        assert!(backend.is_closed(0));
        assert!(backend.running_oscillators(0).is_empty());
    }

    #[test]
    fn release_tolerates_externally_stopped_nodes() {
        let mut backend = RecordingBackend::new();
        let mut graph = build(&mut backend, 0.15);
        let first = backend.oscillators(0)[0];
        backend.stop_externally(0, first);

        graph.release();
        graph.release();
        assert!(graph.is_released());
        assert!(backend.is_closed(0));
        assert!(backend.running_oscillators(0).is_empty());
        assert_eq!(graph.tick_drift(), None);
    }

    #[test]
    fn drop_releases() {
        let mut backend = RecordingBackend::new();
        {
            let _graph = build(&mut backend, 0.15);
            assert_eq!(backend.open_contexts(), 1);
        }
        assert_eq!(backend.open_contexts(), 0);
    }
}
