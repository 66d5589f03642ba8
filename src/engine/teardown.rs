//! Deferred release of a graph that is fading out.

use tracing::debug;

use super::graph::ToneGraph;
use crate::backend::AudioContext;

/// A graph whose fade-out is running. It is released once its own context
/// clock reaches `deadline`, or earlier if cancelled.
pub struct PendingTeardown<C: AudioContext> {
    graph: ToneGraph<C>,
    deadline: f64,
}

impl<C: AudioContext> PendingTeardown<C> {
    /// Start the fade-out on `graph` and schedule its release `grace`
    /// seconds from now. If the fade cannot be scheduled the graph is
    /// released immediately and `None` is returned.
    pub fn schedule(mut graph: ToneGraph<C>, fade_out: f64, grace: f64) -> Option<Self> {
        let now = graph.now();
        if let Err(e) = graph.fade_out(fade_out) {
            debug!(error = %e, "fade-out could not be scheduled, releasing now");
            graph.release();
            return None;
        }
        let deadline = now + grace;
        debug!(now, deadline, "teardown scheduled");
        Some(PendingTeardown { graph, deadline })
    }

    /// Deadline on the retiring context's clock.
    pub fn deadline(&self) -> f64 {
        self.deadline
    }

    pub fn is_due(&self) -> bool {
        self.graph.now() >= self.deadline
    }

    /// Keep the drift running while the fade plays out.
    pub fn tick(&mut self) {
        self.graph.tick_drift();
    }

    /// Release now, whether or not the deadline has passed.
    pub fn complete(mut self) {
        self.graph.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AudioBackend, Input};
    use crate::backend::recording::{Call, RecordingBackend};
    use crate::config::ToneBankConfig;

    #[test]
    fn due_exactly_at_deadline() {
        let mut backend = RecordingBackend::new();
        let ctx = backend.create_context().unwrap();
        let graph = ToneGraph::build(ctx, &ToneBankConfig::default(), 0.15).unwrap();

        backend.clock().set(1.0);
        let pending = PendingTeardown::schedule(graph, 2.0, 2.1).unwrap();
        assert_eq!(pending.deadline(), 1.0 + 2.1);

        backend.clock().set(pending.deadline() - 1e-6);
        assert!(!pending.is_due());
        backend.clock().set(pending.deadline());
        assert!(pending.is_due());

        pending.complete();
        assert!(backend.is_closed(0));
    }

    #[test]
    fn fade_starts_from_current_master_value() {
        let mut backend = RecordingBackend::new();
        let ctx = backend.create_context().unwrap();
        let graph = ToneGraph::build(ctx, &ToneBankConfig::default(), 0.15).unwrap();
        backend.clock().set(0.5);
        let _pending = PendingTeardown::schedule(graph, 2.0, 2.1).unwrap();

        let calls = backend.calls(0);
        let master = calls
            .iter()
            .find_map(|c| match c {
                Call::Connect { from, to: Input::Destination } => Some(*from),
                _ => None,
            })
            .unwrap();
        assert!(calls.contains(&Call::Hold { param: master.gain(), time: 0.5 }));
        assert!(calls.contains(&Call::LinearRamp { param: master.gain(), value: 0.0, end_time: 2.5 }));
    }
}
