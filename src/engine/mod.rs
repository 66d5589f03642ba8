//! Ambient tone engine: play, stop and volume over one audio graph.
//!
//! The engine owns at most one live graph plus any graphs still fading
//! out from earlier stops. Status changes are synchronous; everything audible is
//! scheduled on the audio context's own clock. The host drives time by
//! calling [`ToneEngine::tick`] from its frame or timer loop.

pub mod drift;
pub mod graph;
pub mod teardown;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::AudioBackend;
use crate::config::{ToneBankConfig, VOLUME_RAMP_SECONDS};
use crate::error::ToneError;
use crate::settings::{self, SettingsStore};

use graph::ToneGraph;
use teardown::PendingTeardown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Idle,
    Playing,
}

/// Snapshot handed to change listeners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub is_playing: bool,
    pub volume: f64,
}

type Listener = Box<dyn FnMut(EngineState)>;

pub struct ToneEngine<B: AudioBackend, S: SettingsStore> {
    backend: B,
    settings: S,
    config: ToneBankConfig,
    status: Status,
    volume: f64,
    live: Option<ToneGraph<B::Context>>,
    retiring: Vec<PendingTeardown<B::Context>>,
    listeners: Vec<Listener>,
}

impl<B: AudioBackend, S: SettingsStore> ToneEngine<B, S> {
    /// Engine with the default 432 Hz bank. Reads the persisted volume once.
    pub fn new(backend: B, settings: S) -> Self {
        Self::with_config(backend, settings, ToneBankConfig::default())
    }

    pub fn with_config(backend: B, settings: S, config: ToneBankConfig) -> Self {
        let volume = settings::load_volume(&settings);
        ToneEngine {
            backend,
            settings,
            config,
            status: Status::Idle,
            volume,
            live: None,
            retiring: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Start playback. A no-op while already playing.
    ///
    /// Failures leave the engine Idle without opening a new context. Graphs
    /// still fading from an earlier stop keep fading.
    pub fn play(&mut self) -> Result<(), ToneError> {
        if self.status == Status::Playing {
            return Ok(());
        }
        if !self.retiring.is_empty() {
            debug!(fading = self.retiring.len(), "play during fade-out, previous graph keeps fading");
        }

        let context = self.backend.create_context().inspect_err(|e| {
            error!(error = %e, "could not acquire audio context");
        })?;
        let mut graph = ToneGraph::build(context, &self.config, self.volume).inspect_err(|e| {
            error!(error = %e, "could not build tone graph");
        })?;
        graph.tick_drift();

        self.live = Some(graph);
        self.status = Status::Playing;
        info!(volume = self.volume, "ambient tone playing");
        self.notify();
        Ok(())
    }

    /// Fade out and go Idle immediately. Resources are released on a later
    /// [`tick`](Self::tick) once the teardown grace has elapsed.
    pub fn stop(&mut self) {
        if self.status == Status::Idle {
            return;
        }
        self.status = Status::Idle;
        if let Some(graph) = self.live.take() {
            self.retiring.extend(PendingTeardown::schedule(
                graph,
                self.config.fade_out_seconds,
                self.config.teardown_grace(),
            ));
        }
        info!("ambient tone stopping");
        self.notify();
    }

    pub fn toggle(&mut self) -> Result<(), ToneError> {
        match self.status {
            Status::Playing => {
                self.stop();
                Ok(())
            }
            Status::Idle => self.play(),
        }
    }

    /// Clamp, persist, and (when playing) ramp every stage to the new level.
    pub fn set_volume(&mut self, value: f64) {
        let volume = settings::clamp_volume(value);
        self.volume = volume;
        if let Err(e) = settings::save_volume(&mut self.settings, volume) {
            warn!(error = %e, "could not persist volume");
        }
        if self.status == Status::Playing {
            if let Some(graph) = self.live.as_mut() {
                graph.ramp_volume(volume, VOLUME_RAMP_SECONDS);
            }
        }
        debug!(volume, "volume set");
        self.notify();
    }

    /// One step of the engine's periodic work: finish every due teardown,
    /// then advance drift on every graph that still has one.
    pub fn tick(&mut self) {
        let (due, fading): (Vec<_>, Vec<_>) = self.retiring.drain(..).partition(|p| p.is_due());
        self.retiring = fading;
        for pending in due {
            pending.complete();
        }
        for pending in &mut self.retiring {
            pending.tick();
        }
        if let Some(graph) = self.live.as_mut() {
            graph.tick_drift();
        }
    }

    /// Release everything right away, pending teardown included. Safe to
    /// call any number of times, and run automatically on drop.
    pub fn dispose(&mut self) {
        let was_playing = self.status == Status::Playing;
        self.release_all();
        if was_playing {
            self.notify();
        }
    }

    fn release_all(&mut self) {
        for pending in self.retiring.drain(..) {
            pending.complete();
        }
        if let Some(mut graph) = self.live.take() {
            graph.release();
        }
        self.status = Status::Idle;
    }

    /// Register a listener called after every status or volume change.
    pub fn subscribe(&mut self, listener: impl FnMut(EngineState) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&mut self) {
        let state = self.state();
        for listener in &mut self.listeners {
            listener(state);
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState {
            is_playing: self.is_playing(),
            volume: self.volume,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == Status::Playing
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn config(&self) -> &ToneBankConfig {
        &self.config
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut S {
        &mut self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gain targets of the live partial stages, fundamental first.
    pub fn partial_gain_targets(&self) -> Option<Vec<f64>> {
        self.live.as_ref().map(|g| g.partial_targets())
    }

    pub fn modulation_gain_target(&self) -> Option<f64> {
        self.live.as_ref().and_then(|g| g.modulation_target())
    }

    /// When the most recently stopped graph will be released, on its own
    /// context clock.
    pub fn pending_teardown_deadline(&self) -> Option<f64> {
        self.retiring.last().map(|p| p.deadline())
    }

    /// Graphs still fading out.
    pub fn pending_teardowns(&self) -> usize {
        self.retiring.len()
    }

    /// Graphs currently holding an audio context (live or fading).
    pub fn graph_count(&self) -> usize {
        usize::from(self.live.is_some()) + self.retiring.len()
    }
}

impl<B: AudioBackend, S: SettingsStore> Drop for ToneEngine<B, S> {
    fn drop(&mut self) {
        self.release_all();
    }
}
