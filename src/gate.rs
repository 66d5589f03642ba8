//! Autoplay on first user interaction.
//!
//! Browsers refuse to start audio before the user has interacted with the
//! page. When autoplay is enabled the host forwards its first click/touch
//! here and the gate starts playback from inside that gesture. The gate
//! fires at most once per session.

use tracing::{debug, error};

use crate::backend::AudioBackend;
use crate::engine::ToneEngine;
use crate::error::ToneError;
use crate::settings::{self, SettingsStore};

#[derive(Debug, Clone)]
pub struct AutoplayGate {
    enabled: bool,
    fired: bool,
}

impl AutoplayGate {
    /// Read the persisted autoplay flag.
    pub fn from_settings<S: SettingsStore + ?Sized>(store: &S) -> Self {
        AutoplayGate::new(settings::load_autoplay(store))
    }

    pub fn new(enabled: bool) -> Self {
        AutoplayGate { enabled, fired: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the first interaction has already been consumed.
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn set_enabled<S: SettingsStore + ?Sized>(&mut self, store: &mut S, enabled: bool) -> Result<(), ToneError> {
        self.enabled = enabled;
        settings::save_autoplay(store, enabled)
    }

    /// Handle a user gesture. Returns `Ok(true)` if this call started playback.
    pub fn on_user_interaction<B: AudioBackend, S: SettingsStore>(
        &mut self,
        engine: &mut ToneEngine<B, S>,
    ) -> Result<bool, ToneError> {
        if self.fired {
            return Ok(false);
        }
        self.fired = true;
        if !self.enabled || engine.is_playing() {
            return Ok(false);
        }
        debug!("first interaction, starting autoplay");
        engine.play()?;
        Ok(true)
    }

    /// Like [`on_user_interaction`](Self::on_user_interaction) for event
    /// listeners with nowhere to send an error: a failed start is logged
    /// and reported as `false`.
    pub fn try_autoplay<B: AudioBackend, S: SettingsStore>(&mut self, engine: &mut ToneEngine<B, S>) -> bool {
        self.on_user_interaction(engine).unwrap_or_else(|e| {
            error!(error = %e, "autoplay could not start");
            false
        })
    }
}
