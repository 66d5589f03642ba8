//! Browser-facing bindings for the hosting web UI.
//!
//! ```js
//! const tone = new AmbientTone();
//! tone.onChange(({ isPlaying, volume }) => render(isPlaying, volume));
//! document.addEventListener('click', () => tone.notifyUserInteraction(), { once: true });
//! const frame = () => { tone.tick(); requestAnimationFrame(frame); };
//! requestAnimationFrame(frame);
//! ```
//!
//! Change listeners run from a microtask after the triggering call has
//! returned, so they may read `isPlaying` and `volume` or call back into
//! the object.

use tracing::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::backend::web::{LocalStorageStore, WebAudioBackend};
use crate::engine::{EngineState, ToneEngine};
use crate::gate::AutoplayGate;

fn to_js(e: crate::error::ToneError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn deliver_later(callback: &js_sys::Function, state: EngineState) {
    let value = match serde_wasm_bindgen::to_value(&state) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "could not convert engine state");
            return;
        }
    };
    let callback = callback.clone();
    let deliver = Closure::once_into_js(move || {
        if let Err(e) = callback.call1(&JsValue::NULL, &value) {
            warn!(error = ?e, "onChange listener threw");
        }
    });
    match web_sys::window() {
        Some(window) => window.queue_microtask(deliver.unchecked_ref()),
        None => warn!("no window, state change not delivered"),
    }
}

#[wasm_bindgen]
pub struct AmbientTone {
    engine: ToneEngine<WebAudioBackend, LocalStorageStore>,
    gate: AutoplayGate,
}

#[wasm_bindgen]
impl AmbientTone {
    #[wasm_bindgen(constructor)]
    pub fn new() -> AmbientTone {
        let engine = ToneEngine::new(WebAudioBackend, LocalStorageStore::new());
        let gate = AutoplayGate::from_settings(engine.settings());
        AmbientTone { engine, gate }
    }

    pub fn play(&mut self) -> Result<(), JsValue> {
        self.engine.play().map_err(to_js)
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    pub fn toggle(&mut self) -> Result<(), JsValue> {
        self.engine.toggle().map_err(to_js)
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&mut self, value: f64) {
        self.engine.set_volume(value);
    }

    #[wasm_bindgen(getter, js_name = isPlaying)]
    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    #[wasm_bindgen(getter)]
    pub fn volume(&self) -> f64 {
        self.engine.volume()
    }

    /// Call once per animation frame.
    pub fn tick(&mut self) {
        self.engine.tick();
    }

    /// Release all audio resources immediately (page unload / unmount).
    pub fn dispose(&mut self) {
        self.engine.dispose();
    }

    /// Register `callback({ isPlaying, volume })` for every state change.
    #[wasm_bindgen(js_name = onChange)]
    pub fn on_change(&mut self, callback: js_sys::Function) {
        self.engine.subscribe(move |state| deliver_later(&callback, state));
    }

    /// Forward the page's first click/touch. Returns `true` if it started
    /// autoplay; a failed start is logged, never thrown into the listener.
    #[wasm_bindgen(js_name = notifyUserInteraction)]
    pub fn notify_user_interaction(&mut self) -> bool {
        self.gate.try_autoplay(&mut self.engine)
    }

    #[wasm_bindgen(js_name = setAutoplay)]
    pub fn set_autoplay(&mut self, enabled: bool) -> Result<(), JsValue> {
        self.gate
            .set_enabled(self.engine.settings_mut(), enabled)
            .map_err(to_js)
    }

    #[wasm_bindgen(getter)]
    pub fn autoplay(&self) -> bool {
        self.gate.is_enabled()
    }
}

impl Default for AmbientTone {
    fn default() -> Self {
        Self::new()
    }
}
