pub mod backend;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod gate;
pub mod settings;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

use crate::config::ToneBankConfig;
use crate::dsp::renderer::PreviewRequest;
use wasm_bindgen::prelude::*;

pub use crate::engine::{EngineState, Status, ToneEngine};
pub use crate::error::ToneError;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the mindbody-tone version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: the compiled-in 432 Hz tone bank as a JS object.
#[wasm_bindgen]
pub fn default_tone_config() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&ToneBankConfig::default()).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render a preview of the soundscape to a WAV byte array.
/// `stop_at` < 0 keeps the tone playing to the end.
#[wasm_bindgen]
pub fn render_preview_wav(seconds: f64, stop_at: f64, volume: f64, sample_rate: u32) -> Result<Vec<u8>, JsValue> {
    let request = PreviewRequest {
        seconds,
        stop_at: (stop_at >= 0.0).then_some(stop_at),
        volume,
        sample_rate,
        ..PreviewRequest::default()
    };
    dsp::renderer::render_preview_wav(&request).map_err(|e| JsValue::from_str(&format!("{e}")))
}
