//! Offline preview renderer. Plays the tone engine through the offline
//! backend and returns samples or a WAV byte buffer.

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::offline::{OfflineBackend, RENDER_QUANTUM};
use crate::config::ToneBankConfig;
use crate::engine::ToneEngine;
use crate::error::ToneError;
use crate::settings::{DEFAULT_VOLUME, MemoryStore};

/// What to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    /// Total length of the rendered audio.
    pub seconds: f64,
    /// When to call `stop()`. `None` keeps playing to the end.
    pub stop_at: Option<f64>,
    pub volume: f64,
    pub sample_rate: u32,
    pub config: ToneBankConfig,
}

impl Default for PreviewRequest {
    fn default() -> Self {
        PreviewRequest {
            seconds: 10.0,
            stop_at: None,
            volume: DEFAULT_VOLUME,
            sample_rate: 44100,
            config: ToneBankConfig::default(),
        }
    }
}

/// Render the soundscape to mono f32 samples.
pub fn render_preview(request: &PreviewRequest) -> Result<Vec<f32>, ToneError> {
    request.config.validate()?;
    if !(request.seconds.is_finite() && request.seconds >= 0.0) {
        return Err(ToneError::Render(format!("invalid length {}", request.seconds)));
    }
    if request.sample_rate == 0 {
        return Err(ToneError::Render("sample rate must be positive".into()));
    }

    let sample_rate = request.sample_rate as f64;
    let total = (request.seconds * sample_rate).round() as usize;
    let stop_frame = request.stop_at.map(|t| (t.max(0.0) * sample_rate).round() as usize);

    let backend = OfflineBackend::new(sample_rate);
    let mut engine = ToneEngine::with_config(backend.clone(), MemoryStore::new(), request.config.clone());
    engine.set_volume(request.volume);
    engine.play()?;

    let mut samples = Vec::with_capacity(total);
    while samples.len() < total {
        if stop_frame.is_some_and(|f| samples.len() >= f) {
            engine.stop();
        }
        engine.tick();
        let mut frames = RENDER_QUANTUM.min(total - samples.len());
        // Land exactly on the stop frame
        if let Some(f) = stop_frame.filter(|f| *f > samples.len()) {
            frames = frames.min(f - samples.len());
        }
        samples.extend(backend.render(frames));
    }
    debug!(frames = samples.len(), sample_rate = request.sample_rate, "preview rendered");
    engine.dispose();
    Ok(samples)
}

/// Render the soundscape to a 16-bit mono WAV file in memory.
pub fn render_preview_wav(request: &PreviewRequest) -> Result<Vec<u8>, ToneError> {
    let samples = render_preview(request)?;
    encode_wav(&samples, request.sample_rate)
}

/// Encode mono f32 samples as 16-bit PCM WAV. Samples are clamped to [-1, 1].
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, ToneError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
