//! WebAudio backend and `localStorage` settings for the browser build.

use wasm_bindgen::JsValue;
use web_sys::{AudioNode, AudioParam, GainNode, OscillatorNode, OscillatorType, Storage};

use super::{AudioBackend, AudioContext, Input, NodeId, ParamId, ParamKind};
use crate::error::ToneError;
use crate::settings::SettingsStore;

fn js_message(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

fn graph_err(value: JsValue) -> ToneError {
    ToneError::Graph(js_message(&value))
}

enum WebNode {
    Oscillator(OscillatorNode),
    Gain(GainNode),
}

/// Creates one `AudioContext` per playback session.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebAudioBackend;

impl AudioBackend for WebAudioBackend {
    type Context = WebAudioContext;

    fn create_context(&mut self) -> Result<WebAudioContext, ToneError> {
        if web_sys::window().is_none() {
            return Err(ToneError::PlatformUnavailable);
        }
        let ctx = web_sys::AudioContext::new().map_err(|e| ToneError::ContextAcquisition(js_message(&e)))?;
        Ok(WebAudioContext {
            ctx,
            nodes: Vec::new(),
            closed: false,
        })
    }
}

pub struct WebAudioContext {
    ctx: web_sys::AudioContext,
    nodes: Vec<WebNode>,
    closed: bool,
}

impl WebAudioContext {
    fn node(&self, id: NodeId) -> Result<&AudioNode, ToneError> {
        let node: &AudioNode = match self.nodes.get(id.0) {
            Some(WebNode::Oscillator(osc)) => osc,
            Some(WebNode::Gain(gain)) => gain,
            None => return Err(ToneError::Graph(format!("unknown node {}", id.0))),
        };
        Ok(node)
    }

    fn param(&self, id: ParamId) -> Result<AudioParam, ToneError> {
        match (self.nodes.get(id.node.0), id.kind) {
            (Some(WebNode::Oscillator(osc)), ParamKind::Frequency) => Ok(osc.frequency()),
            (Some(WebNode::Gain(gain)), ParamKind::Gain) => Ok(gain.gain()),
            _ => Err(ToneError::Graph(format!("node {} has no {:?} parameter", id.node.0, id.kind))),
        }
    }

    fn oscillator(&self, id: NodeId) -> Result<&OscillatorNode, ToneError> {
        match self.nodes.get(id.0) {
            Some(WebNode::Oscillator(osc)) => Ok(osc),
            _ => Err(ToneError::Graph(format!("node {} is not an oscillator", id.0))),
        }
    }
}

impl AudioContext for WebAudioContext {
    fn current_time(&self) -> f64 {
        self.ctx.current_time()
    }

    fn create_oscillator(&mut self, frequency: f64) -> Result<NodeId, ToneError> {
        let osc = self.ctx.create_oscillator().map_err(graph_err)?;
        osc.set_type(OscillatorType::Sine);
        osc.frequency().set_value(frequency as f32);
        self.nodes.push(WebNode::Oscillator(osc));
        Ok(NodeId(self.nodes.len() - 1))
    }

    fn create_gain(&mut self, gain: f64) -> Result<NodeId, ToneError> {
        let node = self.ctx.create_gain().map_err(graph_err)?;
        node.gain().set_value(gain as f32);
        self.nodes.push(WebNode::Gain(node));
        Ok(NodeId(self.nodes.len() - 1))
    }

    fn connect(&mut self, from: NodeId, to: Input) -> Result<(), ToneError> {
        let source = self.node(from)?;
        match to {
            Input::Node(target) => {
                source.connect_with_audio_node(self.node(target)?).map_err(graph_err)?;
            }
            Input::Param(param) => {
                source.connect_with_audio_param(&self.param(param)?).map_err(graph_err)?;
            }
            Input::Destination => {
                let destination = self.ctx.destination();
                source.connect_with_audio_node(&destination).map_err(graph_err)?;
            }
        }
        Ok(())
    }

    fn set_value_at_time(&mut self, param: ParamId, value: f64, time: f64) -> Result<(), ToneError> {
        self.param(param)?
            .set_value_at_time(value as f32, time)
            .map_err(graph_err)?;
        Ok(())
    }

    fn linear_ramp_to_value_at_time(
        &mut self,
        param: ParamId,
        value: f64,
        end_time: f64,
    ) -> Result<(), ToneError> {
        self.param(param)?
            .linear_ramp_to_value_at_time(value as f32, end_time)
            .map_err(graph_err)?;
        Ok(())
    }

    fn hold_at_time(&mut self, param: ParamId, time: f64) -> Result<(), ToneError> {
        let param = self.param(param)?;
        let current = param.value();
        param.cancel_scheduled_values(time).map_err(graph_err)?;
        param.set_value_at_time(current, time).map_err(graph_err)?;
        Ok(())
    }

    fn start(&mut self, oscillator: NodeId) -> Result<(), ToneError> {
        self.oscillator(oscillator)?.start().map_err(graph_err)
    }

    fn stop(&mut self, oscillator: NodeId) -> Result<(), ToneError> {
        if self.closed {
            return Err(ToneError::AlreadyStopped);
        }
        self.oscillator(oscillator)?
            .stop()
            .map_err(|_| ToneError::AlreadyStopped)
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), ToneError> {
        self.node(node)?.disconnect().map_err(graph_err)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // The returned promise only reports completion
        if let Err(e) = self.ctx.close() {
            tracing::debug!(error = %js_message(&e), "audio context close rejected");
        }
    }
}

/// Settings backed by the page's `localStorage`.
pub struct LocalStorageStore {
    storage: Option<Storage>,
}

impl LocalStorageStore {
    pub fn new() -> Self {
        let storage = web_sys::window().and_then(|w| w.local_storage().ok().flatten());
        LocalStorageStore { storage }
    }
}

impl Default for LocalStorageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for LocalStorageStore {
    fn load(&self, key: &str) -> Option<String> {
        self.storage.as_ref()?.get_item(key).ok().flatten()
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), ToneError> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| ToneError::Settings("localStorage is not available".into()))?;
        storage
            .set_item(key, value)
            .map_err(|e| ToneError::Settings(js_message(&e)))
    }
}
