//! DSP building blocks for the offline backend.
//!
//! The browser build synthesizes through WebAudio; these run the same
//! graph in Rust for previews, the CLI renderer, and audible tests.

pub mod oscillator;
pub mod param;
pub mod renderer;
