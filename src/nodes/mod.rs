//! Built-in audio units.
//!
//! Units are organized into three categories:
//!
//! ## Sources ([`source`])
//!
//! Generate audio with no audio inputs:
//! - [`TestTone`] - Sine or sawtooth test oscillator
//!
//! ## Effects ([`effect`])
//!
//! Process audio (inputs → outputs):
//! - [`Effect`] - Single-input shell around a [`Process`], with bypass
//! - [`Passthrough`] - Copies input to output
//! - [`Volume`] - Declicked gain
//! - [`Mixer`] - Sums any number of inputs with per-input volume and pan
//!
//! ## Sinks ([`sink`])
//!
//! Consume audio with no audio outputs:
//! - [`RingSink`] - Pushes pulled audio into an rtrb ring buffer
//!
//! Parameters are changed directly on the shared unit from any thread; values
//! that would click ([`Volume`]) glide over a short ramp.

pub mod effect;
pub mod sink;
pub mod source;

pub use effect::{Effect, Mixer, Passthrough, Process, Volume};
pub use sink::RingSink;
pub use source::TestTone;
