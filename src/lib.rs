//! # soundchain
//!
//! A small pull-based audio signal graph.
//!
//! Units (generators, effects, a mixer, terminal sinks) are wired into a
//! directed acyclic graph. A real-time callback pulls the terminal unit for a
//! block of frames; each sink pulls its inputs in turn until a generator
//! produces samples, and the audio flows back, remixed to the requested
//! channel count at every hop.
//!
//! ```
//! use soundchain::{Effect, Graph, Mixer, TestTone, Volume};
//!
//! let graph = Graph::new(48_000);
//! let tone = graph.add_source(TestTone::new(48_000).with_frequency(220.0));
//! let volume = graph.add_effect(Effect::new(Volume::new(0.5)));
//! let mixer = graph.add_effect(Mixer::new());
//!
//! graph.connect(&tone, &volume).unwrap();
//! graph.connect(&volume, &mixer).unwrap();
//! graph.set_output(&mixer).unwrap();
//!
//! // A connection that would loop back is refused.
//! assert!(graph.connect(&mixer, &volume).is_err());
//!
//! let mut block = vec![0.0f32; 256 * 2];
//! graph.render(&mut block, 256, 2);
//! ```
//!
//! Units can also be wired directly through the [`Sink`] trait, without a
//! [`Graph`]. Connections are non-owning either way: dropping an upstream unit
//! turns its output into silence.

pub mod buffer;
pub mod declick;
pub mod error;
pub mod graph;
pub mod node;
pub mod nodes;

pub use buffer::AudioBuffer;
pub use declick::{DeclickedValue, RAMP_LEN};
pub use error::ConnectError;
pub use graph::{Graph, Handle, UnitId};
pub use node::{Sink, SinkPort, Source, Unit};
pub use nodes::effect::{pan_gains, Effect, Mixer, Passthrough, Process, Volume, VolumeParams};
pub use nodes::sink::RingSink;
pub use nodes::source::{TestTone, Waveform};
