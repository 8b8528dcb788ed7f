//! Generic single-input effect shell

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::AudioBuffer;
use crate::error::ConnectError;
use crate::node::{Sink, SinkPort, Source, Unit};

/// The DSP half of an effect.
///
/// Implement this to get a full graph unit through [`Effect`]: the shell
/// handles wiring, pulling upstream audio and bypass, then hands the pulled
/// input to [`process`](Self::process).
pub trait Process: Send + 'static {
    /// Parameters shared with control threads, e.g. atomics.
    ///
    /// Processors without runtime parameters use `()`.
    type Params: Send + Sync + 'static;

    /// Default unit name for effects built from this processor.
    const NAME: &'static str;

    /// Build the shared parameters, seeded from the current settings.
    fn params(&self) -> Self::Params;

    /// Called when the sample rate changes.
    fn set_sample_rate(&mut self, _rate: u32) {}

    /// Render `num_frames` x `num_channels` into `output`.
    ///
    /// `input` has already been pulled at the same shape.
    fn process(
        &mut self,
        params: &Self::Params,
        input: &AudioBuffer,
        output: &mut [f32],
        num_frames: usize,
        num_channels: usize,
    );
}

/// A unit with one input and one output, wrapping a [`Process`].
///
/// ```
/// use std::sync::Arc;
/// use soundchain::{Effect, Sink, Source, TestTone, Volume};
///
/// let tone: Arc<dyn Source> = Arc::new(TestTone::new(48_000));
/// let volume = Effect::new(Volume::new(0.5));
/// volume.add_input_from(&tone).unwrap();
///
/// // Control thread: lock-free parameter change.
/// volume.params().set_volume(0.25);
///
/// let mut out = [0.0f32; 128];
/// volume.audio_requested(&mut out, 64, 2);
/// ```
pub struct Effect<P: Process> {
    name: String,
    port: SinkPort,
    processor: Mutex<P>,
    params: P::Params,
    active: AtomicBool,
    sample_rate: AtomicU32,
}

impl<P: Process> Effect<P> {
    pub fn new(processor: P) -> Self {
        Self {
            name: P::NAME.to_owned(),
            port: SinkPort::new(),
            params: processor.params(),
            processor: Mutex::new(processor),
            active: AtomicBool::new(true),
            sample_rate: AtomicU32::new(0),
        }
    }

    /// Give this instance its own name (builder pattern).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The parameters shared with the audio thread. Never blocks.
    pub fn params(&self) -> &P::Params {
        &self.params
    }

    /// Lock the processor itself.
    ///
    /// The audio thread holds this lock while processing a block, so this
    /// can wait for a whole block. Prefer [`params`](Self::params).
    pub fn processor(&self) -> MutexGuard<'_, P> {
        self.processor.lock()
    }

    /// Enable or bypass the effect. A bypassed effect forwards its input.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Last sample rate seen, or 0 before any was set.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }
}

impl<P: Process> Unit for Effect<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<Arc<dyn Source>> {
        self.port.input().into_iter().collect()
    }
}

impl<P: Process> Source for Effect<P> {
    fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Relaxed);
        self.processor.lock().set_sample_rate(rate);
        if let Some(upstream) = self.port.input() {
            upstream.set_sample_rate(rate);
        }
    }

    fn audio_requested(&self, buffer: &mut [f32], num_frames: usize, num_channels: usize) {
        let input = self.port.fill_input_buffer_from_upstream(num_frames, num_channels);
        if self.is_active() {
            self.processor.lock().process(&self.params, &input, buffer, num_frames, num_channels);
        } else {
            input.copy_to(buffer, num_frames, num_channels);
        }
    }
}

impl<P: Process> Sink for Effect<P> {
    fn add_input_from(&self, source: &Arc<dyn Source>) -> Result<(), ConnectError> {
        self.port.connect(self, &self.name, source)
    }

    fn remove_input_from(&self, source: &Arc<dyn Source>) -> Result<(), ConnectError> {
        self.port.disconnect(source)
    }

    fn clear_inputs(&self) {
        self.port.clear();
    }

    fn audio_received(&self, buffer: &[f32], num_frames: usize, num_channels: usize) {
        self.port.receive(buffer, num_frames, num_channels);
    }
}
