//! Ring buffer sink, the terminal end of a pull chain

use std::sync::Arc;

use parking_lot::Mutex;
use rtrb::Producer;

use crate::error::ConnectError;
use crate::node::{Sink, SinkPort, Source, Unit};

/// A sink that pulls its input and pushes interleaved samples into an rtrb
/// ring buffer.
///
/// The thread that owns the consumer side (a device callback, a recorder, an
/// analyser) drains it. Call [`pump`](Self::pump) from the render thread to
/// drive the graph.
pub struct RingSink {
    name: String,
    port: SinkPort,
    producer: Mutex<Producer<f32>>,
    channels: usize,
}

impl RingSink {
    /// Create a sink that writes `channels`-wide interleaved frames to the given producer
    pub fn new(producer: Producer<f32>, channels: usize) -> Self {
        Self {
            name: "ring sink".to_owned(),
            port: SinkPort::new(),
            producer: Mutex::new(producer),
            channels: channels.max(1),
        }
    }

    pub fn mono(producer: Producer<f32>) -> Self {
        Self::new(producer, 1)
    }

    pub fn stereo(producer: Producer<f32>) -> Self {
        Self::new(producer, 2)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns how many sample slots are free in the ring
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.lock().slots()
    }

    /// The connected upstream, if any.
    pub fn input(&self) -> Option<Arc<dyn Source>> {
        self.port.input()
    }

    /// Pull `num_frames` from upstream and push them into the ring.
    ///
    /// Returns the number of frames written. Nothing is pulled when the ring
    /// can't take the whole block, so upstream state only advances for audio
    /// that is actually delivered.
    pub fn pump(&self, num_frames: usize) -> usize {
        let mut producer = self.producer.lock();
        let needed = num_frames * self.channels;
        if producer.slots() < needed {
            tracing::trace!(sink = %self.name, needed, "ring full, skipping block");
            return 0;
        }

        let input = self.port.fill_input_buffer_from_upstream(num_frames, self.channels);
        for &sample in input.as_slice() {
            let _ = producer.push(sample);
        }
        num_frames
    }
}

impl Unit for RingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<Arc<dyn Source>> {
        self.port.input().into_iter().collect()
    }
}

impl Sink for RingSink {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::effect::{Effect, Passthrough};
    use crate::nodes::source::TestTone;
    use rtrb::RingBuffer;

    #[test]
    fn pump_writes_interleaved_frames() {
        let (producer, mut consumer) = RingBuffer::new(64);
        let sink = RingSink::stereo(producer);
        let tone: Arc<dyn Source> = Arc::new(TestTone::new(48_000).with_amplitude(1.0));
        sink.add_input_from(&tone).unwrap();

        assert_eq!(sink.pump(16), 16);
        assert_eq!(consumer.slots(), 32);

        let mut samples = Vec::new();
        while let Ok(s) = consumer.pop() {
            samples.push(s);
        }
        for frame in samples.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert!(samples.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn full_ring_skips_block() {
        let (producer, consumer) = RingBuffer::new(8);
        let sink = RingSink::mono(producer);
        assert_eq!(sink.pump(6), 6);
        assert_eq!(sink.pump(6), 0);
        assert_eq!(sink.available(), 2);
        assert_eq!(consumer.slots(), 6);
    }

    #[test]
    fn unconnected_sink_pushes_captured_audio_then_silence() {
        let (producer, mut consumer) = RingBuffer::new(16);
        let sink = RingSink::mono(producer);
        sink.audio_received(&[0.1, 0.2, 0.3], 3, 1);

        sink.pump(3);
        sink.pump(3);

        let samples: Vec<f32> = std::iter::from_fn(|| consumer.pop().ok()).collect();
        assert_eq!(samples, vec![0.1, 0.2, 0.3, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn connecting_twice_is_rejected() {
        let (producer, _consumer) = RingBuffer::new(8);
        let sink = RingSink::mono(producer);
        let a: Arc<dyn Source> = Arc::new(TestTone::new(48_000));
        let b: Arc<dyn Source> = Arc::new(TestTone::new(48_000));

        sink.add_input_from(&a).unwrap();
        assert_eq!(sink.add_input_from(&b), Err(ConnectError::AlreadyConnected));
        sink.remove_input_from(&a).unwrap();
        sink.add_input_from(&b).unwrap();
        assert_eq!(sink.inputs().len(), 1);
    }

    #[test]
    fn sample_rate_reaches_the_whole_chain() {
        let (producer, _consumer) = RingBuffer::new(8);
        let sink = RingSink::mono(producer);
        let near = Arc::new(Effect::new(Passthrough));
        let far = Arc::new(Effect::new(Passthrough));
        let near_src: Arc<dyn Source> = near.clone();
        let far_src: Arc<dyn Source> = far.clone();
        near.add_input_from(&far_src).unwrap();
        sink.add_input_from(&near_src).unwrap();

        sink.propagate_sample_rate(96_000);
        assert_eq!(near.sample_rate(), 96_000);
        assert_eq!(far.sample_rate(), 96_000);
    }
}
