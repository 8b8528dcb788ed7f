//! Interleaved audio buffer with channel-aware copying.

/// An interleaved `f32` buffer holding `frames` frames of `channels` channels.
///
/// Samples for successive channels alternate within each frame:
/// `[f0c0, f0c1, f1c0, f1c1, ...]`. The backing storage always holds exactly
/// `frames * channels` samples.
///
/// Owners (sinks, mixers) reshape their buffers with [`allocate`](Self::allocate)
/// right before each pull, so steady-state rendering never reallocates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    frames: usize,
    channels: usize,
}

impl AudioBuffer {
    /// Create an empty buffer (zero frames, zero channels).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zeroed buffer of the given shape.
    pub fn with_shape(frames: usize, channels: usize) -> Self {
        Self {
            samples: vec![0.0; frames * channels],
            frames,
            channels,
        }
    }

    /// Wrap existing interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `samples.len() != frames * channels`.
    pub fn from_interleaved(samples: Vec<f32>, frames: usize, channels: usize) -> Self {
        assert_eq!(
            samples.len(),
            frames * channels,
            "interleaved data does not match {frames} frames x {channels} channels"
        );
        Self { samples, frames, channels }
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Reshape to `frames` x `channels`.
    ///
    /// Storage is only touched when the shape actually changes. After a shape
    /// change the contents are unspecified: callers must clear or fill.
    pub fn allocate(&mut self, frames: usize, channels: usize) {
        if self.frames == frames && self.channels == channels {
            return;
        }
        self.samples.resize(frames * channels, 0.0);
        self.frames = frames;
        self.channels = channels;
    }

    /// Set every sample to zero, keeping the shape.
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Deep copy `other` into `self`, reshaping first if necessary.
    pub fn copy_from(&mut self, other: &AudioBuffer) {
        self.allocate(other.frames, other.channels);
        self.samples.copy_from_slice(&other.samples);
    }

    /// Extract a single channel into `output`, which must hold at least
    /// `frames` samples.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= self.channels()` or `output` is too short.
    pub fn copy_channel(&self, channel: usize, output: &mut [f32]) {
        assert!(
            channel < self.channels,
            "channel {channel} out of range for {}-channel buffer",
            self.channels
        );
        let output = &mut output[..self.frames];
        for (out, frame) in output.iter_mut().zip(self.samples.chunks_exact(self.channels)) {
            *out = frame[channel];
        }
    }

    /// Copy into an interleaved `out_buffer` of `out_frames` x `out_channels`.
    ///
    /// As many frames as both sides hold are copied. When the destination has
    /// fewer channels the extra source channels are dropped; when it has more,
    /// source channels repeat cyclically (mono fills every output channel,
    /// stereo tiles in L/R pairs). Destination frames past the copied range
    /// are left untouched.
    pub fn copy_to(&self, out_buffer: &mut [f32], out_frames: usize, out_channels: usize) {
        if self.channels == 0 || out_channels == 0 {
            return;
        }
        let frames = self.frames.min(out_frames);
        let out = &mut out_buffer[..frames * out_channels];

        if out_channels == self.channels {
            out.copy_from_slice(&self.samples[..frames * out_channels]);
            return;
        }

        let in_frames = self.samples.chunks_exact(self.channels);
        for (out_frame, in_frame) in out.chunks_exact_mut(out_channels).zip(in_frames) {
            for (ch, sample) in out_frame.iter_mut().enumerate() {
                *sample = in_frame[ch % self.channels];
            }
        }
    }

    /// Add `source * gain` into `self` sample by sample.
    ///
    /// Both buffers must share a shape; the shorter length wins otherwise.
    pub fn mix_from(&mut self, source: &AudioBuffer, gain: f32) {
        for (dst, src) in self.samples.iter_mut().zip(source.samples.iter()) {
            *dst += *src * gain;
        }
    }
}
