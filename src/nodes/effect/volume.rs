//! Declicked volume control

use std::sync::atomic::{AtomicU32, Ordering};

use crate::buffer::AudioBuffer;
use crate::declick::DeclickedValue;

use super::Process;

/// Volume target shared with control threads.
///
/// Stored as f32 bits in an atomic, so setting it never waits on the audio
/// thread. The new value is picked up at the start of the next block.
#[derive(Debug)]
pub struct VolumeParams {
    volume: AtomicU32,
}

impl VolumeParams {
    pub fn new(volume: f32) -> Self {
        let volume = if volume.is_finite() { volume } else { 0.0 };
        Self {
            volume: AtomicU32::new(volume.to_bits()),
        }
    }

    /// Set the target gain. NaN and infinities are ignored.
    pub fn set_volume(&self, volume: f32) {
        if volume.is_finite() {
            self.volume.store(volume.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }
}

/// Scales every channel by a declicked gain.
///
/// Volume changes ramp over 64 frames, so they can be made from a control
/// thread at any time without clicks. Change the gain through the shared
/// [`VolumeParams`] (see [`Effect::params`](super::Effect::params)).
#[derive(Clone, Debug)]
pub struct Volume {
    volume: DeclickedValue,
}

impl Volume {
    /// Create a volume stage at the given gain (1.0 = unity).
    pub fn new(volume: f32) -> Self {
        Self {
            volume: DeclickedValue::new(volume),
        }
    }

    /// Jump straight to `volume`, with no ramp.
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = DeclickedValue::new(volume);
        self
    }

    /// The target gain (what the ramp is heading towards).
    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume.raw_value()
    }

    /// The gain applied to the most recent frame.
    #[inline]
    pub fn current_volume(&self) -> f32 {
        self.volume.declicked_value()
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Process for Volume {
    type Params = VolumeParams;

    const NAME: &'static str = "volume";

    fn params(&self) -> VolumeParams {
        VolumeParams::new(self.volume.raw_value())
    }

    fn process(
        &mut self,
        params: &VolumeParams,
        input: &AudioBuffer,
        output: &mut [f32],
        num_frames: usize,
        num_channels: usize,
    ) {
        let target = params.volume();
        if target != self.volume.raw_value() {
            self.volume.set_value(target);
        }
        self.volume.rebuild_ramp_if_necessary();

        if num_channels == 0 {
            return;
        }
        let in_channels = input.channels().max(1);
        let out_frames = output[..num_frames * num_channels].chunks_exact_mut(num_channels);
        let in_frames = input.as_slice().chunks_exact(in_channels);

        for (out_frame, in_frame) in out_frames.zip(in_frames) {
            let gain = self.volume.declicked_value();
            for (out, &sample) in out_frame.iter_mut().zip(in_frame) {
                *out = sample * gain;
            }
            self.volume.frame_tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ones(frames: usize, channels: usize) -> AudioBuffer {
        AudioBuffer::from_interleaved(vec![1.0; frames * channels], frames, channels)
    }

    #[test]
    fn steady_gain_scales_every_channel() {
        let mut vol = Volume::new(0.5);
        let params = vol.params();
        let mut out = vec![0.0; 8];
        vol.process(&params, &ones(4, 2), &mut out, 4, 2);
        assert_eq!(out, vec![0.5; 8]);
    }

    #[test]
    fn change_ramps_per_frame_not_per_sample() {
        let mut vol = Volume::new(0.0);
        let params = vol.params();
        params.set_volume(1.0);

        let mut out = vec![0.0; 128 * 2];
        vol.process(&params, &ones(128, 2), &mut out, 128, 2);

        for frame in out.chunks_exact(2) {
            assert_eq!(frame[0], frame[1], "channels of a frame share one gain");
        }
        for pair in out.chunks_exact(2).collect::<Vec<_>>().windows(2) {
            assert!((pair[1][0] - pair[0][0]).abs() <= 1.0 / 63.0 + 1e-6);
        }
        assert!((out[out.len() - 1] - 1.0).abs() < 1e-5);
        assert_eq!(vol.volume(), 1.0);
    }

    #[test]
    fn non_finite_volume_is_ignored() {
        let params = Volume::new(0.8).params();
        params.set_volume(f32::NAN);
        params.set_volume(f32::INFINITY);
        assert_eq!(params.volume(), 0.8);
    }
}
