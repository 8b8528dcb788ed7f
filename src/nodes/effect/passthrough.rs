//! Passthrough effect

use crate::buffer::AudioBuffer;

use super::Process;

/// Copies its input to its output unchanged.
///
/// Input is pulled at the requested shape, so the copy is a straight
/// duplication of `num_frames * num_channels` samples.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl Process for Passthrough {
    type Params = ();

    const NAME: &'static str = "passthrough";

    fn params(&self) {}

    fn process(&mut self, _: &(), input: &AudioBuffer, output: &mut [f32], num_frames: usize, num_channels: usize) {
        let n = num_frames * num_channels;
        output[..n].copy_from_slice(&input.as_slice()[..n]);
    }
}
