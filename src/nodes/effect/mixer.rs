//! Mixer effect - sums multiple weighted, panned inputs together

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::buffer::AudioBuffer;
use crate::error::{log_rejection, ConnectError};
use crate::node::{check_edge, same_unit, unit_addr, wiring_lock, Sink, Source, Unit};

/// Per-channel weights `(left, right)` for a pan position in `[-1, 1]`.
///
/// Linear balance law: the centre is unity on both sides, and panning fades
/// the opposite side out linearly. Out-of-range positions are clamped.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
}

/// One connection, as seen by the control side.
#[derive(Clone)]
struct MixerInput {
    source: Weak<dyn Source>,
    volume: f32,
    pan: f32,
}

/// One connection, as seen by the render side. Slots are reused across
/// blocks so steady-state rendering does not allocate.
#[derive(Default)]
struct MixSlot {
    source: Option<Arc<dyn Source>>,
    volume: f32,
    pan: f32,
    buffer: AudioBuffer,
}

#[derive(Default)]
struct RenderState {
    slots: Vec<MixSlot>,
    working: AudioBuffer,
}

/// A mixer that sums any number of inputs into one output.
///
/// Every input has its own volume (default 1.0) and pan (default 0.0, centre).
/// Each block, every input is pulled at the requested shape into a private
/// buffer, scaled by `volume * master_volume`, panned and accumulated. No
/// clipping happens here: the sum can exceed `[-1, 1]`.
///
/// Pan only applies to outputs with two or more channels; even channels take
/// the left weight and odd channels the right weight (see [`pan_gains`]).
///
/// ```
/// use std::sync::Arc;
/// use soundchain::{Mixer, Sink, Source, TestTone};
///
/// let low: Arc<dyn Source> = Arc::new(TestTone::new(48_000).with_frequency(220.0));
/// let high: Arc<dyn Source> = Arc::new(TestTone::new(48_000).with_frequency(880.0));
///
/// let mixer = Mixer::new();
/// mixer.add_input_from(&low).unwrap();
/// mixer.add_input_from(&high).unwrap();
/// mixer.set_pan(&high, 0.5).unwrap();
/// mixer.set_master_volume(0.5);
/// ```
pub struct Mixer {
    name: String,
    inputs: Mutex<Vec<MixerInput>>,
    master_volume: AtomicU32,
    sample_rate: AtomicU32,
    render: Mutex<RenderState>,
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            name: "mixer".to_owned(),
            inputs: Mutex::new(Vec::new()),
            master_volume: AtomicU32::new(1.0f32.to_bits()),
            sample_rate: AtomicU32::new(0),
            render: Mutex::new(RenderState::default()),
        }
    }

    /// Give this mixer its own name (builder pattern).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the output gain applied on top of every input's volume.
    /// NaN and infinities are ignored.
    pub fn set_master_volume(&self, volume: f32) {
        if volume.is_finite() {
            self.master_volume.store(volume.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume.load(Ordering::Relaxed))
    }

    /// Set the volume of the input coming from `source`.
    ///
    /// Returns [`ConnectError::NotConnected`] if `source` is not an input.
    /// NaN and infinities leave the volume unchanged.
    pub fn set_volume(&self, source: &Arc<dyn Source>, volume: f32) -> Result<(), ConnectError> {
        self.update_input(source, |input| {
            if volume.is_finite() {
                input.volume = volume;
            }
        })
    }

    /// Set the pan of the input coming from `source`, `-1.0` (left) to `1.0` (right).
    ///
    /// Returns [`ConnectError::NotConnected`] if `source` is not an input.
    /// NaN and infinities leave the pan unchanged.
    pub fn set_pan(&self, source: &Arc<dyn Source>, pan: f32) -> Result<(), ConnectError> {
        self.update_input(source, |input| {
            if pan.is_finite() {
                input.pan = pan.clamp(-1.0, 1.0);
            }
        })
    }

    /// Volume of the input coming from `source`, if connected.
    pub fn volume(&self, source: &Arc<dyn Source>) -> Option<f32> {
        self.find_input(source, |input| input.volume)
    }

    /// Pan of the input coming from `source`, if connected.
    pub fn pan(&self, source: &Arc<dyn Source>) -> Option<f32> {
        self.find_input(source, |input| input.pan)
    }

    /// Number of connected inputs.
    pub fn input_count(&self) -> usize {
        self.inputs.lock().iter().filter(|input| input.source.strong_count() > 0).count()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    fn update_input(
        &self,
        source: &Arc<dyn Source>,
        update: impl FnOnce(&mut MixerInput),
    ) -> Result<(), ConnectError> {
        let mut inputs = self.inputs.lock();
        let input = inputs
            .iter_mut()
            .find(|input| same_unit(&input.source, source))
            .ok_or(ConnectError::NotConnected)?;
        update(input);
        Ok(())
    }

    fn find_input<R>(&self, source: &Arc<dyn Source>, read: impl FnOnce(&MixerInput) -> R) -> Option<R> {
        let inputs = self.inputs.lock();
        inputs.iter().find(|input| same_unit(&input.source, source)).map(read)
    }

    // Drops records whose upstream is gone.
    fn prune(inputs: &mut Vec<MixerInput>) {
        inputs.retain(|input| input.source.strong_count() > 0);
    }

    fn try_add(&self, source: &Arc<dyn Source>) -> Result<(), ConnectError> {
        {
            let mut inputs = self.inputs.lock();
            Self::prune(&mut inputs);
            if inputs.iter().any(|input| same_unit(&input.source, source)) {
                return Err(ConnectError::DuplicateInput);
            }
        }
        check_edge(unit_addr(self as *const Self), source)?;
        self.inputs.lock().push(MixerInput {
            source: Arc::downgrade(source),
            volume: 1.0,
            pan: 0.0,
        });
        Ok(())
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies the wiring and levels into a new mixer that pulls from the same
/// upstream sources.
///
/// Use with care: two mixers sharing inputs will both pull from them, so
/// stateful sources (oscillators, effects) advance twice per block and can
/// be rendered from two threads at once.
impl Clone for Mixer {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inputs: Mutex::new(self.inputs.lock().clone()),
            master_volume: AtomicU32::new(self.master_volume.load(Ordering::Relaxed)),
            sample_rate: AtomicU32::new(self.sample_rate()),
            render: Mutex::new(RenderState::default()),
        }
    }
}

impl Unit for Mixer {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<Arc<dyn Source>> {
        self.inputs.lock().iter().filter_map(|input| input.source.upgrade()).collect()
    }
}

impl Source for Mixer {
    fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Relaxed);
        // Collect first so the list lock is not held while upstream recurses.
        for source in self.inputs() {
            source.set_sample_rate(rate);
        }
    }

    fn audio_requested(&self, buffer: &mut [f32], num_frames: usize, num_channels: usize) {
        let mut render = self.render.lock();
        let RenderState { slots, working } = &mut *render;

        // Snapshot the connections; the list lock is only held for the copy.
        let active = {
            let inputs = self.inputs.lock();
            if slots.len() < inputs.len() {
                slots.resize_with(inputs.len(), MixSlot::default);
            }
            for (slot, input) in slots.iter_mut().zip(inputs.iter()) {
                slot.source = input.source.upgrade();
                slot.volume = input.volume;
                slot.pan = input.pan;
            }
            inputs.len()
        };

        let master = self.master_volume();
        working.allocate(num_frames, num_channels);
        working.clear();

        for slot in &mut slots[..active] {
            let Some(source) = slot.source.take() else {
                continue;
            };
            slot.buffer.allocate(num_frames, num_channels);
            source.audio_requested(slot.buffer.as_mut_slice(), num_frames, num_channels);

            let gain = slot.volume * master;
            if num_channels < 2 {
                working.mix_from(&slot.buffer, gain);
                continue;
            }

            let (left, right) = pan_gains(slot.pan);
            let (left, right) = (gain * left, gain * right);
            let out_frames = working.as_mut_slice().chunks_exact_mut(num_channels);
            let in_frames = slot.buffer.as_slice().chunks_exact(num_channels);
            for (out_frame, in_frame) in out_frames.zip(in_frames) {
                for (ch, (out, &sample)) in out_frame.iter_mut().zip(in_frame).enumerate() {
                    *out += sample * if ch % 2 == 0 { left } else { right };
                }
            }
        }

        working.copy_to(buffer, num_frames, num_channels);
    }
}

impl Sink for Mixer {
    fn add_input_from(&self, source: &Arc<dyn Source>) -> Result<(), ConnectError> {
        let _wiring = wiring_lock();
        let result = self.try_add(source);
        match result {
            Ok(()) => tracing::debug!(mixer = %self.name, source = source.name(), "input added"),
            Err(err) => log_rejection(&self.name, source.name(), err),
        }
        result
    }

    fn remove_input_from(&self, source: &Arc<dyn Source>) -> Result<(), ConnectError> {
        let _wiring = wiring_lock();
        let mut inputs = self.inputs.lock();
        Self::prune(&mut inputs);
        let index = inputs
            .iter()
            .position(|input| same_unit(&input.source, source))
            .ok_or(ConnectError::NotConnected)?;
        inputs.remove(index);
        tracing::debug!(mixer = %self.name, source = source.name(), "input removed");
        Ok(())
    }

    fn clear_inputs(&self) {
        let _wiring = wiring_lock();
        self.inputs.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::effect::{Effect, Passthrough};

    struct Constant(f32);

    impl Unit for Constant {
        fn name(&self) -> &str {
            "constant"
        }
    }

    impl Source for Constant {
        fn audio_requested(&self, buffer: &mut [f32], num_frames: usize, num_channels: usize) {
            buffer[..num_frames * num_channels].fill(self.0);
        }
    }

    fn constant(v: f32) -> Arc<dyn Source> {
        Arc::new(Constant(v))
    }

    fn render(mixer: &Mixer, frames: usize, channels: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * channels];
        mixer.audio_requested(&mut out, frames, channels);
        out
    }

    #[test]
    fn empty_mixer_is_silent() {
        assert_eq!(render(&Mixer::new(), 4, 2), vec![0.0; 8]);
    }

    #[test]
    fn two_constant_inputs_sum() {
        let (a, b) = (constant(0.25), constant(0.25));
        let mixer = Mixer::new();
        mixer.add_input_from(&a).unwrap();
        mixer.add_input_from(&b).unwrap();

        for channels in 1..=4 {
            assert_eq!(render(&mixer, 16, channels), vec![0.5; 16 * channels]);
        }
    }

    #[test]
    fn sum_is_not_clipped() {
        let (a, b) = (constant(0.9), constant(0.9));
        let mixer = Mixer::new();
        mixer.add_input_from(&a).unwrap();
        mixer.add_input_from(&b).unwrap();
        assert!(render(&mixer, 4, 1).iter().all(|&s| (s - 1.8).abs() < 1e-6));
    }

    #[test]
    fn volume_and_master_scale() {
        let a = constant(1.0);
        let mixer = Mixer::new();
        mixer.add_input_from(&a).unwrap();
        mixer.set_volume(&a, 0.5).unwrap();
        mixer.set_master_volume(0.5);
        assert_eq!(render(&mixer, 2, 1), vec![0.25; 2]);
    }

    #[test]
    fn pan_weights_stereo_pairs() {
        let a = constant(1.0);
        let mixer = Mixer::new();
        mixer.add_input_from(&a).unwrap();
        mixer.set_pan(&a, 0.5).unwrap();

        assert_eq!(render(&mixer, 1, 2), vec![0.5, 1.0]);
        assert_eq!(render(&mixer, 1, 4), vec![0.5, 1.0, 0.5, 1.0]);
        assert_eq!(render(&mixer, 1, 1), vec![1.0], "mono output ignores pan");
    }

    #[test]
    fn pan_law_endpoints() {
        assert_eq!(pan_gains(0.0), (1.0, 1.0));
        assert_eq!(pan_gains(-1.0), (1.0, 0.0));
        assert_eq!(pan_gains(1.0), (0.0, 1.0));
        assert_eq!(pan_gains(7.0), (0.0, 1.0));
    }

    #[test]
    fn non_finite_levels_are_ignored() {
        let a = constant(1.0);
        let mixer = Mixer::new();
        mixer.add_input_from(&a).unwrap();
        mixer.set_volume(&a, 0.3).unwrap();
        mixer.set_pan(&a, -0.2).unwrap();

        mixer.set_volume(&a, f32::NAN).unwrap();
        mixer.set_pan(&a, f32::INFINITY).unwrap();
        mixer.set_master_volume(f32::NEG_INFINITY);

        assert_eq!(mixer.volume(&a), Some(0.3));
        assert_eq!(mixer.pan(&a), Some(-0.2));
        assert_eq!(mixer.master_volume(), 1.0);
    }

    #[test]
    fn levels_for_unknown_source_report_not_connected() {
        let a = constant(1.0);
        let mixer = Mixer::new();
        assert_eq!(mixer.set_volume(&a, 0.5), Err(ConnectError::NotConnected));
        assert_eq!(mixer.set_pan(&a, 0.5), Err(ConnectError::NotConnected));
        assert_eq!(mixer.volume(&a), None);
    }

    #[test]
    fn duplicate_input_is_rejected() {
        let a = constant(1.0);
        let mixer = Mixer::new();
        mixer.add_input_from(&a).unwrap();
        assert_eq!(mixer.add_input_from(&a), Err(ConnectError::DuplicateInput));
        assert_eq!(mixer.input_count(), 1);
    }

    #[test]
    fn dropped_inputs_are_pruned_on_rewire() {
        let mixer = Mixer::new();
        for _ in 0..16 {
            let short_lived = constant(1.0);
            mixer.add_input_from(&short_lived).unwrap();
        }
        let kept = constant(0.5);
        mixer.add_input_from(&kept).unwrap();

        assert_eq!(mixer.inputs.lock().len(), 1);
        assert_eq!(mixer.input_count(), 1);
        assert_eq!(render(&mixer, 2, 1), vec![0.5; 2]);

        let other = constant(0.25);
        mixer.add_input_from(&other).unwrap();
        drop(other);
        mixer.remove_input_from(&kept).unwrap();
        assert!(mixer.inputs.lock().is_empty());
    }

    #[test]
    fn feedback_through_effect_is_rejected() {
        let mixer = Arc::new(Mixer::new());
        let fx = Arc::new(Effect::new(Passthrough));
        let mixer_src: Arc<dyn Source> = mixer.clone();
        let fx_src: Arc<dyn Source> = fx.clone();

        fx.add_input_from(&mixer_src).unwrap();
        assert_eq!(mixer.add_input_from(&fx_src), Err(ConnectError::Cycle));
        assert_eq!(mixer.add_input_from(&mixer_src), Err(ConnectError::SelfConnection));
        assert_eq!(mixer.input_count(), 0);
    }

    #[test]
    fn remove_and_clear_inputs() {
        let (a, b) = (constant(1.0), constant(2.0));
        let mixer = Mixer::new();
        mixer.add_input_from(&a).unwrap();
        mixer.add_input_from(&b).unwrap();

        mixer.remove_input_from(&a).unwrap();
        assert_eq!(mixer.remove_input_from(&a), Err(ConnectError::NotConnected));
        assert_eq!(render(&mixer, 1, 1), vec![2.0]);

        mixer.clear_inputs();
        assert_eq!(render(&mixer, 1, 1), vec![0.0]);
    }

    #[test]
    fn clone_shares_upstream_sources() {
        let a = constant(0.5);
        let mixer = Mixer::new().with_name("bus");
        mixer.add_input_from(&a).unwrap();
        mixer.set_volume(&a, 2.0).unwrap();

        let copy = mixer.clone();
        assert_eq!(copy.name(), "bus");
        assert_eq!(copy.volume(&a), Some(2.0));
        assert_eq!(render(&copy, 2, 1), vec![1.0; 2]);

        copy.set_volume(&a, 1.0).unwrap();
        assert_eq!(mixer.volume(&a), Some(2.0));
    }

    #[test]
    fn sample_rate_reaches_inputs() {
        let fx = Arc::new(Effect::new(Passthrough));
        let fx_src: Arc<dyn Source> = fx.clone();
        let mixer = Mixer::new();
        mixer.add_input_from(&fx_src).unwrap();

        mixer.set_sample_rate(22_050);
        assert_eq!(mixer.sample_rate(), 22_050);
        assert_eq!(fx.sample_rate(), 22_050);
    }
}
