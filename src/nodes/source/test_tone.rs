//! Test tone oscillator

use core::f32::consts::TAU;

use parking_lot::Mutex;

use crate::node::{Source, Unit};

/// Waveform produced by a [`TestTone`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    #[default]
    Sine,
    /// Rising ramp from -1 to 1.
    Sawtooth,
}

struct ToneState {
    frequency: f32,
    amplitude: f32,
    waveform: Waveform,
    sample_rate: u32,
    phase: f32,
    phase_advance: f32,
    saw_phase: f32,
    saw_advance: f32,
}

impl ToneState {
    fn update_advance(&mut self) {
        let rate = self.sample_rate.max(1) as f32;
        self.phase_advance = TAU * self.frequency / rate;
        self.saw_advance = 2.0 * self.frequency / rate;
    }
}

/// A mono test oscillator, written identically to every output channel.
///
/// Phase is kept across frequency and sample-rate changes, so retuning while
/// rendering never produces a discontinuity.
pub struct TestTone {
    state: Mutex<ToneState>,
}

impl TestTone {
    /// A 440 Hz sine at the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        let mut state = ToneState {
            frequency: 440.0,
            amplitude: 0.25, // -12dB, safe default
            waveform: Waveform::Sine,
            sample_rate,
            phase: 0.0,
            phase_advance: 0.0,
            saw_phase: 0.0,
            saw_advance: 0.0,
        };
        state.update_advance();
        Self { state: Mutex::new(state) }
    }

    pub fn with_frequency(self, frequency: f32) -> Self {
        self.set_frequency(frequency);
        self
    }

    pub fn with_waveform(self, waveform: Waveform) -> Self {
        self.set_waveform(waveform);
        self
    }

    pub fn with_amplitude(self, amplitude: f32) -> Self {
        self.set_amplitude(amplitude);
        self
    }

    /// Set the frequency in Hz. Negative values clamp to 0; NaN and
    /// infinities are ignored.
    pub fn set_frequency(&self, frequency: f32) {
        if !frequency.is_finite() {
            return;
        }
        let mut state = self.state.lock();
        state.frequency = frequency.max(0.0);
        state.update_advance();
    }

    /// Set the frequency from a MIDI note number. Fractional notes detune.
    ///
    /// Uses the standard tuning where note 69 (A4) is 440 Hz. Older patches
    /// that treated note 60 as 440 Hz will sound nine semitones lower; add 9
    /// to their note numbers.
    pub fn set_frequency_midi_note(&self, note: f32) {
        self.set_frequency(440.0 * 2.0f32.powf((note - 69.0) / 12.0));
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.state.lock().waveform = waveform;
    }

    /// Set the output amplitude, clamped to `[0, 1]`.
    pub fn set_amplitude(&self, amplitude: f32) {
        if amplitude.is_finite() {
            self.state.lock().amplitude = amplitude.clamp(0.0, 1.0);
        }
    }

    pub fn frequency(&self) -> f32 {
        self.state.lock().frequency
    }

    pub fn waveform(&self) -> Waveform {
        self.state.lock().waveform
    }

    pub fn amplitude(&self) -> f32 {
        self.state.lock().amplitude
    }
}

impl Unit for TestTone {
    fn name(&self) -> &str {
        "test tone"
    }
}

impl Source for TestTone {
    fn set_sample_rate(&self, rate: u32) {
        let mut state = self.state.lock();
        state.sample_rate = rate;
        state.update_advance();
    }

    fn audio_requested(&self, buffer: &mut [f32], num_frames: usize, num_channels: usize) {
        if num_channels == 0 {
            return;
        }
        let mut state = self.state.lock();
        let amplitude = state.amplitude;

        for frame in buffer[..num_frames * num_channels].chunks_exact_mut(num_channels) {
            let sample = match state.waveform {
                Waveform::Sine => state.phase.sin(),
                Waveform::Sawtooth => state.saw_phase,
            };
            frame.fill(sample * amplitude);

            // Both phases run so switching waveform mid-stream stays in step.
            // Above the sample rate one step can span several periods.
            state.phase = (state.phase + state.phase_advance).rem_euclid(TAU);
            state.saw_phase = (state.saw_phase + state.saw_advance + 1.0).rem_euclid(2.0) - 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(tone: &TestTone, frames: usize, channels: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * channels];
        tone.audio_requested(&mut out, frames, channels);
        out
    }

    #[test]
    fn consecutive_pulls_are_phase_continuous() {
        let split = TestTone::new(44_100).with_frequency(440.0);
        let whole = TestTone::new(44_100).with_frequency(440.0);

        let mut joined = render(&split, 100, 1);
        joined.extend(render(&split, 100, 1));
        assert_eq!(joined, render(&whole, 200, 1));
    }

    #[test]
    fn starts_at_zero_phase() {
        let tone = TestTone::new(44_100).with_amplitude(1.0);
        let out = render(&tone, 2, 1);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - (TAU * 440.0 / 44_100.0).sin()).abs() < 1e-6);
    }

    #[test]
    fn frequency_change_keeps_phase() {
        let tone = TestTone::new(44_100).with_amplitude(1.0);
        let first = render(&tone, 100, 1);
        tone.set_frequency(880.0);
        let second = render(&tone, 100, 1);

        // The first sample after retuning continues from where the last
        // block left off, one old-frequency step later.
        let step = TAU * 440.0 / 44_100.0;
        assert!((second[0] - first[99]).abs() <= step + 1e-5);
    }

    #[test]
    fn every_channel_gets_the_same_sample() {
        let tone = TestTone::new(48_000);
        for frame in render(&tone, 32, 3).chunks_exact(3) {
            assert_eq!(frame[0], frame[1]);
            assert_eq!(frame[1], frame[2]);
        }
    }

    #[test]
    fn sawtooth_stays_in_range() {
        let tone = TestTone::new(8_000)
            .with_waveform(Waveform::Sawtooth)
            .with_frequency(1_000.0)
            .with_amplitude(1.0);
        let out = render(&tone, 64, 1);
        assert!(out.iter().all(|&s| (-1.0..1.0).contains(&s)));
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn midi_note_sets_frequency() {
        let tone = TestTone::new(48_000);
        tone.set_frequency_midi_note(81.0);
        assert!((tone.frequency() - 880.0).abs() < 1e-3);
    }

    #[test]
    fn invalid_parameters_are_ignored() {
        let tone = TestTone::new(48_000).with_frequency(100.0);
        tone.set_frequency(f32::NAN);
        tone.set_amplitude(f32::INFINITY);
        assert_eq!(tone.frequency(), 100.0);
        assert_eq!(tone.amplitude(), 0.25);

        tone.set_frequency(-5.0);
        assert_eq!(tone.frequency(), 0.0);
    }

    #[test]
    fn frequencies_above_sample_rate_stay_bounded() {
        for waveform in [Waveform::Sine, Waveform::Sawtooth] {
            let tone = TestTone::new(44_100)
                .with_waveform(waveform)
                .with_frequency(100_000.0)
                .with_amplitude(1.0);
            let out = render(&tone, 1_000, 1);
            assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0), "{waveform:?}");

            let state = tone.state.lock();
            assert!((0.0..TAU).contains(&state.phase));
            assert!((-1.0..1.0).contains(&state.saw_phase));
        }
    }
}
