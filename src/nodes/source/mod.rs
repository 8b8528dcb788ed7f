mod test_tone;

pub use test_tone::{TestTone, Waveform};
