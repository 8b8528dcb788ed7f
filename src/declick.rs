//! Declicked (ramped) parameter values.

use core::ops::{AddAssign, SubAssign};

/// Length of the declick ramp, in frames (about 1.5ms at 44.1kHz).
pub const RAMP_LEN: usize = 64;

/// A float parameter that glides to new values over [`RAMP_LEN`] frames.
///
/// Jumping a gain from 0 to 1 between two samples produces an audible click.
/// `DeclickedValue` instead writes a linear ramp from the current (smoothed)
/// value to the new target and steps through it one frame at a time.
///
/// Two calls drive it from the audio thread:
/// - [`rebuild_ramp_if_necessary`](Self::rebuild_ramp_if_necessary) once at
///   the start of every block, to pick up values set since the last block
/// - [`frame_tick`](Self::frame_tick) once per frame inside the block
///
/// ```
/// use soundchain::DeclickedValue;
///
/// let mut gain = DeclickedValue::new(0.0);
/// gain.set_value(1.0);
///
/// gain.rebuild_ramp_if_necessary();
/// for _ in 0..64 {
///     // use gain.declicked_value() for this frame...
///     gain.frame_tick();
/// }
/// assert!((gain.declicked_value() - 1.0).abs() < 1e-5);
/// ```
#[derive(Clone, Debug)]
pub struct DeclickedValue {
    current: f32,
    target: f32,
    ramp_needs_rebuild: bool,
    ramp_pos: usize,
    ramp: [f32; RAMP_LEN],
}

impl DeclickedValue {
    pub fn new(start: f32) -> Self {
        let start = if start.is_finite() { start } else { 0.0 };
        Self {
            current: start,
            target: start,
            ramp_needs_rebuild: false,
            ramp_pos: 0,
            ramp: [start; RAMP_LEN],
        }
    }

    /// The smoothed value for the current frame.
    #[inline]
    pub fn declicked_value(&self) -> f32 {
        self.current
    }

    /// The unsmoothed target, for control logic.
    #[inline]
    pub fn raw_value(&self) -> f32 {
        self.target
    }

    /// Set a new target. NaN and infinities are ignored.
    pub fn set_value(&mut self, value: f32) {
        if value.is_finite() {
            self.target = value;
            self.ramp_needs_rebuild = true;
        }
    }

    /// Rebuild the ramp if the target changed. Call before each block.
    pub fn rebuild_ramp_if_necessary(&mut self) {
        if self.ramp_needs_rebuild {
            self.rebuild_ramp();
        }
        self.ramp_needs_rebuild = false;
    }

    /// Advance one frame.
    #[inline]
    pub fn frame_tick(&mut self) {
        self.current = self.ramp[self.ramp_pos];
        self.ramp[self.ramp_pos] = self.target;
        self.ramp_pos = (self.ramp_pos + 1) % RAMP_LEN;
    }

    // The ramp starts from the smoothed value, not the stale target, and is
    // written from the cursor on so an in-flight ramp hands over without a jump.
    fn rebuild_ramp(&mut self) {
        let step = (self.target - self.current) / (RAMP_LEN - 1) as f32;
        let mut value = self.current;
        for i in 0..RAMP_LEN {
            self.ramp[(self.ramp_pos + i) % RAMP_LEN] = value;
            value += step;
        }
    }
}

impl Default for DeclickedValue {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl From<f32> for DeclickedValue {
    fn from(start: f32) -> Self {
        Self::new(start)
    }
}

impl AddAssign<f32> for DeclickedValue {
    fn add_assign(&mut self, adjustment: f32) {
        self.set_value(self.target + adjustment);
    }
}

impl SubAssign<f32> for DeclickedValue {
    fn sub_assign(&mut self, adjustment: f32) {
        self.set_value(self.target - adjustment);
    }
}
