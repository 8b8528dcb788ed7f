//! Core unit traits and the single-input sink port.
//!
//! Every node in a graph is a [`Unit`]. On top of that a node picks the
//! capabilities it needs:
//! - [`Source`]: produces audio on request (generators, effects, mixers)
//! - [`Sink`]: pulls audio from upstream (effects, mixers, terminal outputs)
//!
//! Nodes are shared as `Arc`s so the render thread and a control thread can
//! both hold them. Connections are stored as `Weak` references: a sink never
//! keeps its upstream alive, and a dropped upstream simply renders silence.

use std::sync::{Arc, Weak};

use hashbrown::HashSet;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::buffer::AudioBuffer;
use crate::error::{log_rejection, ConnectError};

/// Identity and introspection shared by every node.
pub trait Unit: Send + Sync {
    /// Human-readable name of this unit.
    fn name(&self) -> &str;

    /// The sources currently feeding this unit. Generators have none.
    fn inputs(&self) -> Vec<Arc<dyn Source>> {
        Vec::new()
    }
}

/// A unit that produces audio.
pub trait Source: Unit {
    /// Called when the graph's sample rate changes. Override if the unit cares.
    fn set_sample_rate(&self, _rate: u32) {}

    /// Fill `buffer` with `num_frames * num_channels` interleaved samples.
    ///
    /// Runs on the audio thread: must not block on I/O or allocate in steady
    /// state. The full `num_frames * num_channels` prefix of `buffer` must be
    /// written.
    fn audio_requested(&self, buffer: &mut [f32], num_frames: usize, num_channels: usize);
}

/// A unit that pulls audio from upstream.
pub trait Sink: Unit {
    /// Connect `source` as an input.
    ///
    /// Fails without changing anything if the connection is a duplicate, the
    /// sink is full, or audio would flow back into `source`.
    fn add_input_from(&self, source: &Arc<dyn Source>) -> Result<(), ConnectError>;

    /// Disconnect `source`.
    fn remove_input_from(&self, source: &Arc<dyn Source>) -> Result<(), ConnectError>;

    /// Disconnect every input.
    fn clear_inputs(&self);

    /// Push externally captured audio (e.g. a line input) into this sink.
    ///
    /// The default implementation ignores it.
    fn audio_received(&self, _buffer: &[f32], _num_frames: usize, _num_channels: usize) {}

    /// Pass a new sample rate up the chain feeding this sink.
    ///
    /// Terminal sinks use this to retune everything they pull from. The
    /// default forwards `rate` to every current input.
    fn propagate_sample_rate(&self, rate: u32) {
        for input in self.inputs() {
            input.set_sample_rate(rate);
        }
    }
}

// Serializes all wiring changes so a cycle check and the edge it guards are
// one atomic step. Only control threads take it; the render path never does.
static WIRING: Mutex<()> = parking_lot::const_mutex(());

pub(crate) fn wiring_lock() -> MutexGuard<'static, ()> {
    WIRING.lock()
}

/// Address of the shared allocation behind a unit, used as its identity.
#[inline]
pub(crate) fn unit_addr<T: ?Sized>(unit: *const T) -> usize {
    unit.cast::<()>() as usize
}

#[inline]
pub(crate) fn same_unit(weak: &Weak<dyn Source>, source: &Arc<dyn Source>) -> bool {
    unit_addr(weak.as_ptr()) == unit_addr(Arc::as_ptr(source))
}

/// Would connecting `source` into the sink at `sink_addr` close a loop?
///
/// Walks the upstream graph of `source` depth-first. Each unit is visited
/// once, so diamond-shaped graphs stay linear in the number of units.
pub(crate) fn would_create_cycle(sink_addr: usize, source: &Arc<dyn Source>) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![Arc::clone(source)];

    while let Some(unit) = stack.pop() {
        let addr = unit_addr(Arc::as_ptr(&unit));
        if addr == sink_addr {
            return true;
        }
        if visited.insert(addr) {
            stack.extend(unit.inputs());
        }
    }
    false
}

/// Validate a new edge from `source` into the sink at `sink_addr`.
pub(crate) fn check_edge(sink_addr: usize, source: &Arc<dyn Source>) -> Result<(), ConnectError> {
    if unit_addr(Arc::as_ptr(source)) == sink_addr {
        return Err(ConnectError::SelfConnection);
    }
    if would_create_cycle(sink_addr, source) {
        return Err(ConnectError::Cycle);
    }
    Ok(())
}

struct PortState {
    buffer: AudioBuffer,
    captured: AudioBuffer,
    has_capture: bool,
}

/// Single-input plumbing shared by simple sinks.
///
/// Holds the upstream reference and the buffer audio is pulled into. The two
/// live under separate locks: connecting only waits for a pointer swap, never
/// for a render in progress.
pub struct SinkPort {
    input: Mutex<Option<Weak<dyn Source>>>,
    state: Mutex<PortState>,
}

impl SinkPort {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(None),
            state: Mutex::new(PortState {
                buffer: AudioBuffer::new(),
                captured: AudioBuffer::new(),
                has_capture: false,
            }),
        }
    }

    /// The connected upstream, if any and still alive.
    pub fn input(&self) -> Option<Arc<dyn Source>> {
        self.input.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn is_connected(&self) -> bool {
        self.input().is_some()
    }

    /// Connect `source` into the sink whose identity is `owner`.
    ///
    /// `owner` must point at the unit that holds this port, so that cycle
    /// detection can recognise it upstream.
    pub fn connect<T: ?Sized>(
        &self,
        owner: &T,
        owner_name: &str,
        source: &Arc<dyn Source>,
    ) -> Result<(), ConnectError> {
        let _wiring = wiring_lock();
        let result = self.try_connect(unit_addr(owner as *const T), source);
        match result {
            Ok(()) => tracing::debug!(sink = owner_name, source = source.name(), "connected"),
            Err(err) => log_rejection(owner_name, source.name(), err),
        }
        result
    }

    fn try_connect(&self, owner_addr: usize, source: &Arc<dyn Source>) -> Result<(), ConnectError> {
        if self.is_connected() {
            return Err(ConnectError::AlreadyConnected);
        }
        check_edge(owner_addr, source)?;
        *self.input.lock() = Some(Arc::downgrade(source));
        Ok(())
    }

    /// Disconnect `source` if it is the current input.
    pub fn disconnect(&self, source: &Arc<dyn Source>) -> Result<(), ConnectError> {
        let _wiring = wiring_lock();
        let mut input = self.input.lock();
        match input.as_ref() {
            Some(weak) if same_unit(weak, source) => {
                *input = None;
                tracing::debug!(source = source.name(), "disconnected");
                Ok(())
            }
            _ => Err(ConnectError::NotConnected),
        }
    }

    /// Drop the input, whatever it is.
    pub fn clear(&self) {
        let _wiring = wiring_lock();
        self.input.lock().take();
    }

    /// Pull `num_frames` x `num_channels` from upstream into the input buffer.
    ///
    /// With nothing connected the buffer holds captured audio from
    /// [`receive`](Self::receive) if any arrived since the last pull, and
    /// silence otherwise. The returned guard keeps the buffer locked while
    /// the caller reads it.
    pub fn fill_input_buffer_from_upstream(
        &self,
        num_frames: usize,
        num_channels: usize,
    ) -> MappedMutexGuard<'_, AudioBuffer> {
        // Only hold the input lock long enough to grab a strong reference.
        let upstream = self.input();

        let mut state = self.state.lock();
        let PortState { buffer, captured, has_capture } = &mut *state;
        buffer.allocate(num_frames, num_channels);

        match upstream {
            Some(source) => source.audio_requested(buffer.as_mut_slice(), num_frames, num_channels),
            None => {
                buffer.clear();
                if *has_capture {
                    captured.copy_to(buffer.as_mut_slice(), num_frames, num_channels);
                    *has_capture = false;
                }
            }
        }

        MutexGuard::map(state, |s| &mut s.buffer)
    }

    /// Store externally captured audio for the next pull.
    pub fn receive(&self, buffer: &[f32], num_frames: usize, num_channels: usize) {
        let mut state = self.state.lock();
        state.captured.allocate(num_frames, num_channels);
        let len = (num_frames * num_channels).min(buffer.len());
        let captured = state.captured.as_mut_slice();
        captured[..len].copy_from_slice(&buffer[..len]);
        captured[len..].fill(0.0);
        state.has_capture = true;
    }
}

impl Default for SinkPort {
    fn default() -> Self {
        Self::new()
    }
}
