//! Connection errors.

use thiserror::Error;

/// Why a connect or disconnect request was refused.
///
/// A refused request never mutates the graph.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The sink accepts a single input and already has one.
    #[error("sink already has an input")]
    AlreadyConnected,

    /// The mixer already has an input from this source.
    #[error("source is already an input of this mixer")]
    DuplicateInput,

    /// The edge would let audio flow back into its own producer.
    #[error("connection would create a cycle")]
    Cycle,

    /// A unit cannot be its own input.
    #[error("a unit cannot be connected to itself")]
    SelfConnection,

    /// No such connection exists.
    #[error("source is not connected to this sink")]
    NotConnected,

    /// The id does not refer to a unit in this graph.
    #[error("no unit with this id in the graph")]
    UnknownUnit,

    /// The upstream unit cannot produce audio.
    #[error("upstream unit is not a source")]
    NotASource,

    /// The downstream unit cannot accept inputs.
    #[error("downstream unit is not a sink")]
    NotASink,
}

pub(crate) fn log_rejection(sink: &str, source: &str, err: ConnectError) {
    #[cfg(feature = "warn_on_reject")]
    tracing::warn!(sink, source, "connection rejected: {err}");
    #[cfg(not(feature = "warn_on_reject"))]
    tracing::debug!(sink, source, "connection rejected: {err}");
}
