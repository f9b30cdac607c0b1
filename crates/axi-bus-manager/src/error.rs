//! Error types for the bus-manager engines.
//!
//! Three error boundaries, per the crate's error-handling design:
//! caller errors, reported synchronously from `submit`/`write`/`read`;
//! channel-abstraction failures, also reported synchronously; and engine
//! faults, which indicate a broken protocol invariant and terminate the
//! task that found them.

use crate::token::Token;

/// Errors reported synchronously to the caller of `submit_write`/`submit_read`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallerError {
    /// The caller supplied a token that is already active.
    #[error("token {0:?} is already active")]
    DuplicateToken(Token),

    /// `2^size_log2` exceeds the bus byte-width.
    #[error("requested beat size 2^{size_log2} exceeds bus byte-width {bus_width}")]
    InvalidSize {
        /// The requested `size_log2`.
        size_log2: u8,
        /// The bus byte-width the request was checked against.
        bus_width: u64,
    },

    /// A write with zero data bytes, or a read of zero length.
    #[error("request has zero length")]
    EmptyRequest,

    /// The channel abstraction rejected a handshake.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The engine's issue or response task has already terminated, most
    /// likely because it hit an [`EngineFault`] on a previous request.
    #[error("engine task is no longer running")]
    EngineStopped,
}

/// Errors surfaced by a channel implementation (the AW/AR/W/B/R driver).
///
/// The core treats these as infrastructure failures: they propagate to
/// whichever caller triggered the channel operation, without aborting other
/// in-flight requests on the same engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The downstream device rejected or could not complete a handshake.
    #[error("channel rejected handshake: {0}")]
    Rejected(String),
}

/// Fatal protocol-invariant violations.
///
/// These are never returned to a caller as a `Result`: an invariant
/// violation terminates the task that observed it. In this implementation
/// that means the response thread that detected it calls
/// [`Registry::fail_all_in_flight`](crate::registry::Registry::fail_all_in_flight)
/// — completing every token still in flight on that engine with
/// [`CallerError::EngineStopped`] and waking any caller parked in
/// `await_result`/`wait_idle` — and then panics with this value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineFault {
    /// An ID was released to the credit pool while already present in it.
    #[error("id {0} released twice")]
    DoubleRelease(u32),

    /// A response beat arrived tagged with an ID this engine never issued.
    #[error("response beat for unknown id {0}")]
    UnknownId(u32),

    /// The observed `rlast` did not match the planned burst length.
    #[error("rlast mismatch on id {id}: expected last={expected_last} at beat {beat} of {beats}")]
    RLastMismatch {
        /// The burst's ID.
        id: u32,
        /// Zero-based beat index within the burst.
        beat: u16,
        /// Planned beat count for the burst.
        beats: u16,
        /// Whether `beat == beats - 1`, i.e. what `rlast` should have been.
        expected_last: bool,
    },
}

/// Errors raised while constructing an engine from a malformed bus geometry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// `byte_width` (derived from `wdata_width / 8`) was zero or wider than
    /// this crate's 128-byte-lane strobe representation supports.
    #[error("bus byte-width {0} is out of the supported range 1..=128")]
    InvalidByteWidth(u64),

    /// `id_width` was wide enough that `2^id_width` IDs would be impractical
    /// to pool eagerly (this crate eagerly allocates the full free list).
    #[error("id width {0} bits is out of the supported range 0..=24")]
    InvalidIdWidth(u32),
}

/// Errors the burst planner can report for a malformed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    /// `2^size_log2` exceeds the bus byte-width.
    #[error("beat size exceeds bus byte-width")]
    InvalidSize,

    /// The request carried zero bytes/zero length.
    #[error("request has zero length")]
    EmptyRequest,
}
