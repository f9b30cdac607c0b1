//! Data model shared by both engines: requests, burst descriptors, and
//! caller-visible results.

use crate::attributes::Attributes;
use crate::token::Token;

/// AXI4 response code carried on the B and R channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Normal access success.
    Okay,
    /// Exclusive access success.
    ExOkay,
    /// Slave error.
    SlvErr,
    /// Decode error (no slave present at this address).
    DecErr,
}

impl ResponseCode {
    /// Whether this code overwrites the running aggregate response
    /// (anything other than plain `OKAY`, including `EXOKAY`).
    #[must_use]
    pub const fn is_non_okay(self) -> bool {
        !matches!(self, ResponseCode::Okay)
    }

    /// Decodes the 2-bit wire encoding (`00`/`01`/`10`/`11`).
    ///
    /// # Panics
    ///
    /// Panics if `bits` has any set bit above bit 1; callers are expected to
    /// mask the wire field themselves before calling.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0b00 => ResponseCode::Okay,
            0b01 => ResponseCode::ExOkay,
            0b10 => ResponseCode::SlvErr,
            0b11 => ResponseCode::DecErr,
            _ => panic!("response code bits out of range: {bits:#04b}"),
        }
    }
}

/// A caller-submitted write request.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Byte address of the first byte.
    pub address: u64,
    /// Bytes to write, in order. Must be non-empty.
    pub data: Vec<u8>,
    /// Request attributes (burst type, size hint, sideband signals).
    pub attrs: Attributes,
    /// Caller-correlation token.
    pub token: Token,
}

/// A caller-submitted read request.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// Byte address of the first byte.
    pub address: u64,
    /// Number of bytes to read. Must be positive.
    pub length: usize,
    /// Request attributes (burst type, size hint, sideband signals).
    pub attrs: Attributes,
    /// Caller-correlation token.
    pub token: Token,
}

/// One issued burst: an ID, its starting address, beat count, and beat size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstDescriptor {
    /// Transaction ID, drawn from the engine's ID credit pool.
    pub id: u32,
    /// Starting byte address of the burst (4 KiB-boundary-safe).
    pub address: u64,
    /// Number of beats in the burst, `1..=256`.
    pub beats: u16,
    /// `log2` of the beat size in bytes.
    pub size_log2: u8,
}

/// Caller-visible result of a completed write.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// Original request's address.
    pub address: u64,
    /// Original request's data length in bytes.
    pub length: usize,
    /// Aggregate response: the last non-`OKAY` code observed across every
    /// beat of every burst, or `OKAY` if every beat was `OKAY`. See
    /// `DESIGN.md` for why this is "last", not "highest priority".
    pub response: ResponseCode,
    /// Per-beat response codes, one per B beat consumed, in completion order.
    pub per_beat_responses: Vec<ResponseCode>,
    /// `buser` values collected across every beat, in completion order.
    pub users: Vec<u32>,
    /// Caller-correlation token.
    pub token: Token,
}

/// Caller-visible result of a completed read.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Original request's address.
    pub address: u64,
    /// Data bytes read, truncated to the originally requested length.
    pub data: Vec<u8>,
    /// Aggregate response, as [`WriteResult::response`].
    pub response: ResponseCode,
    /// Per-beat response codes, one per R beat consumed, in arrival order.
    pub per_beat_responses: Vec<ResponseCode>,
    /// `ruser` values collected across every beat, in arrival order.
    pub users: Vec<u32>,
    /// Caller-correlation token.
    pub token: Token,
}

/// A request's position in its lifecycle.
///
/// There is deliberately no `Cancelled` state: once submitted, a request
/// runs to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Registered in the token registry, not yet planned.
    Submitted,
    /// The burst planner is acquiring IDs and driving AW/AR.
    Issuing,
    /// All bursts issued; waiting on B/R beats.
    AwaitingResponse,
    /// All beats consumed; result queued for the caller.
    Completed,
    /// The caller has retrieved the result via `take_result`/`await_result`.
    Delivered,
}

/// Trait implemented by the two result types so [`crate::registry::Registry`]
/// can be generic over either.
pub trait WithToken {
    /// The token this result was submitted under.
    fn token(&self) -> Token;
}

impl WithToken for WriteResult {
    fn token(&self) -> Token {
        self.token
    }
}

impl WithToken for ReadResult {
    fn token(&self) -> Token {
        self.token
    }
}

/// What a [`crate::registry::Registry`] ultimately stores for a token: the
/// caller-visible result, or a failure observed while issuing or collecting
/// it — either a channel rejection or the engine itself going down.
///
/// Kept distinct from a plain `Result<R, CallerError>` so a blanket
/// [`EngineStopped`] impl can construct one generically for any `R`.
#[derive(Debug, Clone)]
pub enum Outcome<R> {
    /// The request ran to completion.
    Done(R),
    /// The request did not complete: a channel rejection, or the engine
    /// that owned it stopped running.
    Failed {
        /// The failed request's token.
        token: Token,
        /// Why the request never produced a result.
        error: crate::error::CallerError,
    },
}

impl<R: WithToken> WithToken for Outcome<R> {
    fn token(&self) -> Token {
        match self {
            Outcome::Done(result) => result.token(),
            Outcome::Failed { token, .. } => *token,
        }
    }
}

impl<R> Outcome<R> {
    /// Converts into the caller-facing `Result`.
    pub fn into_result(self) -> Result<R, crate::error::CallerError> {
        match self {
            Outcome::Done(result) => Ok(result),
            Outcome::Failed { error, .. } => Err(error),
        }
    }
}

/// Constructs the value a [`crate::registry::Registry`] stores for a token
/// whose engine stopped running before the request could complete.
pub trait EngineStopped {
    /// Builds the "engine stopped" outcome for `token`.
    fn engine_stopped(token: Token) -> Self;
}

impl<R> EngineStopped for Outcome<R> {
    fn engine_stopped(token: Token) -> Self {
        Outcome::Failed { token, error: crate::error::CallerError::EngineStopped }
    }
}
