//! The five AXI4 handshake channels, as traits the caller implements against
//! their own simulation backend or RTL bridge.
//!
//! Shaped after this crate's sibling CPU core's [`Bus`](crate) trait: a
//! small, synchronous, generic interface the engine drives directly rather
//! than through a trait object, so a caller's channel implementation
//! monomorphizes into the engine with no indirection cost.

use crate::attributes::{AxCache, AxProt, BurstType, Lock};
use crate::model::ResponseCode;

/// One AW or AR handshake: the fields common to both address channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressTransaction {
    /// Transaction ID for this burst.
    pub id: u32,
    /// Starting byte address.
    pub address: u64,
    /// Beat count minus one, as carried on the wire (`AxLEN`).
    pub len: u16,
    /// `log2` of the beat size in bytes (`AxSIZE`).
    pub size_log2: u8,
    /// Burst addressing mode (`AxBURST`).
    pub burst_type: BurstType,
    /// Exclusive-access attribute (`AxLOCK`).
    pub lock: Lock,
    /// Cacheability attributes (`AxCACHE`).
    pub cache: AxCache,
    /// Protection attributes (`AxPROT`).
    pub prot: AxProt,
    /// Quality-of-service hint (`AxQOS`).
    pub qos: u8,
    /// Region identifier (`AxREGION`).
    pub region: u8,
    /// User sideband signal (`AxUSER`).
    pub user: u32,
}

/// One W beat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBeat {
    /// Transaction ID this beat belongs to (AXI3-style `WID`; on a pure
    /// AXI4 bus this is implied by issue order, but carrying it keeps the
    /// channel trait usable against either).
    pub id: u32,
    /// Full bus-width data word; only the strobed lanes are meaningful.
    pub data: Vec<u8>,
    /// Write-strobe mask (`WSTRB`), bit `i` set iff lane `i` is valid.
    pub strobe: u128,
    /// Asserted on the final beat of the burst (`WLAST`).
    pub last: bool,
    /// User sideband signal (`WUSER`).
    pub user: u32,
}

/// One B beat (write response).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBeat {
    /// Transaction ID this response answers (`BID`).
    pub id: u32,
    /// Response code (`BRESP`).
    pub response: ResponseCode,
    /// User sideband signal (`BUSER`).
    pub user: u32,
}

/// One R beat (read data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RBeat {
    /// Transaction ID this beat answers (`RID`).
    pub id: u32,
    /// Full bus-width data word for this beat.
    pub data: Vec<u8>,
    /// Response code (`RRESP`).
    pub response: ResponseCode,
    /// Asserted on the final beat of the burst (`RLAST`).
    pub last: bool,
    /// User sideband signal (`RUSER`).
    pub user: u32,
}

/// The AW or AR address channel: posts one [`AddressTransaction`] per burst.
pub trait AddressChannel {
    /// Drives the address handshake for `txn`, blocking until the
    /// downstream side accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ChannelError`] if the downstream side
    /// rejects the handshake.
    fn post(&self, txn: AddressTransaction) -> Result<(), crate::error::ChannelError>;
}

/// The W write-data channel: posts one [`WriteBeat`] per beat.
pub trait WriteDataChannel {
    /// Drives the write-data handshake for `beat`, blocking until the
    /// downstream side accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ChannelError`] if the downstream side
    /// rejects the handshake.
    fn post(&self, beat: WriteBeat) -> Result<(), crate::error::ChannelError>;
}

/// The B or R response channel: receives one beat at a time.
///
/// Generic over its beat type so one trait serves both B ([`BBeat`]) and R
/// ([`RBeat`]).
pub trait ResponseChannel {
    /// The beat type this channel yields (`BBeat` or `RBeat`).
    type Beat;

    /// Blocks until the next beat is available and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ChannelError`] if the channel closes or the
    /// downstream side reports a handshake failure.
    fn recv(&self) -> Result<Self::Beat, crate::error::ChannelError>;
}

/// Bundles a write engine's three channels.
pub struct WriteChannels<AW, W, B> {
    /// AW address channel.
    pub aw: AW,
    /// W write-data channel.
    pub w: W,
    /// B response channel.
    pub b: B,
}

/// Bundles a read engine's two channels.
pub struct ReadChannels<AR, R> {
    /// AR address channel.
    pub ar: AR,
    /// R response channel.
    pub r: R,
}

/// Fixed geometry of the bus an engine drives: data width and ID width.
///
/// Validated once at engine construction time rather than per-request,
/// since it never changes for the lifetime of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusGeometry {
    byte_width: u64,
    id_width: u32,
}

impl BusGeometry {
    /// The widest single beat this crate's strobe representation (`u128`
    /// lanes) can express.
    pub const MAX_BYTE_WIDTH: u64 = 128;

    /// The widest `id_width` this crate will eagerly pool IDs for.
    pub const MAX_ID_WIDTH: u32 = 24;

    /// Builds a validated bus geometry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EngineError::InvalidByteWidth`] if
    /// `byte_width` is zero, not a power of two, or exceeds
    /// [`Self::MAX_BYTE_WIDTH`], or [`crate::error::EngineError::InvalidIdWidth`]
    /// if `id_width` exceeds [`Self::MAX_ID_WIDTH`].
    pub fn new(byte_width: u64, id_width: u32) -> Result<Self, crate::error::EngineError> {
        if byte_width == 0 || byte_width > Self::MAX_BYTE_WIDTH || !byte_width.is_power_of_two() {
            return Err(crate::error::EngineError::InvalidByteWidth(byte_width));
        }
        if id_width > Self::MAX_ID_WIDTH {
            return Err(crate::error::EngineError::InvalidIdWidth(id_width));
        }
        Ok(Self { byte_width, id_width })
    }

    /// Data bus width in bytes.
    #[must_use]
    pub const fn byte_width(&self) -> u64 {
        self.byte_width
    }

    /// `AxID` field width in bits.
    #[must_use]
    pub const fn id_width(&self) -> u32 {
        self.id_width
    }

    /// Number of distinct IDs this geometry's ID width can express.
    #[must_use]
    pub const fn id_pool_size(&self) -> usize {
        1usize << self.id_width
    }
}
