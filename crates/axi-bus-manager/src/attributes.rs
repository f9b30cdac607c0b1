//! AXI4 sideband signal attributes: burst type, lock, cache, protection.
//!
//! `AxCACHE` and `AxPROT` are genuinely bit-packed fields on the wire, so
//! they are modeled as [`bitflags`] registers in the style of this crate's
//! sibling CPU status register, rather than as opaque integers.

use bitflags::bitflags;

bitflags! {
    /// `AxCACHE` memory attribute signal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AxCache: u8 {
        /// Bufferable.
        const BUFFERABLE = 1 << 0;
        /// Modifiable.
        const MODIFIABLE = 1 << 1;
        /// Other allocate.
        const OTHER_ALLOCATE = 1 << 2;
        /// Allocate.
        const ALLOCATE = 1 << 3;
    }
}

impl Default for AxCache {
    /// Default `cache(0b0011)`: bufferable + modifiable.
    fn default() -> Self {
        Self::BUFFERABLE | Self::MODIFIABLE
    }
}

bitflags! {
    /// `AxPROT` protection type signal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AxProt: u8 {
        /// Privileged access.
        const PRIVILEGED = 1 << 0;
        /// Non-secure access.
        const NONSECURE = 1 << 1;
        /// Instruction access (as opposed to data).
        const INSTRUCTION = 1 << 2;
    }
}

impl Default for AxProt {
    /// Default `prot(NONSECURE)`.
    fn default() -> Self {
        Self::NONSECURE
    }
}

/// AXI4 burst addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BurstType {
    /// Address stays fixed across all beats (FIFO-style peripheral access).
    Fixed,
    /// Address increments by the beat size on each beat.
    #[default]
    Incr,
    /// Address increments and wraps at a burst-length-aligned boundary.
    Wrap,
}

/// `AxLOCK` exclusive-access attribute.
///
/// The core passes this through to the channel abstraction unexamined; it
/// does not implement exclusive-access semantics itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lock {
    /// Normal access.
    #[default]
    Normal,
    /// Exclusive access.
    Exclusive,
}

/// Caller-supplied request attributes, passed through to the address channel
/// unexamined except for `size_log2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    /// Burst addressing mode. Default `INCR`.
    pub burst_type: BurstType,
    /// `log2` of the beat size in bytes. `None` defaults to the full bus
    /// width at submission time.
    pub size_log2: Option<u8>,
    /// Exclusive-access attribute, passed through unexamined. Default `NORMAL`.
    pub lock: Lock,
    /// Cacheability attributes. Default `0b0011`.
    pub cache: AxCache,
    /// Protection attributes. Default `NONSECURE`.
    pub prot: AxProt,
    /// Quality-of-service hint, passed through unexamined (no QoS
    /// arbitration is implemented). Default 0.
    pub qos: u8,
    /// Region identifier, passed through unexamined. Default 0.
    pub region: u8,
    /// User sideband signal on the address channel, passed through
    /// unexamined. Default 0.
    pub user: u32,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            burst_type: BurstType::default(),
            size_log2: None,
            lock: Lock::default(),
            cache: AxCache::default(),
            prot: AxProt::default(),
            qos: 0,
            region: 0,
            user: 0,
        }
    }
}
