//! Burst planner: splits a byte-range request into protocol-legal bursts,
//! and shapes per-beat write data/strobes and read reassembly offsets.
//!
//! Both engines call the same [`plan`] function: earlier write and read
//! planners diverged by one beat from each other, and sharing a single
//! planner here removes that divergence by construction rather than by
//! replicating the bug twice.
//!
//! # A preserved ambiguity
//!
//! `cycle_offset` starts at `aligned_addr - word_addr` and is never
//! re-derived from `word_addr` mid-walk, even when `num_bytes < W` and
//! `address` isn't word-aligned. This mirrors a real narrow-transfer
//! controller's behavior rather than "correcting" it against an idealized
//! model of AXI4 narrow-transfer lane rotation.

use crate::error::PlannerError;
use crate::model::BurstDescriptor;

/// Maximum beats in a single AXI4 burst.
pub const MAX_BURST_LEN: u16 = 256;

/// 4 KiB address-boundary granularity AXI4 forbids a burst from crossing.
pub const BOUNDARY: u64 = 0x1000;

/// One contiguous run of beats that will become a single AW/AR burst, before
/// an ID has been assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstSegment {
    /// Starting byte address of the segment.
    pub address: u64,
    /// Beat count, `1..=256`.
    pub beats: u16,
}

/// The full output of planning one request's byte range into bursts.
#[derive(Debug, Clone)]
pub struct PlannedBursts {
    /// Total beats across every segment.
    pub total_beats: u64,
    /// `floor(address / num_bytes) * num_bytes`.
    pub aligned_addr: u64,
    /// `floor(address / bus_width) * bus_width`.
    pub word_addr: u64,
    /// `address mod bus_width`.
    pub start_byte_offset: u64,
    /// `((address + length - 1) mod bus_width) + 1`.
    pub end_byte_offset: u64,
    /// Beat size used for this plan, in bytes.
    pub num_bytes: u64,
    /// Segments in address order; each becomes one issued burst.
    pub segments: Vec<BurstSegment>,
}

/// Splits `[address, address + length)` into 4 KiB-safe, ≤256-beat segments
/// at beat granularity `2^size_log2`, against a bus of `bus_width` bytes.
///
/// # Errors
///
/// Returns [`PlannerError::InvalidSize`] if `2^size_log2 > bus_width`, or
/// [`PlannerError::EmptyRequest`] if `length == 0`.
pub fn plan(
    address: u64,
    length: u64,
    size_log2: u8,
    bus_width: u64,
) -> Result<PlannedBursts, PlannerError> {
    if length == 0 {
        return Err(PlannerError::EmptyRequest);
    }
    let num_bytes = 1u64 << size_log2;
    if num_bytes > bus_width {
        return Err(PlannerError::InvalidSize);
    }

    let aligned_addr = (address / num_bytes) * num_bytes;
    let word_addr = (address / bus_width) * bus_width;
    let start_byte_offset = address % bus_width;
    let end_byte_offset = ((address + length - 1) % bus_width) + 1;
    let total_beats = (length + (address % num_bytes) + num_bytes - 1) / num_bytes;

    let mut segments = Vec::new();
    let mut cur_addr = aligned_addr;
    let mut beats_remaining = total_beats;
    while beats_remaining > 0 {
        let capped = beats_remaining.min(u64::from(MAX_BURST_LEN));
        let bytes_to_boundary = BOUNDARY - (cur_addr % BOUNDARY);
        let beats = ((capped * num_bytes).min(bytes_to_boundary) + num_bytes - 1) / num_bytes;
        debug_assert!((1..=u64::from(MAX_BURST_LEN)).contains(&beats));
        debug_assert!(cur_addr % BOUNDARY + beats * num_bytes <= BOUNDARY);

        segments.push(BurstSegment {
            address: cur_addr,
            #[allow(clippy::cast_possible_truncation)]
            beats: beats as u16,
        });
        cur_addr += beats * num_bytes;
        beats_remaining -= beats;
    }

    Ok(PlannedBursts {
        total_beats,
        aligned_addr,
        word_addr,
        start_byte_offset,
        end_byte_offset,
        num_bytes,
        segments,
    })
}

/// Assigns IDs to a plan's segments, turning them into full
/// [`BurstDescriptor`]s. `acquire` is called once per segment, in order; it
/// is expected to be [`crate::id_pool::IdPool::acquire`], which suspends
/// when the pool is empty.
pub fn assign_ids(
    planned: &PlannedBursts,
    size_log2: u8,
    mut acquire: impl FnMut() -> u32,
) -> Vec<BurstDescriptor> {
    planned
        .segments
        .iter()
        .map(|seg| BurstDescriptor {
            id: acquire(),
            address: seg.address,
            beats: seg.beats,
            size_log2,
        })
        .collect()
}

/// Walks the per-beat byte-lane range `[start, stop)` a request's beats
/// occupy on the data bus, in beat order.
///
/// Shared by the write-side beat shaper ([`shape_write_beats`]) and the
/// read-side reassembler (`engine::read`), since both walk the identical
/// `cycle_offset` sequence derived in [`plan`].
pub struct LaneWalker {
    cycle_offset: u64,
    k: u64,
    total_beats: u64,
    bus_width: u64,
    num_bytes: u64,
    start_byte_offset: u64,
    end_byte_offset: u64,
}

impl LaneWalker {
    /// Builds a walker over `planned`'s beat sequence.
    #[must_use]
    pub fn new(planned: &PlannedBursts, bus_width: u64) -> Self {
        Self {
            cycle_offset: planned.aligned_addr - planned.word_addr,
            k: 0,
            total_beats: planned.total_beats,
            bus_width,
            num_bytes: planned.num_bytes,
            start_byte_offset: planned.start_byte_offset,
            end_byte_offset: planned.end_byte_offset,
        }
    }

    /// Returns the `[start, stop)` byte-lane range for the next beat, or
    /// `None` once every beat has been walked.
    pub fn next_range(&mut self) -> Option<(u64, u64)> {
        if self.k >= self.total_beats {
            return None;
        }
        let start = if self.k == 0 {
            self.start_byte_offset
        } else {
            self.cycle_offset
        };
        let stop = if self.k == self.total_beats - 1 {
            self.end_byte_offset
        } else {
            self.cycle_offset + self.num_bytes
        };
        self.cycle_offset = (self.cycle_offset + self.num_bytes) % self.bus_width;
        self.k += 1;
        Some((start, stop))
    }
}

/// Precomputed per-beat output-byte-lane ranges and output-buffer offsets for
/// reassembling a read request's data, indexed by a beat's position in the
/// overall plan rather than by arrival order.
///
/// A response task consuming R beats burst-by-burst "in order" can use a
/// per-ID FIFO only to buffer beats that arrive for a different burst than
/// the one currently awaited. That tolerates bursts of
/// *the same request* completing out of issue order (the issue task posts AR
/// for every segment before any R beat is collected, so two outstanding
/// bursts' R beats may interleave in arrival time). Rather than replaying
/// that buffering dance, this layout is computed once up front so a response
/// beat can be placed correctly no matter when it arrives: each burst knows
/// the global beat index its first beat starts at, and from that, the
/// precomputed `[start, stop)` lane range and output offset for every beat it
/// will contribute.
#[derive(Debug, Clone)]
pub struct ReadLayout {
    /// `[start, stop)` byte-lane range for each beat, in plan order.
    pub beat_ranges: Vec<(u64, u64)>,
    /// Offset into the (pre-truncation) output buffer each beat's bytes land at.
    pub beat_out_offsets: Vec<usize>,
    /// Global beat index the first beat of each segment starts at, parallel
    /// to `planned.segments`.
    pub segment_beat_offsets: Vec<u64>,
    /// Total bytes the output buffer needs before truncation to `length`.
    pub total_output_bytes: usize,
}

/// Derives a [`ReadLayout`] from `planned`, walking the same `cycle_offset`
/// sequence [`LaneWalker`] does.
#[must_use]
pub fn read_layout(planned: &PlannedBursts, bus_width: u64) -> ReadLayout {
    let mut walker = LaneWalker::new(planned, bus_width);
    let mut beat_ranges = Vec::with_capacity(planned.total_beats as usize);
    let mut beat_out_offsets = Vec::with_capacity(planned.total_beats as usize);
    let mut offset = 0usize;
    while let Some((start, stop)) = walker.next_range() {
        beat_out_offsets.push(offset);
        offset += (stop - start) as usize;
        beat_ranges.push((start, stop));
    }

    let mut segment_beat_offsets = Vec::with_capacity(planned.segments.len());
    let mut cursor = 0u64;
    for segment in &planned.segments {
        segment_beat_offsets.push(cursor);
        cursor += u64::from(segment.beats);
    }

    ReadLayout {
        beat_ranges,
        beat_out_offsets,
        segment_beat_offsets,
        total_output_bytes: offset,
    }
}

/// A shaped write beat: a full bus-width data word with other lanes zeroed,
/// a write-strobe mask, and the `wlast` flag for its burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBeat {
    /// `bus_width`-byte data word; only lanes `[start, stop)` are populated.
    pub data: Vec<u8>,
    /// Bitmask with bit `i` set iff byte-lane `i` carries a caller byte.
    pub strobe: u128,
    /// Asserted on the final beat of its burst.
    pub last: bool,
}

/// Shapes `data` into one [`WriteBeat`] per beat of `planned`, consuming
/// `data` in order and zeroing unused lanes.
///
/// # Panics
///
/// Panics if `data.len()` doesn't match the byte count `planned` was built
/// from — this would indicate a caller bug (mismatched plan/data pair), not
/// a recoverable protocol condition.
#[must_use]
pub fn shape_write_beats(data: &[u8], planned: &PlannedBursts, bus_width: u64) -> Vec<WriteBeat> {
    let mut walker = LaneWalker::new(planned, bus_width);
    let mut offset = 0usize;
    let mut beats = Vec::with_capacity(planned.total_beats as usize);

    for segment in &planned.segments {
        for beat_in_segment in 0..segment.beats {
            let (start, stop) = walker
                .next_range()
                .expect("planner beat count must match segment totals");
            #[allow(clippy::cast_possible_truncation)]
            let mut word = vec![0u8; bus_width as usize];
            for lane in start..stop {
                word[lane as usize] = data[offset];
                offset += 1;
            }
            let strobe = lane_mask(start, stop);
            beats.push(WriteBeat {
                data: word,
                strobe,
                last: beat_in_segment + 1 == segment.beats,
            });
        }
    }

    assert_eq!(offset, data.len(), "data length must match the planned beats");
    beats
}

/// Bitmask with bits `[start, stop)` set.
#[must_use]
pub fn lane_mask(start: u64, stop: u64) -> u128 {
    if start >= stop {
        return 0;
    }
    let width = stop - start;
    if width >= 128 {
        return u128::MAX << start;
    }
    ((1u128 << width) - 1) << start
}
