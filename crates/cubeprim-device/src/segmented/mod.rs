mod radix_sort;
mod reduce;
mod scan;

pub use radix_sort::*;
pub use reduce::*;
pub use scan::*;

use crate::{PrimError, TempRegion, TempStorageLayout};
use core::ops::Range;
use cubeprim_runtime::{DeviceSlice, Handle, Stream};

/// Bounds of the segments of a sequence.
///
/// Segments are ordered and don't overlap: `begin(0) <= end(0) <= begin(1) <= end(1) ...`. Items
/// between segments belong to none of them, and primitives leave their outputs untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentOffsets {
    begins: Vec<u64>,
    ends: Vec<u64>,
}

impl SegmentOffsets {
    /// Contiguous segments from `S + 1` offsets, segment `s` spanning `offsets[s]..offsets[s + 1]`.
    pub fn new(offsets: &[u64]) -> Result<Self, PrimError> {
        if offsets.is_empty() {
            return Err(PrimError::invalid(
                "Segment offsets need at least one offset",
            ));
        }

        Self::from_bounds(&offsets[..offsets.len() - 1], &offsets[1..])
    }

    /// Segments from their begin and end offsets.
    pub fn from_bounds(begins: &[u64], ends: &[u64]) -> Result<Self, PrimError> {
        if begins.len() != ends.len() {
            return Err(PrimError::invalid(format!(
                "Got {} segment begins but {} segment ends",
                begins.len(),
                ends.len()
            )));
        }

        let mut previous_end = 0;
        for (segment, (&begin, &end)) in begins.iter().zip(ends).enumerate() {
            if begin < previous_end || end < begin {
                return Err(PrimError::invalid(format!(
                    "Segment {segment} spans {begin}..{end}, segments must be ordered and can't overlap"
                )));
            }
            previous_end = end;
        }

        Ok(Self {
            begins: begins.to_vec(),
            ends: ends.to_vec(),
        })
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.begins.len()
    }

    /// Whether there is no segment.
    pub fn is_empty(&self) -> bool {
        self.begins.is_empty()
    }

    /// Items of segment `segment`.
    pub fn segment(&self, segment: usize) -> Range<usize> {
        self.begins[segment] as usize..self.ends[segment] as usize
    }

    /// Iterates over the items of every segment.
    pub fn iter(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.len()).map(|segment| self.segment(segment))
    }

    /// End of the last segment.
    pub fn end(&self) -> u64 {
        self.ends.last().copied().unwrap_or(0)
    }

    pub(crate) fn check_size(&self, size: usize) -> Result<(), PrimError> {
        if self.end() > size as u64 {
            return Err(PrimError::invalid(format!(
                "Segments end at {}, past the {size} items",
                self.end()
            )));
        }
        Ok(())
    }
}

/// Device copy of the segment bounds, begins followed by ends.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OffsetsLayout {
    region: TempRegion<u64>,
}

impl OffsetsLayout {
    pub(crate) fn push(layout: &mut TempStorageLayout, offsets: &SegmentOffsets) -> Self {
        Self {
            region: layout.push(2 * offsets.len()),
        }
    }

    /// Upload the bounds to temporary storage.
    pub(crate) fn upload(
        &self,
        storage: &Handle,
        offsets: &SegmentOffsets,
        stream: &Stream,
    ) -> Result<DeviceOffsets, PrimError> {
        let bounds = self.region.bind(storage)?;
        let data: Vec<u64> = offsets.begins.iter().chain(&offsets.ends).copied().collect();
        stream.write_slice(&bounds, &data)?;

        Ok(DeviceOffsets {
            bounds,
            num_segments: offsets.len(),
        })
    }
}

/// Segment bounds readable by kernels.
#[derive(Clone, Debug)]
pub(crate) struct DeviceOffsets {
    bounds: DeviceSlice<u64>,
    num_segments: usize,
}

impl DeviceOffsets {
    pub(crate) fn len(&self) -> usize {
        self.num_segments
    }

    pub(crate) fn segment(&self, segment: usize) -> Range<usize> {
        // SAFETY: bounds are only written by the upload preceding the kernels.
        unsafe {
            self.bounds.read(segment) as usize
                ..self.bounds.read(self.num_segments + segment) as usize
        }
    }
}
