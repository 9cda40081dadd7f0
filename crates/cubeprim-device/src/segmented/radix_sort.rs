use super::{DeviceOffsets, OffsetsLayout, SegmentOffsets};
use crate::{
    PrimError, RadixSortConfig, TempStorageLayout, TilePartition,
    launch::{Stages, launch_tiles},
    temp_storage::negotiate,
};
use core::ops::Range;
use cubeprim_block::{
    BlockLayout, BlockRadixRank, BlockScan, BlockScanAlgorithm, SharedLayout, SharedMemory,
    SharedRegion,
};
use cubeprim_common::{Element, Plus, RadixKey};
use cubeprim_runtime::{CubeContext, CubeDim, CubeKernel, DeviceSlice, Handle, Stream};

/// Stable ascending sort of every segment of `keys_input` into `keys_output`, on the bits
/// `begin_bit..end_bit` of the keys.
///
/// Input and output must not overlap. Items outside the segments are left untouched.
#[allow(clippy::too_many_arguments)]
pub fn segmented_radix_sort_keys<K: RadixKey>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: &DeviceSlice<K>,
    keys_output: &DeviceSlice<K>,
    size: usize,
    offsets: &SegmentOffsets,
    begin_bit: u32,
    end_bit: u32,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError> {
    segmented_radix_sort::<K, u8>(
        temporary_storage,
        storage_size,
        SortIo::new(keys_input, keys_output, None),
        size,
        offsets,
        RadixPass::new(begin_bit, end_bit, false),
        &RadixSortConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// Stable descending sort of every segment of `keys_input` into `keys_output`.
#[allow(clippy::too_many_arguments)]
pub fn segmented_radix_sort_keys_descending<K: RadixKey>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: &DeviceSlice<K>,
    keys_output: &DeviceSlice<K>,
    size: usize,
    offsets: &SegmentOffsets,
    begin_bit: u32,
    end_bit: u32,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError> {
    segmented_radix_sort::<K, u8>(
        temporary_storage,
        storage_size,
        SortIo::new(keys_input, keys_output, None),
        size,
        offsets,
        RadixPass::new(begin_bit, end_bit, true),
        &RadixSortConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// Stable ascending sort of every segment of the keys, carrying the values along.
#[allow(clippy::too_many_arguments)]
pub fn segmented_radix_sort_pairs<K: RadixKey, V: Element>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: &DeviceSlice<K>,
    keys_output: &DeviceSlice<K>,
    values_input: &DeviceSlice<V>,
    values_output: &DeviceSlice<V>,
    size: usize,
    offsets: &SegmentOffsets,
    begin_bit: u32,
    end_bit: u32,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError> {
    segmented_radix_sort(
        temporary_storage,
        storage_size,
        SortIo::new(keys_input, keys_output, Some((values_input, values_output))),
        size,
        offsets,
        RadixPass::new(begin_bit, end_bit, false),
        &RadixSortConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// Stable descending sort of every segment of the keys, carrying the values along.
#[allow(clippy::too_many_arguments)]
pub fn segmented_radix_sort_pairs_descending<K: RadixKey, V: Element>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: &DeviceSlice<K>,
    keys_output: &DeviceSlice<K>,
    values_input: &DeviceSlice<V>,
    values_output: &DeviceSlice<V>,
    size: usize,
    offsets: &SegmentOffsets,
    begin_bit: u32,
    end_bit: u32,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError> {
    segmented_radix_sort(
        temporary_storage,
        storage_size,
        SortIo::new(keys_input, keys_output, Some((values_input, values_output))),
        size,
        offsets,
        RadixPass::new(begin_bit, end_bit, true),
        &RadixSortConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// [segmented_radix_sort_pairs] or [segmented_radix_sort_pairs_descending] with an explicit
/// configuration.
#[allow(clippy::too_many_arguments)]
pub fn segmented_radix_sort_pairs_with_config<K: RadixKey, V: Element>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: &DeviceSlice<K>,
    keys_output: &DeviceSlice<K>,
    values_input: &DeviceSlice<V>,
    values_output: &DeviceSlice<V>,
    size: usize,
    offsets: &SegmentOffsets,
    begin_bit: u32,
    end_bit: u32,
    descending: bool,
    config: &RadixSortConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError> {
    segmented_radix_sort(
        temporary_storage,
        storage_size,
        SortIo::new(keys_input, keys_output, Some((values_input, values_output))),
        size,
        offsets,
        RadixPass::new(begin_bit, end_bit, descending),
        config,
        stream,
        debug_synchronous,
    )
}

/// Keys and optional values read and written by a sort.
#[derive(Clone, Debug)]
struct SortIo<K, V> {
    keys_input: DeviceSlice<K>,
    keys_output: DeviceSlice<K>,
    values: Option<(DeviceSlice<V>, DeviceSlice<V>)>,
}

impl<K: Element, V: Element> SortIo<K, V> {
    fn new(
        keys_input: &DeviceSlice<K>,
        keys_output: &DeviceSlice<K>,
        values: Option<(&DeviceSlice<V>, &DeviceSlice<V>)>,
    ) -> Self {
        Self {
            keys_input: keys_input.clone(),
            keys_output: keys_output.clone(),
            values: values.map(|(input, output)| (input.clone(), output.clone())),
        }
    }

    fn validate(&self, size: usize) -> Result<(), PrimError> {
        check_len("keys input", self.keys_input.len(), size)?;
        check_len("keys output", self.keys_output.len(), size)?;
        if overlaps(&self.keys_input, &self.keys_output) {
            return Err(PrimError::invalid("Radix sort keys can't be sorted in place"));
        }

        if let Some((input, output)) = &self.values {
            check_len("values input", input.len(), size)?;
            check_len("values output", output.len(), size)?;
            if overlaps(input, output) {
                return Err(PrimError::invalid(
                    "Radix sort values can't be sorted in place",
                ));
            }
        }
        Ok(())
    }
}

fn check_len(name: &str, len: usize, size: usize) -> Result<(), PrimError> {
    if len < size {
        return Err(PrimError::invalid(format!(
            "Radix sort {name} holds {len} items, {size} are required"
        )));
    }
    Ok(())
}

fn overlaps<T: Element>(lhs: &DeviceSlice<T>, rhs: &DeviceSlice<T>) -> bool {
    let (lhs, rhs) = (lhs.handle(), rhs.handle());
    let lhs_range = lhs.offset()..lhs.offset() + lhs.size();
    let rhs_range = rhs.offset()..rhs.offset() + rhs.size();

    lhs.same_allocation(&rhs)
        && lhs_range.start < rhs_range.end
        && rhs_range.start < lhs_range.end
}

/// The bits a sort looks at, and in which order.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq)]
struct RadixPass {
    begin_bit: u32,
    end_bit: u32,
    descending: bool,
}

impl RadixPass {
    fn validate<K: RadixKey>(&self) -> Result<(), PrimError> {
        if self.begin_bit > self.end_bit || self.end_bit > K::BITS {
            return Err(PrimError::invalid(format!(
                "Invalid bit range {}..{} for keys of {} bits",
                self.begin_bit,
                self.end_bit,
                K::BITS
            )));
        }
        Ok(())
    }

    fn num_passes(&self, radix_bits: u32) -> u32 {
        (self.end_bit - self.begin_bit).div_ceil(radix_bits)
    }

    /// Digit of `key` made of `bits` bits starting at `bit`.
    fn digit<K: RadixKey>(&self, key: K, bit: u32, bits: u32) -> u32 {
        let mut radix = key.to_radix();
        if self.descending {
            radix = !radix & radix_mask(K::BITS);
        }
        ((radix >> bit) & radix_mask(bits)) as u32
    }
}

fn radix_mask(bits: u32) -> u64 {
    match bits {
        64.. => u64::MAX,
        bits => (1 << bits) - 1,
    }
}

#[allow(clippy::too_many_arguments)]
fn segmented_radix_sort<K: RadixKey, V: Element>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    io: SortIo<K, V>,
    size: usize,
    offsets: &SegmentOffsets,
    pass: RadixPass,
    config: &RadixSortConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError> {
    config.validate()?;
    pass.validate::<K>()?;
    offsets.check_size(size)?;
    io.validate(size)?;

    let mut layout = TempStorageLayout::new();
    let offsets_layout = OffsetsLayout::push(&mut layout, offsets);
    let keys_aux = layout.push::<K>(size);
    let values_aux = layout.push::<V>(match io.values {
        Some(_) => size,
        None => 0,
    });

    let Some(storage) = negotiate(temporary_storage, storage_size, &layout)? else {
        return Ok(());
    };
    if offsets.is_empty() {
        return Ok(());
    }

    let properties = stream.properties();
    let mut stages = Stages::new("segmented_radix_sort", stream, debug_synchronous);
    let device_offsets = offsets_layout.upload(storage, offsets, stream)?;
    stages.finish("upload_offsets")?;

    let values_aux = match io.values {
        Some(_) => Some(values_aux.bind(storage)?),
        None => None,
    };
    let kernel = SegmentedRadixSortKernel::new(
        io,
        keys_aux.bind(storage)?,
        values_aux,
        device_offsets,
        pass,
        config,
        properties.plane_dim,
    );
    launch_tiles(
        stream,
        &kernel,
        &TilePartition::from_tiles(offsets.len() as u64, properties),
    )?;
    stages.finish("sort_segments")
}

/// Every cube sorts one segment, with one histogram, scan and scatter per digit.
///
/// Passes alternate between the output and the auxiliary buffers, starting with the one that
/// makes the last pass write the output.
#[derive(Clone)]
struct SegmentedRadixSortKernel<K, V> {
    io: SortIo<K, V>,
    keys_aux: DeviceSlice<K>,
    values_aux: Option<DeviceSlice<V>>,
    offsets: DeviceOffsets,
    pass: RadixPass,
    radix_bits: u32,
    layout: BlockLayout,
    digit_scan: BlockScan,
    counts: SharedRegion<u32>,
    scratch: SharedRegion<u32>,
    shared_size: usize,
}

impl<K: RadixKey, V: Element> SegmentedRadixSortKernel<K, V> {
    fn new(
        io: SortIo<K, V>,
        keys_aux: DeviceSlice<K>,
        values_aux: Option<DeviceSlice<V>>,
        offsets: DeviceOffsets,
        pass: RadixPass,
        config: &RadixSortConfig,
        plane_dim: u32,
    ) -> Self {
        let digit_scan = BlockScan::new(
            config.digit_layout(plane_dim),
            BlockScanAlgorithm::WarpScan,
        );
        let mut shared = SharedLayout::new();
        let counts = shared.push(config.radix_size());
        let scratch = shared.push(digit_scan.scratch_len());

        Self {
            io,
            keys_aux,
            values_aux,
            offsets,
            pass,
            radix_bits: config.radix_bits,
            layout: config.layout(plane_dim),
            digit_scan,
            counts,
            scratch,
            shared_size: shared.size(),
        }
    }

    /// Buffers written by pass `index` of `num_passes`.
    fn destination(&self, index: u32, num_passes: u32) -> (&DeviceSlice<K>, Option<&DeviceSlice<V>>) {
        if (num_passes - 1 - index) % 2 == 0 {
            (
                &self.io.keys_output,
                self.io.values.as_ref().map(|(_, output)| output),
            )
        } else {
            (&self.keys_aux, self.values_aux.as_ref())
        }
    }

    /// Digits of the keys of `range`.
    fn digits(&self, keys: &DeviceSlice<K>, range: Range<usize>, bit: u32, bits: u32) -> Vec<u32> {
        range
            // SAFETY: the segment is only accessed by this cube.
            .map(|index| self.pass.digit(unsafe { keys.read(index) }, bit, bits))
            .collect()
    }

    fn copy_segment(&self, items: Range<usize>) {
        for index in items {
            // SAFETY: the segment is only accessed by this cube, input and output don't overlap.
            unsafe {
                self.io.keys_output.write(index, self.io.keys_input.read(index));
                if let Some((input, output)) = &self.io.values {
                    output.write(index, input.read(index));
                }
            }
        }
    }
}

impl<K: RadixKey, V: Element> CubeKernel for SegmentedRadixSortKernel<K, V> {
    fn name(&self) -> &'static str {
        "segmented_radix_sort"
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.layout.units)
    }

    fn shared_memory_size(&self) -> usize {
        self.shared_size
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let segment = cube.cube_index() as usize;
        if segment >= self.offsets.len() {
            return;
        }

        let items = self.offsets.segment(segment);
        if items.is_empty() {
            return;
        }

        let num_passes = self.pass.num_passes(self.radix_bits);
        if num_passes == 0 {
            self.copy_segment(items);
            return;
        }

        let tile_size = self.layout.tile_size();
        let rank = BlockRadixRank::new(self.layout, self.radix_bits);
        let mut memory = SharedMemory::new(cube.shared_memory());
        let counts = memory.take(self.counts);
        let scratch = memory.take(self.scratch);
        let mut ranks = vec![0u32; tile_size];
        let mut tile_counts = vec![0u32; rank.radix_size()];

        for index in 0..num_passes {
            let bit = self.pass.begin_bit + index * self.radix_bits;
            let bits = self.radix_bits.min(self.pass.end_bit - bit);
            let (source_keys, source_values) = match index {
                0 => (
                    &self.io.keys_input,
                    self.io.values.as_ref().map(|(input, _)| input),
                ),
                _ => self.destination(index - 1, num_passes),
            };
            let (keys, values) = self.destination(index, num_passes);

            counts.fill(0);
            for start in items.clone().step_by(tile_size) {
                let range = start..(start + tile_size).min(items.end);
                let digits = self.digits(source_keys, range.clone(), bit, bits);
                rank.rank(&digits, range.len(), &mut ranks, &mut tile_counts);
                for (count, tile_count) in counts.iter_mut().zip(&tile_counts) {
                    *count += tile_count;
                }
            }

            self.digit_scan.exclusive_scan(counts, 0, scratch, &Plus);

            for start in items.clone().step_by(tile_size) {
                let range = start..(start + tile_size).min(items.end);
                let digits = self.digits(source_keys, range.clone(), bit, bits);
                rank.rank(&digits, range.len(), &mut ranks, &mut tile_counts);

                for (offset, from) in range.enumerate() {
                    let digit = digits[offset] as usize;
                    let to = items.start + (counts[digit] + ranks[offset]) as usize;
                    // SAFETY: the segment is only accessed by this cube, and source and
                    // destination are different buffers.
                    unsafe {
                        keys.write(to, source_keys.read(from));
                        if let (Some(source), Some(destination)) = (source_values, values) {
                            destination.write(to, source.read(from));
                        }
                    }
                }
                for (count, tile_count) in counts.iter_mut().zip(&tile_counts) {
                    *count += tile_count;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_follow_key_order() {
        let ascending = RadixPass::new(0, 32, false);
        let descending = RadixPass::new(0, 32, true);

        assert_eq!(ascending.digit(0x1234_5678u32, 8, 8), 0x56);
        assert_eq!(ascending.digit(0x1234_5678u32, 28, 4), 0x1);
        assert_eq!(descending.digit(0x1234_5678u32, 8, 8), 0xA9);
        assert!(ascending.digit(-1i32, 24, 8) < ascending.digit(1i32, 24, 8));
    }

    #[test]
    fn bit_ranges_are_validated() {
        assert!(RadixPass::new(0, 32, false).validate::<u32>().is_ok());
        assert!(RadixPass::new(4, 4, false).validate::<u32>().is_ok());
        assert!(RadixPass::new(0, 33, false).validate::<u32>().is_err());
        assert!(RadixPass::new(8, 4, false).validate::<u64>().is_err());
        assert_eq!(RadixPass::new(0, 17, false).num_passes(8), 3);
    }

    #[test]
    fn masks_cover_full_words() {
        assert_eq!(radix_mask(8), 0xFF);
        assert_eq!(radix_mask(64), u64::MAX);
    }
}
