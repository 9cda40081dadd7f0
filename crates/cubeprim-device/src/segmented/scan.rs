use super::SegmentOffsets;
use crate::{
    InputIterator, PrimError, ScanConfig, TempStorageLayout,
    launch::Stages,
    lookback::LookbackLayout,
    scan::{ScanKernel, ScanTiles},
    temp_storage::negotiate,
};
use cubeprim_block::BlockScan;
use cubeprim_common::{BinaryOp, Element};
use cubeprim_runtime::{DeviceSlice, Handle, Stream};

/// Inclusive scan of every segment of `input` independently.
///
/// Items outside the segments are left untouched in `output`.
#[allow(clippy::too_many_arguments)]
pub fn segmented_inclusive_scan<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    size: usize,
    offsets: &SegmentOffsets,
    op: Op,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    segmented_inclusive_scan_with_config(
        temporary_storage,
        storage_size,
        input,
        output,
        size,
        offsets,
        op,
        &ScanConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// Exclusive scan of every segment of `input` independently, each one seeded with `init`.
#[allow(clippy::too_many_arguments)]
pub fn segmented_exclusive_scan<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    init: T,
    size: usize,
    offsets: &SegmentOffsets,
    op: Op,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    segmented_exclusive_scan_with_config(
        temporary_storage,
        storage_size,
        input,
        output,
        init,
        size,
        offsets,
        op,
        &ScanConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// [segmented_inclusive_scan] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn segmented_inclusive_scan_with_config<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    size: usize,
    offsets: &SegmentOffsets,
    op: Op,
    config: &ScanConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    segmented_scan(
        temporary_storage,
        storage_size,
        input,
        output,
        None,
        size,
        offsets,
        op,
        config,
        stream,
        debug_synchronous,
    )
}

/// [segmented_exclusive_scan] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn segmented_exclusive_scan_with_config<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    init: T,
    size: usize,
    offsets: &SegmentOffsets,
    op: Op,
    config: &ScanConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    segmented_scan(
        temporary_storage,
        storage_size,
        input,
        output,
        Some(init),
        size,
        offsets,
        op,
        config,
        stream,
        debug_synchronous,
    )
}

/// Tile descriptors of every segment, as `(start, end, first tile of the segment)` triples.
fn tile_descriptors(offsets: &SegmentOffsets, tile_size: usize) -> Vec<u64> {
    let mut descriptors = Vec::new();

    for segment in offsets.iter() {
        let first_tile = (descriptors.len() / 3) as u64;
        for start in segment.clone().step_by(tile_size) {
            let end = (start + tile_size).min(segment.end);
            descriptors.extend([start as u64, end as u64, first_tile]);
        }
    }

    descriptors
}

#[allow(clippy::too_many_arguments)]
fn segmented_scan<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    init: Option<T>,
    size: usize,
    offsets: &SegmentOffsets,
    op: Op,
    config: &ScanConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    config.validate()?;
    offsets.check_size(size)?;
    if output.len() < size {
        return Err(PrimError::invalid(format!(
            "Scan output holds {} items, {size} are required",
            output.len()
        )));
    }

    // Every segment adds at most one partial tile.
    let tile_size = config.tile_size();
    let max_tiles = size.div_ceil(tile_size) + offsets.len();
    let mut layout = TempStorageLayout::new();
    let lookback = LookbackLayout::<T>::push(&mut layout, max_tiles);
    let descriptors_region = layout.push::<u64>(3 * max_tiles);

    let Some(storage) = negotiate(temporary_storage, storage_size, &layout)? else {
        return Ok(());
    };

    let descriptors = tile_descriptors(offsets, tile_size);
    let num_tiles = descriptors.len() / 3;
    if num_tiles == 0 {
        return Ok(());
    }

    let properties = stream.properties();
    let mut stages = Stages::new("segmented_scan", stream, debug_synchronous);
    let descriptors_slice = descriptors_region.bind(storage)?;
    stream.write_slice(&descriptors_slice, &descriptors)?;
    stages.finish("upload_descriptors")?;

    let kernel = ScanKernel::new(
        input,
        output.clone(),
        lookback.bind(storage)?,
        init,
        op,
        ScanTiles::Segmented {
            descriptors: descriptors_slice,
        },
        num_tiles,
        BlockScan::new(config.layout(properties.plane_dim), config.algorithm),
        config.lookback,
    );
    kernel.launch(stream, &mut stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_restart_at_every_segment() {
        let offsets = SegmentOffsets::from_bounds(&[0, 5, 12], &[5, 5, 13]).unwrap();
        let descriptors = tile_descriptors(&offsets, 4);

        assert_eq!(
            descriptors,
            vec![
                0, 4, 0, //
                4, 5, 0, //
                12, 13, 2,
            ]
        );
    }
}
