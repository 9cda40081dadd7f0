use crate::{
    ConstantIterator, InputIterator, MergeSortConfig, PrimError, TempStorageLayout, TilePartition,
    iterator::load_tile,
    launch::{Stages, launch_tiles},
    partition::tile_range,
    temp_storage::negotiate,
};
use core::ops::Range;
use cubeprim_block::{
    BlockLayout, BlockMergeSort, MergeSource, SharedLayout, SharedMemory, SharedRegion,
    merge_path, serial_merge,
};
use cubeprim_common::{CompareOp, Element};
use cubeprim_runtime::{CubeContext, CubeDim, CubeKernel, DeviceSlice, Handle, Stream};

/// Stable sort of the first `size` keys of `keys_input` into `keys_output`.
///
/// Keys may be sorted in place, `keys_input` being the same slice as `keys_output`.
#[allow(clippy::too_many_arguments)]
pub fn merge_sort_keys<K, IK, C>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: IK,
    keys_output: &DeviceSlice<K>,
    size: usize,
    compare: C,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    K: Element,
    IK: InputIterator<K>,
    C: CompareOp<K>,
{
    merge_sort_keys_with_config(
        temporary_storage,
        storage_size,
        keys_input,
        keys_output,
        size,
        compare,
        &MergeSortConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// Stable sort of the first `size` keys of `keys_input`, carrying the values along.
#[allow(clippy::too_many_arguments)]
pub fn merge_sort_pairs<K, V, IK, IV, C>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: IK,
    keys_output: &DeviceSlice<K>,
    values_input: IV,
    values_output: &DeviceSlice<V>,
    size: usize,
    compare: C,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    K: Element,
    V: Element,
    IK: InputIterator<K>,
    IV: InputIterator<V>,
    C: CompareOp<K>,
{
    merge_sort_pairs_with_config(
        temporary_storage,
        storage_size,
        keys_input,
        keys_output,
        values_input,
        values_output,
        size,
        compare,
        &MergeSortConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// [merge_sort_keys] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn merge_sort_keys_with_config<K, IK, C>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: IK,
    keys_output: &DeviceSlice<K>,
    size: usize,
    compare: C,
    config: &MergeSortConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    K: Element,
    IK: InputIterator<K>,
    C: CompareOp<K>,
{
    merge_sort::<K, u8, IK, ConstantIterator<u8>, C>(
        temporary_storage,
        storage_size,
        keys_input,
        keys_output,
        None,
        size,
        compare,
        config,
        stream,
        debug_synchronous,
    )
}

/// [merge_sort_pairs] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn merge_sort_pairs_with_config<K, V, IK, IV, C>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: IK,
    keys_output: &DeviceSlice<K>,
    values_input: IV,
    values_output: &DeviceSlice<V>,
    size: usize,
    compare: C,
    config: &MergeSortConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    K: Element,
    V: Element,
    IK: InputIterator<K>,
    IV: InputIterator<V>,
    C: CompareOp<K>,
{
    merge_sort(
        temporary_storage,
        storage_size,
        keys_input,
        keys_output,
        Some((values_input, values_output)),
        size,
        compare,
        config,
        stream,
        debug_synchronous,
    )
}

/// Keys and optional values of one side of the ping-pong.
#[derive(Clone)]
struct SortBuffers<K, V> {
    keys: DeviceSlice<K>,
    values: Option<DeviceSlice<V>>,
}

#[allow(clippy::too_many_arguments)]
fn merge_sort<K, V, IK, IV, C>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    keys_input: IK,
    keys_output: &DeviceSlice<K>,
    values: Option<(IV, &DeviceSlice<V>)>,
    size: usize,
    compare: C,
    config: &MergeSortConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    K: Element,
    V: Element,
    IK: InputIterator<K>,
    IV: InputIterator<V>,
    C: CompareOp<K>,
{
    config.validate()?;
    if keys_output.len() < size {
        return Err(PrimError::invalid(format!(
            "Sort keys output holds {} items, {size} are required",
            keys_output.len()
        )));
    }
    if let Some((_, values_output)) = &values {
        if values_output.len() < size {
            return Err(PrimError::invalid(format!(
                "Sort values output holds {} items, {size} are required",
                values_output.len()
            )));
        }
    }

    let sort_tile = config.sort_tile_size();
    let merge_tile = config.merge_tile_size();
    let needs_merge = size > sort_tile;
    let num_merge_tiles = size.div_ceil(merge_tile);
    let aux_len = if needs_merge { size } else { 0 };

    let mut layout = TempStorageLayout::new();
    let keys_aux = layout.push::<K>(aux_len);
    let values_aux = layout.push::<V>(if values.is_some() { aux_len } else { 0 });
    let partitions = layout.push::<u64>(if needs_merge { num_merge_tiles + 1 } else { 0 });

    let Some(storage) = negotiate(temporary_storage, storage_size, &layout)? else {
        return Ok(());
    };
    if size == 0 {
        return Ok(());
    }

    let properties = stream.properties();
    let mut stages = Stages::new("merge_sort", stream, debug_synchronous);
    let (values_input, values_output) = match values {
        Some((input, output)) => (Some(input), Some(output.clone())),
        None => (None, None),
    };

    let output = SortBuffers {
        keys: keys_output.clone(),
        values: values_output,
    };
    let kernel = BlockSortKernel::new(
        keys_input,
        values_input,
        output.clone(),
        size,
        config.sort_layout(properties.plane_dim),
        compare.clone(),
    );
    launch_tiles(stream, &kernel, &TilePartition::new(size, sort_tile, properties))?;
    stages.finish("block_sort")?;

    if !needs_merge {
        return Ok(());
    }

    let aux = SortBuffers {
        keys: keys_aux.bind(storage)?,
        values: match output.values {
            Some(_) => Some(values_aux.bind(storage)?),
            None => None,
        },
    };
    let partitions = partitions.bind(storage)?;
    let merge_layout = config.merge_layout(properties.plane_dim);

    let mut source = output.clone();
    let mut destination = aux.clone();
    let mut sorted_in_aux = false;
    let mut run = sort_tile;
    while run < size {
        let kernel = PartitionKernel {
            keys: source.keys.clone(),
            partitions: partitions.clone(),
            num_items: size,
            run,
            merge_tile,
            num_partitions: num_merge_tiles + 1,
            units: config.partition_units,
            cmp: compare.clone(),
        };
        launch_tiles(
            stream,
            &kernel,
            &TilePartition::new(
                num_merge_tiles + 1,
                config.partition_units as usize,
                properties,
            ),
        )?;
        stages.finish("partition")?;

        let kernel = MergeKernel {
            source: source.clone(),
            destination: destination.clone(),
            partitions: partitions.clone(),
            num_items: size,
            run,
            layout: merge_layout,
            cmp: compare.clone(),
        };
        launch_tiles(stream, &kernel, &TilePartition::new(size, merge_tile, properties))?;
        stages.finish("merge")?;

        core::mem::swap(&mut source, &mut destination);
        sorted_in_aux = !sorted_in_aux;
        run *= 2;
    }

    if sorted_in_aux {
        stream.copy(&aux.keys.handle(), &output.keys.handle())?;
        if let (Some(aux), Some(output)) = (&aux.values, &output.values) {
            stream.copy(&aux.handle(), &output.handle())?;
        }
        stages.finish("copy_back")?;
    }

    Ok(())
}

/// The pair of sorted runs of length `run` holding `position`.
fn merge_runs(position: usize, run: usize, num_items: usize) -> (Range<usize>, Range<usize>) {
    let start = (position / (2 * run) * (2 * run)).min(num_items);
    let middle = (start + run).min(num_items);
    let end = (middle + run).min(num_items);

    (start..middle, middle..end)
}

/// Sorts every sort tile of the input into the output.
#[derive(Clone)]
struct BlockSortKernel<K, V, IK, IV, C> {
    keys_input: IK,
    values_input: Option<IV>,
    output: SortBuffers<K, V>,
    num_items: usize,
    layout: BlockLayout,
    cmp: C,
    key_scratch: SharedRegion<K>,
    value_scratch: SharedRegion<V>,
    shared_size: usize,
}

impl<K: Element, V: Element, IK, IV, C> BlockSortKernel<K, V, IK, IV, C> {
    fn new(
        keys_input: IK,
        values_input: Option<IV>,
        output: SortBuffers<K, V>,
        num_items: usize,
        layout: BlockLayout,
        cmp: C,
    ) -> Self {
        let scratch_len = BlockMergeSort::new(layout).scratch_len();
        let mut shared = SharedLayout::new();
        let key_scratch = shared.push(scratch_len);
        let value_scratch = shared.push(match output.values {
            Some(_) => scratch_len,
            None => 0,
        });

        Self {
            keys_input,
            values_input,
            output,
            num_items,
            layout,
            cmp,
            key_scratch,
            value_scratch,
            shared_size: shared.size(),
        }
    }
}

impl<K, V, IK, IV, C> CubeKernel for BlockSortKernel<K, V, IK, IV, C>
where
    K: Element,
    V: Element,
    IK: InputIterator<K>,
    IV: InputIterator<V>,
    C: CompareOp<K>,
{
    fn name(&self) -> &'static str {
        "block_sort"
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.layout.units)
    }

    fn shared_memory_size(&self) -> usize {
        self.shared_size
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let tile_size = self.layout.tile_size();
        let range = tile_range(cube.cube_index(), tile_size, self.num_items);
        if range.is_empty() {
            return;
        }

        let valid = range.len();
        let sorter = BlockMergeSort::new(self.layout);
        let mut keys = load_tile(&self.keys_input, range.clone(), tile_size);
        let mut memory = SharedMemory::new(cube.shared_memory());
        let key_scratch = memory.take(self.key_scratch);

        match (&self.values_input, &self.output.values) {
            (Some(values_input), Some(values_output)) => {
                let mut values = load_tile(values_input, range.clone(), tile_size);
                let value_scratch = memory.take(self.value_scratch);
                sorter.sort_pairs(
                    &mut keys,
                    &mut values,
                    valid,
                    key_scratch,
                    value_scratch,
                    &self.cmp,
                );
                for (index, value) in range.clone().zip(values) {
                    // SAFETY: every tile writes its own range.
                    unsafe { values_output.write(index, value) };
                }
            }
            _ => sorter.sort_keys(&mut keys, valid, key_scratch, &self.cmp),
        }

        for (index, key) in range.zip(keys) {
            // SAFETY: every tile writes its own range.
            unsafe { self.output.keys.write(index, key) };
        }
    }
}

/// Finds where every merge tile starts in its pair of runs.
///
/// Partition `j` is the number of items taken from the left run among the first
/// `j * merge_tile` outputs of the pair of runs holding that position.
#[derive(Clone)]
struct PartitionKernel<K, C> {
    keys: DeviceSlice<K>,
    partitions: DeviceSlice<u64>,
    num_items: usize,
    run: usize,
    merge_tile: usize,
    num_partitions: usize,
    units: u32,
    cmp: C,
}

impl<K: Element, C: CompareOp<K>> CubeKernel for PartitionKernel<K, C> {
    fn name(&self) -> &'static str {
        "merge_partition"
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.units)
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let units = self.units as usize;
        let first = cube.cube_index() as usize * units;

        for partition in first..(first + units).min(self.num_partitions) {
            let position = (partition * self.merge_tile).min(self.num_items);
            let (left, right) = merge_runs(position, self.run, self.num_items);
            let split = merge_path(
                position - left.start,
                left.len(),
                right.len(),
                |index| self.keys.load(left.start + index),
                |index| self.keys.load(right.start + index),
                &self.cmp,
            );
            // SAFETY: every unit writes its own partition.
            unsafe { self.partitions.write(partition, split as u64) };
        }
    }
}

/// Merges pairs of sorted runs, every cube producing one merge tile of the output.
#[derive(Clone)]
struct MergeKernel<K, V, C> {
    source: SortBuffers<K, V>,
    destination: SortBuffers<K, V>,
    partitions: DeviceSlice<u64>,
    num_items: usize,
    run: usize,
    layout: BlockLayout,
    cmp: C,
}

impl<K: Element, V: Element, C: CompareOp<K>> MergeKernel<K, V, C> {
    fn move_item(&self, from: usize, to: usize) {
        // SAFETY: inputs are only read during the pass and every output is written once.
        unsafe {
            self.destination.keys.write(to, self.source.keys.read(from));
            if let (Some(source), Some(destination)) =
                (&self.source.values, &self.destination.values)
            {
                destination.write(to, source.read(from));
            }
        }
    }
}

impl<K, V, C> CubeKernel for MergeKernel<K, V, C>
where
    K: Element,
    V: Element,
    C: CompareOp<K>,
{
    fn name(&self) -> &'static str {
        "merge"
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.layout.units)
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let tile = cube.cube_index() as usize;
        let output = tile_range(tile as u64, self.layout.tile_size(), self.num_items);
        if output.is_empty() {
            return;
        }

        let (left, right) = merge_runs(output.start, self.run, self.num_items);
        let pair_start = left.start;
        // SAFETY: partitions are written by the previous kernel.
        let (split_begin, split_end) = unsafe {
            (
                self.partitions.read(tile) as usize,
                self.partitions.read(tile + 1) as usize,
            )
        };

        // The next partition belongs to the next pair of runs when this tile ends the pair.
        let ends_pair = output.end == right.end;
        let left_end = if ends_pair {
            left.end
        } else {
            left.start + split_end
        };
        let right_end = if ends_pair {
            right.end
        } else {
            right.start + (output.end - pair_start - split_end)
        };
        let left_tile = left.start + split_begin..left_end;
        let right_tile = right.start + (output.start - pair_start - split_begin)..right_end;

        let keys = &self.source.keys;
        for unit in 0..self.layout.units as usize {
            let items = self.layout.unit_items(unit, output.len());
            if items.is_empty() {
                continue;
            }

            let diag = items.start;
            let split = merge_path(
                diag,
                left_tile.len(),
                right_tile.len(),
                |index| keys.load(left_tile.start + index),
                |index| keys.load(right_tile.start + index),
                &self.cmp,
            );
            serial_merge(
                left_tile.start + split..left_tile.end,
                right_tile.start + (diag - split)..right_tile.end,
                items.len(),
                |index| keys.load(index),
                |index| keys.load(index),
                &self.cmp,
                |position, source| {
                    let from = match source {
                        MergeSource::Left(index) | MergeSource::Right(index) => index,
                    };
                    self.move_item(from, output.start + diag + position);
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_are_clipped_to_items() {
        assert_eq!(merge_runs(0, 4, 10), (0..4, 4..8));
        assert_eq!(merge_runs(9, 4, 10), (8..10, 10..10));
        assert_eq!(merge_runs(10, 4, 10), (8..10, 10..10));
        assert_eq!(merge_runs(16, 4, 16), (16..16, 16..16));
    }
}
