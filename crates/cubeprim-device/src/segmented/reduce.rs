use super::{DeviceOffsets, OffsetsLayout, SegmentOffsets};
use crate::{
    InputIterator, PrimError, ReduceConfig, TempStorageLayout, TilePartition,
    iterator::load_tile,
    launch::{Stages, launch_tiles},
    temp_storage::negotiate,
};
use cubeprim_block::{BlockLayout, BlockReduce, SharedLayout, SharedMemory, SharedRegion};
use cubeprim_common::{BinaryOp, Element};
use cubeprim_runtime::{CubeContext, CubeDim, CubeKernel, DeviceSlice, Handle, Stream};

/// Reduces every segment of `input` into `output[segment]`, starting from `initial_value`.
///
/// Empty segments produce `initial_value`.
#[allow(clippy::too_many_arguments)]
pub fn segmented_reduce<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    initial_value: T,
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
    segmented_reduce_with_config(
        temporary_storage,
        storage_size,
        input,
        output,
        initial_value,
        size,
        offsets,
        op,
        &ReduceConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// [segmented_reduce] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn segmented_reduce_with_config<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    initial_value: T,
    size: usize,
    offsets: &SegmentOffsets,
    op: Op,
    config: &ReduceConfig,
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
    if output.len() < offsets.len() {
        return Err(PrimError::invalid(format!(
            "Segmented reduce output holds {} items for {} segments",
            output.len(),
            offsets.len()
        )));
    }

    let mut layout = TempStorageLayout::new();
    let offsets_layout = OffsetsLayout::push(&mut layout, offsets);

    let Some(storage) = negotiate(temporary_storage, storage_size, &layout)? else {
        return Ok(());
    };
    if offsets.is_empty() {
        return Ok(());
    }

    let properties = stream.properties();
    let mut stages = Stages::new("segmented_reduce", stream, debug_synchronous);
    let device_offsets = offsets_layout.upload(storage, offsets, stream)?;
    stages.finish("upload_offsets")?;

    let kernel = SegmentedReduceKernel::new(
        input,
        output.clone(),
        device_offsets,
        initial_value,
        op,
        config.layout(properties.plane_dim),
    );
    launch_tiles(
        stream,
        &kernel,
        &TilePartition::from_tiles(offsets.len() as u64, properties),
    )?;
    stages.finish("reduce_segments")
}

/// Every cube reduces one segment, tile after tile.
#[derive(Clone)]
struct SegmentedReduceKernel<T, I, Op> {
    input: I,
    output: DeviceSlice<T>,
    offsets: DeviceOffsets,
    init: T,
    op: Op,
    layout: BlockLayout,
    scratch: SharedRegion<T>,
    shared_size: usize,
}

impl<T: Element, I, Op> SegmentedReduceKernel<T, I, Op> {
    fn new(
        input: I,
        output: DeviceSlice<T>,
        offsets: DeviceOffsets,
        init: T,
        op: Op,
        layout: BlockLayout,
    ) -> Self {
        let mut shared = SharedLayout::new();
        let scratch = shared.push(BlockReduce::new(layout).scratch_len());

        Self {
            input,
            output,
            offsets,
            init,
            op,
            layout,
            scratch,
            shared_size: shared.size(),
        }
    }
}

impl<T, I, Op> CubeKernel for SegmentedReduceKernel<T, I, Op>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    fn name(&self) -> &'static str {
        "segmented_reduce"
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

        let tile_size = self.layout.tile_size();
        let block = BlockReduce::new(self.layout);
        let items = self.offsets.segment(segment);
        let mut memory = SharedMemory::new(cube.shared_memory());
        let scratch = memory.take(self.scratch);

        let mut total = self.init;
        for start in items.clone().step_by(tile_size) {
            let range = start..(start + tile_size).min(items.end);
            let valid = range.len();
            let tile = load_tile(&self.input, range, tile_size);
            if let Some(aggregate) = block.reduce(&tile, valid, scratch, &self.op) {
                total = self.op.combine(total, aggregate);
            }
        }

        // SAFETY: every segment writes its own output.
        unsafe { self.output.write(segment, total) };
    }
}
