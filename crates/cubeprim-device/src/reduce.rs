use crate::{
    InputIterator, PrimError, ReduceConfig, TempStorageLayout, TilePartition,
    iterator::load_tile,
    launch::{Stages, launch_tiles},
    partition::tile_range,
    temp_storage::negotiate,
};
use cubeprim_block::{BlockLayout, BlockReduce, SharedLayout, SharedMemory, SharedRegion};
use cubeprim_common::{BinaryOp, Element};
use cubeprim_runtime::{CubeContext, CubeDim, CubeKernel, DeviceSlice, Handle, Stream};

/// Reduces the first `size` items of `input` into `output[0]`, starting from `initial_value`.
///
/// Items are combined in index order, the operator doesn't need to be commutative. An empty
/// input writes `initial_value`.
#[allow(clippy::too_many_arguments)]
pub fn reduce<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    initial_value: T,
    size: usize,
    op: Op,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    reduce_with_config(
        temporary_storage,
        storage_size,
        input,
        output,
        initial_value,
        size,
        op,
        &ReduceConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// [reduce] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn reduce_with_config<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    initial_value: T,
    size: usize,
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
    if output.is_empty() {
        return Err(PrimError::invalid("Reduce output can't be empty"));
    }

    let tile_size = config.tile_size();
    let num_tiles = size.div_ceil(tile_size);
    let mut layout = TempStorageLayout::new();
    let buffers = if num_tiles > 1 {
        [
            layout.push::<T>(num_tiles),
            layout.push::<T>(num_tiles.div_ceil(tile_size)),
        ]
    } else {
        [layout.push::<T>(0), layout.push::<T>(0)]
    };

    let Some(storage) = negotiate(temporary_storage, storage_size, &layout)? else {
        return Ok(());
    };
    let mut stages = Stages::new("reduce", stream, debug_synchronous);

    if size == 0 {
        stream.write_slice(output, &[initial_value])?;
        return stages.finish("write_initial");
    }

    let properties = stream.properties();
    let block_layout = config.layout(properties.plane_dim);
    let buffers = [buffers[0].bind(storage)?, buffers[1].bind(storage)?];

    let first_output = match num_tiles {
        1 => output.clone(),
        _ => buffers[0].clone(),
    };
    let kernel = ReduceKernel::new(
        input,
        first_output,
        (num_tiles == 1).then_some(initial_value),
        op.clone(),
        size,
        block_layout,
    );
    launch_tiles(stream, &kernel, &TilePartition::new(size, tile_size, properties))?;
    stages.finish("reduce_tiles")?;

    let mut current = 0;
    let mut count = num_tiles;
    while count > 1 {
        let next = count.div_ceil(tile_size);
        let destination = match next {
            1 => output.clone(),
            _ => buffers[1 - current].clone(),
        };
        let kernel = ReduceKernel::new(
            buffers[current].clone(),
            destination,
            (next == 1).then_some(initial_value),
            op.clone(),
            count,
            block_layout,
        );
        launch_tiles(stream, &kernel, &TilePartition::new(count, tile_size, properties))?;
        stages.finish("reduce_partials")?;

        current = 1 - current;
        count = next;
    }

    Ok(())
}

/// Reduces every tile of its input into one output item.
#[derive(Clone)]
struct ReduceKernel<T, I, Op> {
    input: I,
    output: DeviceSlice<T>,
    init: Option<T>,
    op: Op,
    num_items: usize,
    layout: BlockLayout,
    scratch: SharedRegion<T>,
    shared_size: usize,
}

impl<T: Element, I, Op> ReduceKernel<T, I, Op> {
    fn new(
        input: I,
        output: DeviceSlice<T>,
        init: Option<T>,
        op: Op,
        num_items: usize,
        layout: BlockLayout,
    ) -> Self {
        let mut shared = SharedLayout::new();
        let scratch = shared.push(BlockReduce::new(layout).scratch_len());

        Self {
            input,
            output,
            init,
            op,
            num_items,
            layout,
            scratch,
            shared_size: shared.size(),
        }
    }
}

impl<T, I, Op> CubeKernel for ReduceKernel<T, I, Op>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    fn name(&self) -> &'static str {
        "reduce"
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.layout.units)
    }

    fn shared_memory_size(&self) -> usize {
        self.shared_size
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let tile = cube.cube_index();
        let tile_size = self.layout.tile_size();
        let range = tile_range(tile, tile_size, self.num_items);
        if range.is_empty() {
            return;
        }

        let valid = range.len();
        let items = load_tile(&self.input, range, tile_size);
        let mut memory = SharedMemory::new(cube.shared_memory());
        let scratch = memory.take(self.scratch);

        let Some(total) = BlockReduce::new(self.layout).reduce(&items, valid, scratch, &self.op)
        else {
            return;
        };
        let value = match self.init {
            Some(init) => self.op.combine(init, total),
            None => total,
        };
        // SAFETY: every tile writes its own output.
        unsafe { self.output.write(tile as usize, value) };
    }
}
