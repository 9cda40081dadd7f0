use crate::{
    InputIterator, LookbackMode, PrimError, ScanConfig, TempStorageLayout, TilePartition,
    iterator::load_tile,
    launch::{Stages, launch_tiles},
    lookback::{InitLookbackKernel, LookbackLayout, LookbackState, TileStatus},
    partition::tile_range,
    temp_storage::negotiate,
};
use core::ops::Range;
use cubeprim_block::{BlockScan, SharedLayout, SharedMemory, SharedRegion};
use cubeprim_common::{BinaryOp, Element};
use cubeprim_runtime::{CubeContext, CubeDim, CubeKernel, DeviceSlice, Handle, Stream};

/// Inclusive scan of the first `size` items of `input` into `output`.
///
/// `output[i]` is the combination of `input[0..=i]`. Operands keep their index order, so the
/// operator only needs to be associative, but their grouping depends on how the tiles were
/// scheduled: floating point results may differ between runs. Use
/// [deterministic_inclusive_scan] for reproducible results.
#[allow(clippy::too_many_arguments)]
pub fn inclusive_scan<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
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
    inclusive_scan_with_config(
        temporary_storage,
        storage_size,
        input,
        output,
        size,
        op,
        &ScanConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// Exclusive scan of the first `size` items of `input` into `output`, seeded with `init`.
///
/// `output[0]` is `init` and `output[i]` combines `init` with `input[0..i]`. As with
/// [inclusive_scan], the grouping of floating point operands may differ between runs, see
/// [deterministic_exclusive_scan].
#[allow(clippy::too_many_arguments)]
pub fn exclusive_scan<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    init: T,
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
    exclusive_scan_with_config(
        temporary_storage,
        storage_size,
        input,
        output,
        init,
        size,
        op,
        &ScanConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// [inclusive_scan] combining values in the same grouping on every run.
#[allow(clippy::too_many_arguments)]
pub fn deterministic_inclusive_scan<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
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
    inclusive_scan_with_config(
        temporary_storage,
        storage_size,
        input,
        output,
        size,
        op,
        &ScanConfig::default().with_lookback(LookbackMode::Deterministic),
        stream,
        debug_synchronous,
    )
}

/// [exclusive_scan] combining values in the same grouping on every run.
#[allow(clippy::too_many_arguments)]
pub fn deterministic_exclusive_scan<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    init: T,
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
    exclusive_scan_with_config(
        temporary_storage,
        storage_size,
        input,
        output,
        init,
        size,
        op,
        &ScanConfig::default().with_lookback(LookbackMode::Deterministic),
        stream,
        debug_synchronous,
    )
}

/// [inclusive_scan] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn inclusive_scan_with_config<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    size: usize,
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
    scan(
        temporary_storage,
        storage_size,
        input,
        output,
        None,
        size,
        op,
        config,
        stream,
        debug_synchronous,
    )
}

/// [exclusive_scan] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn exclusive_scan_with_config<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    init: T,
    size: usize,
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
    scan(
        temporary_storage,
        storage_size,
        input,
        output,
        Some(init),
        size,
        op,
        config,
        stream,
        debug_synchronous,
    )
}

#[allow(clippy::too_many_arguments)]
fn scan<T, I, Op>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<T>,
    init: Option<T>,
    size: usize,
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
    if output.len() < size {
        return Err(PrimError::invalid(format!(
            "Scan output holds {} items, {size} are required",
            output.len()
        )));
    }

    let num_tiles = size.div_ceil(config.tile_size());
    let mut layout = TempStorageLayout::new();
    let lookback = LookbackLayout::<T>::push(&mut layout, num_tiles);

    let Some(storage) = negotiate(temporary_storage, storage_size, &layout)? else {
        return Ok(());
    };
    if size == 0 {
        return Ok(());
    }

    let properties = stream.properties();
    let state = lookback.bind(storage)?;
    let mut stages = Stages::new("scan", stream, debug_synchronous);

    let kernel = ScanKernel::new(
        input,
        output.clone(),
        state,
        init,
        op,
        ScanTiles::Uniform { num_items: size },
        num_tiles,
        BlockScan::new(config.layout(properties.plane_dim), config.algorithm),
        config.lookback,
    );
    kernel.launch(stream, &mut stages)
}

/// Where the tiles of a scan are.
#[derive(Clone, Debug)]
pub(crate) enum ScanTiles {
    /// Consecutive tiles over the whole input, all of them in a single segment.
    Uniform { num_items: usize },
    /// Tiles described by `(start, end, first tile of the segment)` triples.
    Segmented { descriptors: DeviceSlice<u64> },
}

impl ScanTiles {
    /// Items of `tile` and the first tile of its segment.
    fn tile(&self, tile: usize, tile_size: usize) -> (Range<usize>, usize) {
        match self {
            ScanTiles::Uniform { num_items } => (tile_range(tile as u64, tile_size, *num_items), 0),
            // SAFETY: descriptors are only written by the upload preceding the kernels.
            ScanTiles::Segmented { descriptors } => unsafe {
                let start = descriptors.read(3 * tile) as usize;
                let end = descriptors.read(3 * tile + 1) as usize;
                let first = descriptors.read(3 * tile + 2) as usize;
                (start..end, first)
            },
        }
    }
}

/// Single pass scan: every cube scans one tile and finds its prefix by looking back.
#[derive(Clone)]
pub(crate) struct ScanKernel<T, I, Op> {
    input: I,
    output: DeviceSlice<T>,
    state: LookbackState<T>,
    init: Option<T>,
    op: Op,
    tiles: ScanTiles,
    num_tiles: usize,
    block: BlockScan,
    lookback: LookbackMode,
    scratch: SharedRegion<T>,
    shared_size: usize,
}

impl<T: Element, I, Op> ScanKernel<T, I, Op> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        input: I,
        output: DeviceSlice<T>,
        state: LookbackState<T>,
        init: Option<T>,
        op: Op,
        tiles: ScanTiles,
        num_tiles: usize,
        block: BlockScan,
        lookback: LookbackMode,
    ) -> Self {
        let mut shared = SharedLayout::new();
        let scratch = shared.push(block.scratch_len());

        Self {
            input,
            output,
            state,
            init,
            op,
            tiles,
            num_tiles,
            block,
            lookback,
            scratch,
            shared_size: shared.size(),
        }
    }
}

impl<T, I, Op> ScanKernel<T, I, Op>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    /// Reset the look-back state, then scan every tile.
    pub(crate) fn launch(&self, stream: &Stream, stages: &mut Stages<'_>) -> Result<(), PrimError> {
        let properties = stream.properties();

        launch_tiles(
            stream,
            &InitLookbackKernel::new(self.state.clone(), self.num_tiles),
            &TilePartition::new(
                self.num_tiles,
                InitLookbackKernel::<T>::UNITS as usize,
                properties,
            ),
        )?;
        stages.finish("init_lookback")?;

        launch_tiles(
            stream,
            self,
            &TilePartition::from_tiles(self.num_tiles as u64, properties),
        )?;
        stages.finish("scan")
    }

    /// Writes the scanned tile, `items` holding its inclusive scan.
    fn store(&self, range: Range<usize>, items: &[T], prefix: Option<T>) {
        for (offset, index) in range.enumerate() {
            let value = match self.init {
                Some(init) => {
                    let prefix = prefix.unwrap_or(init);
                    match offset {
                        0 => prefix,
                        _ => self.op.combine(prefix, items[offset - 1]),
                    }
                }
                None => match prefix {
                    Some(prefix) => self.op.combine(prefix, items[offset]),
                    None => items[offset],
                },
            };
            // SAFETY: every output belongs to a single tile.
            unsafe { self.output.write(index, value) };
        }
    }
}

impl<T, I, Op> CubeKernel for ScanKernel<T, I, Op>
where
    T: Element,
    I: InputIterator<T>,
    Op: BinaryOp<T>,
{
    fn name(&self) -> &'static str {
        "scan"
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.block.layout().units)
    }

    fn shared_memory_size(&self) -> usize {
        self.shared_size
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let tile = self.state.next_tile() as usize;
        if tile >= self.num_tiles {
            return;
        }

        let tile_size = self.block.layout().tile_size();
        let (range, first_tile) = self.tiles.tile(tile, tile_size);
        let valid = range.len();
        let mut items = load_tile(&self.input, range.clone(), tile_size);

        let mut memory = SharedMemory::new(cube.shared_memory());
        let scratch = memory.take(self.scratch);
        self.block.inclusive_scan(&mut items, scratch, &self.op);
        let aggregate = items[valid - 1];

        let prefix = if tile == first_tile {
            let status = match self.init {
                Some(init) => self.op.combine(init, aggregate),
                None => aggregate,
            };
            self.state.publish(tile, TileStatus::Prefix(status));
            self.init
        } else {
            self.state.publish(tile, TileStatus::Partial(aggregate));
            let Some(prefix) =
                self.state
                    .lookback(tile, first_tile, self.lookback, &self.op, cube)
            else {
                return;
            };
            self.state
                .publish(tile, TileStatus::Prefix(self.op.combine(prefix, aggregate)));
            Some(prefix)
        };

        self.store(range, &items, prefix);
    }
}
