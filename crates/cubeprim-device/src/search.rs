use crate::{
    InputIterator, PrimError, SearchConfig, TempStorageLayout, TilePartition,
    launch::{Stages, launch_tiles},
    partition::tile_range,
    temp_storage::negotiate,
};
use core::{marker::PhantomData, sync::atomic::Ordering};
use cubeprim_common::{BinaryPredicate, Element};
use cubeprim_runtime::{CubeContext, CubeDim, CubeKernel, DeviceSlice, Handle, Stream};

/// Writes into `output[0]` the first position of `input` where the `keys_size` first items of
/// `keys` occur, or `size` when they don't.
///
/// Items are compared with `predicate(input item, key)`. Empty keys are found at position 0.
#[allow(clippy::too_many_arguments)]
pub fn search<T, I, K, P>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    keys: K,
    output: &DeviceSlice<u64>,
    size: usize,
    keys_size: usize,
    predicate: P,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    K: InputIterator<T>,
    P: BinaryPredicate<T>,
{
    search_with_config(
        temporary_storage,
        storage_size,
        input,
        keys,
        output,
        size,
        keys_size,
        predicate,
        &SearchConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// [search] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn search_with_config<T, I, K, P>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    keys: K,
    output: &DeviceSlice<u64>,
    size: usize,
    keys_size: usize,
    predicate: P,
    config: &SearchConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    K: InputIterator<T>,
    P: BinaryPredicate<T>,
{
    find_first(
        temporary_storage,
        storage_size,
        Sequence {
            input,
            keys,
            keys_size,
            predicate,
            _element: PhantomData,
        },
        output,
        size,
        config,
        stream,
        debug_synchronous,
    )
}

/// Writes into `output[0]` the first position of `input` starting `count` consecutive items
/// equal to `value`, or `size` when there is none.
///
/// A zero `count` is found at position 0.
#[allow(clippy::too_many_arguments)]
pub fn search_n<T, I, P>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<u64>,
    size: usize,
    count: usize,
    value: T,
    predicate: P,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    P: BinaryPredicate<T>,
{
    search_n_with_config(
        temporary_storage,
        storage_size,
        input,
        output,
        size,
        count,
        value,
        predicate,
        &SearchConfig::default(),
        stream,
        debug_synchronous,
    )
}

/// [search_n] with an explicit configuration.
#[allow(clippy::too_many_arguments)]
pub fn search_n_with_config<T, I, P>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    input: I,
    output: &DeviceSlice<u64>,
    size: usize,
    count: usize,
    value: T,
    predicate: P,
    config: &SearchConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    I: InputIterator<T>,
    P: BinaryPredicate<T>,
{
    find_first(
        temporary_storage,
        storage_size,
        Repeat {
            input,
            value,
            count,
            predicate,
        },
        output,
        size,
        config,
        stream,
        debug_synchronous,
    )
}

/// What a search looks for at every candidate position.
trait SearchPattern: Clone + Send + Sync + 'static {
    /// Number of items covered by a match.
    fn len(&self) -> usize;

    /// Whether the pattern occurs at `position`.
    fn matches_at(&self, position: usize) -> bool;
}

#[derive(Clone)]
struct Sequence<T, I, K, P> {
    input: I,
    keys: K,
    keys_size: usize,
    predicate: P,
    _element: PhantomData<fn() -> T>,
}

impl<T, I, K, P> SearchPattern for Sequence<T, I, K, P>
where
    T: Element,
    I: InputIterator<T>,
    K: InputIterator<T>,
    P: BinaryPredicate<T>,
{
    fn len(&self) -> usize {
        self.keys_size
    }

    fn matches_at(&self, position: usize) -> bool {
        (0..self.keys_size).all(|offset| {
            self.predicate
                .test(&self.input.load(position + offset), &self.keys.load(offset))
        })
    }
}

#[derive(Clone)]
struct Repeat<T, I, P> {
    input: I,
    value: T,
    count: usize,
    predicate: P,
}

impl<T, I, P> SearchPattern for Repeat<T, I, P>
where
    T: Element,
    I: InputIterator<T>,
    P: BinaryPredicate<T>,
{
    fn len(&self) -> usize {
        self.count
    }

    fn matches_at(&self, position: usize) -> bool {
        (position..position + self.count)
            .all(|index| self.predicate.test(&self.input.load(index), &self.value))
    }
}

#[allow(clippy::too_many_arguments)]
fn find_first<S: SearchPattern>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    pattern: S,
    output: &DeviceSlice<u64>,
    size: usize,
    config: &SearchConfig,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError> {
    config.validate()?;
    if output.is_empty() {
        return Err(PrimError::invalid("Search output can't be empty"));
    }

    let mut layout = TempStorageLayout::new();
    let result = layout.push::<u64>(1);

    let Some(storage) = negotiate(temporary_storage, storage_size, &layout)? else {
        return Ok(());
    };
    let mut stages = Stages::new("search", stream, debug_synchronous);

    let trivial = match pattern.len() {
        0 => Some(0),
        len if len > size => Some(size),
        _ => None,
    };
    if let Some(position) = trivial {
        stream.write_slice(output, &[position as u64])?;
        return stages.finish("write_trivial");
    }

    let result = result.bind(storage)?;
    stream.write_slice(&result, &[size as u64])?;
    stages.finish("init_result")?;

    let properties = stream.properties();
    let num_candidates = size - pattern.len() + 1;
    let tile_size = config.tile_size();
    let kernel = FindFirstKernel::new(
        pattern,
        result.clone(),
        num_candidates,
        config.units,
        tile_size,
    );
    launch_tiles(
        stream,
        &kernel,
        &TilePartition::new(num_candidates, tile_size, properties),
    )?;
    stages.finish("find_first")?;

    stream.copy(&result.handle(), &output.slice(0..1)?.handle())?;
    stages.finish("copy_result")
}

/// Every cube tests the candidate positions of its tile in order, and lowers the shared
/// result to the first match.
#[derive(new, Clone)]
struct FindFirstKernel<S> {
    pattern: S,
    result: DeviceSlice<u64>,
    num_candidates: usize,
    units: u32,
    tile_size: usize,
}

impl<S: SearchPattern> CubeKernel for FindFirstKernel<S> {
    fn name(&self) -> &'static str {
        "find_first"
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.units)
    }

    fn shared_memory_size(&self) -> usize {
        0
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        // SAFETY: the result is only accessed atomically while the kernel runs.
        let result = unsafe { self.result.atomic(0) };

        for position in tile_range(cube.cube_index(), self.tile_size, self.num_candidates) {
            // An earlier match was already found.
            if position as u64 >= result.load(Ordering::Relaxed) {
                return;
            }
            if self.pattern.matches_at(position) {
                result.fetch_min(position as u64, Ordering::Relaxed);
                return;
            }
        }
    }
}
