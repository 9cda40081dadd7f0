use crate::{
    InputIterator, PrimError, SearchConfig, TempStorageLayout, TilePartition,
    launch::{Stages, launch_tiles},
    partition::tile_range,
    temp_storage::negotiate,
};
use core::marker::PhantomData;
use cubeprim_common::{CompareOp, Element};
use cubeprim_runtime::{CubeContext, CubeDim, CubeKernel, DeviceSlice, Handle, Stream};

/// For every needle, the index of the first item of the sorted `haystack` not ordered before
/// it.
#[allow(clippy::too_many_arguments)]
pub fn lower_bound<T, H, N, C>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    haystack: H,
    needles: N,
    output: &DeviceSlice<u64>,
    haystack_size: usize,
    needles_size: usize,
    compare: C,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    H: InputIterator<T>,
    N: InputIterator<T>,
    C: CompareOp<T>,
{
    binary_search_all::<LowerBound, _, _, _, _>(
        temporary_storage,
        storage_size,
        haystack,
        needles,
        output,
        haystack_size,
        needles_size,
        compare,
        stream,
        debug_synchronous,
    )
}

/// For every needle, the index of the first item of the sorted `haystack` ordered after it.
#[allow(clippy::too_many_arguments)]
pub fn upper_bound<T, H, N, C>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    haystack: H,
    needles: N,
    output: &DeviceSlice<u64>,
    haystack_size: usize,
    needles_size: usize,
    compare: C,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    H: InputIterator<T>,
    N: InputIterator<T>,
    C: CompareOp<T>,
{
    binary_search_all::<UpperBound, _, _, _, _>(
        temporary_storage,
        storage_size,
        haystack,
        needles,
        output,
        haystack_size,
        needles_size,
        compare,
        stream,
        debug_synchronous,
    )
}

/// For every needle, writes 1 when the sorted `haystack` holds an equivalent item, 0 otherwise.
#[allow(clippy::too_many_arguments)]
pub fn binary_search<T, H, N, C>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    haystack: H,
    needles: N,
    output: &DeviceSlice<u8>,
    haystack_size: usize,
    needles_size: usize,
    compare: C,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    T: Element,
    H: InputIterator<T>,
    N: InputIterator<T>,
    C: CompareOp<T>,
{
    binary_search_all::<Contains, _, _, _, _>(
        temporary_storage,
        storage_size,
        haystack,
        needles,
        output,
        haystack_size,
        needles_size,
        compare,
        stream,
        debug_synchronous,
    )
}

/// What is written for every needle.
trait SearchOutcome: Send + Sync + 'static {
    type Output: Element;

    fn find<T, H: InputIterator<T>, C: CompareOp<T>>(
        haystack: &H,
        size: usize,
        needle: &T,
        compare: &C,
    ) -> Self::Output;
}

struct LowerBound;
struct UpperBound;
struct Contains;

impl SearchOutcome for LowerBound {
    type Output = u64;

    fn find<T, H: InputIterator<T>, C: CompareOp<T>>(
        haystack: &H,
        size: usize,
        needle: &T,
        compare: &C,
    ) -> u64 {
        partition_point(size, |index| compare.less(&haystack.load(index), needle)) as u64
    }
}

impl SearchOutcome for UpperBound {
    type Output = u64;

    fn find<T, H: InputIterator<T>, C: CompareOp<T>>(
        haystack: &H,
        size: usize,
        needle: &T,
        compare: &C,
    ) -> u64 {
        partition_point(size, |index| !compare.less(needle, &haystack.load(index))) as u64
    }
}

impl SearchOutcome for Contains {
    type Output = u8;

    fn find<T, H: InputIterator<T>, C: CompareOp<T>>(
        haystack: &H,
        size: usize,
        needle: &T,
        compare: &C,
    ) -> u8 {
        let index = LowerBound::find(haystack, size, needle, compare) as usize;
        (index < size && !compare.less(needle, &haystack.load(index))) as u8
    }
}

/// First index of `0..size` for which `before` is false, `before` being true on a prefix.
fn partition_point(size: usize, before: impl Fn(usize) -> bool) -> usize {
    let (mut low, mut high) = (0, size);
    while low < high {
        let mid = low + (high - low) / 2;
        if before(mid) {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low
}

#[allow(clippy::too_many_arguments)]
fn binary_search_all<O, T, H, N, C>(
    temporary_storage: Option<&Handle>,
    storage_size: &mut usize,
    haystack: H,
    needles: N,
    output: &DeviceSlice<O::Output>,
    haystack_size: usize,
    needles_size: usize,
    compare: C,
    stream: &Stream,
    debug_synchronous: bool,
) -> Result<(), PrimError>
where
    O: SearchOutcome,
    T: Element,
    H: InputIterator<T>,
    N: InputIterator<T>,
    C: CompareOp<T>,
{
    if output.len() < needles_size {
        return Err(PrimError::invalid(format!(
            "Binary search output holds {} items for {needles_size} needles",
            output.len()
        )));
    }

    let Some(_) = negotiate(temporary_storage, storage_size, &TempStorageLayout::new())? else {
        return Ok(());
    };
    if needles_size == 0 {
        return Ok(());
    }

    let config = SearchConfig::default();
    let kernel = BinarySearchKernel::<O, T, H, N, C> {
        haystack,
        needles,
        output: output.clone(),
        haystack_size,
        needles_size,
        compare,
        units: config.units,
        tile_size: config.tile_size(),
        _outcome: PhantomData,
    };
    let mut stages = Stages::new("binary_search", stream, debug_synchronous);
    launch_tiles(
        stream,
        &kernel,
        &TilePartition::new(needles_size, config.tile_size(), stream.properties()),
    )?;
    stages.finish("search_needles")
}

/// Every cube searches the needles of its tile.
struct BinarySearchKernel<O: SearchOutcome, T, H, N, C> {
    haystack: H,
    needles: N,
    output: DeviceSlice<O::Output>,
    haystack_size: usize,
    needles_size: usize,
    compare: C,
    units: u32,
    tile_size: usize,
    _outcome: PhantomData<fn() -> (O, T)>,
}

impl<O: SearchOutcome, T, H: Clone, N: Clone, C: Clone> Clone for BinarySearchKernel<O, T, H, N, C> {
    fn clone(&self) -> Self {
        Self {
            haystack: self.haystack.clone(),
            needles: self.needles.clone(),
            output: self.output.clone(),
            haystack_size: self.haystack_size,
            needles_size: self.needles_size,
            compare: self.compare.clone(),
            units: self.units,
            tile_size: self.tile_size,
            _outcome: PhantomData,
        }
    }
}

impl<O, T, H, N, C> CubeKernel for BinarySearchKernel<O, T, H, N, C>
where
    O: SearchOutcome,
    T: Element,
    H: InputIterator<T>,
    N: InputIterator<T>,
    C: CompareOp<T>,
{
    fn name(&self) -> &'static str {
        "binary_search"
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.units)
    }

    fn shared_memory_size(&self) -> usize {
        0
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        for index in tile_range(cube.cube_index(), self.tile_size, self.needles_size) {
            let needle = self.needles.load(index);
            let found = O::find(&self.haystack, self.haystack_size, &needle, &self.compare);
            // SAFETY: every needle writes its own output.
            unsafe { self.output.write(index, found) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeprim_common::Less;

    #[derive(Clone)]
    struct Host(Vec<i32>);

    impl InputIterator<i32> for Host {
        fn load(&self, index: usize) -> i32 {
            self.0[index]
        }
    }

    #[test]
    fn bounds_surround_equal_items() {
        let haystack = Host(vec![1, 3, 3, 3, 8]);

        assert_eq!(LowerBound::find(&haystack, 5, &3, &Less), 1);
        assert_eq!(UpperBound::find(&haystack, 5, &3, &Less), 4);
        assert_eq!(LowerBound::find(&haystack, 5, &0, &Less), 0);
        assert_eq!(UpperBound::find(&haystack, 5, &9, &Less), 5);
        assert_eq!(LowerBound::find(&haystack, 0, &3, &Less), 0);
    }

    #[test]
    fn contains_only_equivalent_items() {
        let haystack = Host(vec![1, 3, 3, 3, 8]);

        assert_eq!(Contains::find(&haystack, 5, &3, &Less), 1);
        assert_eq!(Contains::find(&haystack, 5, &4, &Less), 0);
        assert_eq!(Contains::find(&haystack, 5, &9, &Less), 0);
    }
}
