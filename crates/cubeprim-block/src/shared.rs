use bytemuck::Pod;
use core::marker::PhantomData;

/// Maximum alignment of shared memory regions, matching the alignment of cube shared memory.
pub const SHARED_ALIGNMENT: usize = 16;

/// Computes the placement of the typed regions a kernel needs in shared memory.
///
/// Regions are laid out in push order, each one aligned for its element type.
#[derive(Debug, Default, Clone)]
pub struct SharedLayout {
    size: usize,
}

/// A typed region of shared memory created by a [SharedLayout].
#[derive(Debug)]
pub struct SharedRegion<T> {
    offset: usize,
    len: usize,
    _elem: PhantomData<T>,
}

impl<T> Clone for SharedRegion<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SharedRegion<T> {}

impl<T> SharedRegion<T> {
    /// Number of elements in the region.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl SharedLayout {
    /// An empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a region of `len` elements.
    pub fn push<T: Pod>(&mut self, len: usize) -> SharedRegion<T> {
        let align = align_of::<T>();
        assert!(
            align <= SHARED_ALIGNMENT,
            "Shared memory elements can't be aligned to more than {SHARED_ALIGNMENT} bytes"
        );

        let offset = self.size.next_multiple_of(align);
        self.size = offset + len * size_of::<T>();

        SharedRegion {
            offset,
            len,
            _elem: PhantomData,
        }
    }

    /// Total size of the layout, in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Hands out the regions of a [SharedLayout] from the shared memory of a cube.
///
/// Regions must be taken in the order they were pushed, so every region borrows a disjoint
/// part of the memory.
pub struct SharedMemory<'a> {
    bytes: &'a mut [u8],
    consumed: usize,
}

impl<'a> SharedMemory<'a> {
    /// Wrap the shared memory of a cube.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, consumed: 0 }
    }

    /// Borrow a region.
    ///
    /// # Panics
    ///
    /// If regions are taken out of order or don't fit the memory.
    pub fn take<T: Pod>(&mut self, region: SharedRegion<T>) -> &'a mut [T] {
        assert!(
            region.offset >= self.consumed,
            "Shared regions must be taken in layout order"
        );

        let bytes = core::mem::take(&mut self.bytes);
        let (_, rest) = bytes.split_at_mut(region.offset - self.consumed);
        let (data, rest) = rest.split_at_mut(region.len * size_of::<T>());

        self.bytes = rest;
        self.consumed = region.offset + data.len();
        bytemuck::cast_slice_mut(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_aligned_in_push_order() {
        let mut layout = SharedLayout::new();
        let flags = layout.push::<u8>(3);
        let values = layout.push::<u64>(2);
        let counts = layout.push::<u32>(5);

        assert_eq!(flags.offset, 0);
        assert_eq!(values.offset, 8);
        assert_eq!(counts.offset, 24);
        assert_eq!(layout.size(), 44);
    }

    #[test]
    fn taken_regions_are_disjoint() {
        let mut layout = SharedLayout::new();
        let first = layout.push::<u32>(2);
        let second = layout.push::<u64>(1);
        let mut backing = vec![0u128; layout.size().div_ceil(16)];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut backing);

        let mut memory = SharedMemory::new(&mut bytes[..layout.size()]);
        let a = memory.take(first);
        let b = memory.take(second);
        a[1] = 7;
        b[0] = u64::MAX;

        assert_eq!(a, &[0, 7]);
        assert_eq!(b, &[u64::MAX]);
    }
}
