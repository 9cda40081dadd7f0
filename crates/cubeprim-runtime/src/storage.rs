use crate::server::IoError;
use core::fmt::Debug;
use core::ops::Range;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use cubeprim_common::Element;
use std::sync::Arc;

/// Alignment of every allocation, in bytes.
pub const ALLOCATION_ALIGNMENT: usize = 64;

#[derive(Clone, Copy)]
#[repr(C, align(64))]
struct Block([u8; ALLOCATION_ALIGNMENT]);

static ALLOCATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Zero-initialized device memory.
///
/// Cubes access the memory through raw pointers, so the allocation never hands out references
/// to its content.
struct Allocation {
    id: u64,
    data: NonNull<[Block]>,
}

// SAFETY: the allocation is only accessed through raw pointers by kernels and transfers, which
// are ordered by the stream they are queued on.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    fn new(size: usize) -> Self {
        let blocks = size.div_ceil(ALLOCATION_ALIGNMENT).max(1);
        let data = vec![Block([0; ALLOCATION_ALIGNMENT]); blocks].into_boxed_slice();

        Self {
            id: ALLOCATION_COUNTER.fetch_add(1, Ordering::Relaxed),
            data: NonNull::from(Box::leak(data)),
        }
    }

    fn base(&self) -> *mut u8 {
        self.data.cast::<u8>().as_ptr()
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        // SAFETY: `data` was leaked from a box in `new` and is dropped exactly once.
        unsafe { drop(Box::from_raw(self.data.as_ptr())) }
    }
}

/// A range of bytes in a device allocation.
///
/// Handles are cheap to clone; the allocation is freed when the last handle or device slice
/// pointing to it is dropped, which also keeps memory alive while queued work uses it.
#[derive(Clone)]
pub struct Handle {
    allocation: Arc<Allocation>,
    offset: usize,
    size: usize,
}

impl Debug for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Handle")
            .field("allocation", &self.allocation.id)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

impl Handle {
    pub(crate) fn alloc(size: usize) -> Self {
        Self {
            allocation: Arc::new(Allocation::new(size)),
            offset: 0,
            size,
        }
    }

    /// A typed view over a fresh allocation of `len` elements.
    pub(crate) fn alloc_slice<T: Element>(len: usize) -> DeviceSlice<T> {
        let handle = Self::alloc(len * size_of::<T>());

        DeviceSlice {
            ptr: handle.as_ptr().cast::<T>(),
            handle,
            len,
        }
    }

    /// Size of the handle, in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Offset of the handle in its allocation, in bytes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether both handles point into the same allocation.
    pub fn same_allocation(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.allocation, &other.allocation)
    }

    /// A handle over a byte range of this handle.
    pub fn slice(&self, range: Range<usize>) -> Result<Handle, IoError> {
        if range.start > range.end || range.end > self.size {
            return Err(IoError::OutOfBounds {
                offset: range.start,
                end: range.end,
                size: self.size,
            });
        }

        Ok(Handle {
            allocation: self.allocation.clone(),
            offset: self.offset + range.start,
            size: range.end - range.start,
        })
    }

    /// A typed view over the whole handle. Trailing bytes that don't fit an element are ignored.
    pub fn as_slice<T: Element>(&self) -> Result<DeviceSlice<T>, IoError> {
        let len = self.size / size_of::<T>().max(1);
        self.as_slice_with_len(len)
    }

    /// A typed view over the first `len` elements of the handle.
    pub fn as_slice_with_len<T: Element>(&self, len: usize) -> Result<DeviceSlice<T>, IoError> {
        let bytes = len * size_of::<T>();
        if bytes > self.size {
            return Err(IoError::OutOfBounds {
                offset: 0,
                end: bytes,
                size: self.size,
            });
        }
        if self.offset % align_of::<T>() != 0 {
            return Err(IoError::Misaligned {
                offset: self.offset,
                align: align_of::<T>(),
            });
        }

        Ok(DeviceSlice {
            ptr: self.as_ptr().cast::<T>(),
            handle: self.clone(),
            len,
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        // SAFETY: the offset is within the allocation, checked when the handle was sliced.
        unsafe { self.allocation.base().add(self.offset) }
    }

    /// Copies `data` at the start of the handle.
    ///
    /// # Safety
    ///
    /// No kernel may access the range concurrently.
    pub(crate) unsafe fn write_bytes(&self, data: &[u8]) -> Result<(), IoError> {
        if data.len() > self.size {
            return Err(IoError::OutOfBounds {
                offset: 0,
                end: data.len(),
                size: self.size,
            });
        }
        // SAFETY: the range was checked and the caller guarantees exclusive access.
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), self.as_ptr(), data.len()) };
        Ok(())
    }

    /// Copies the content of the handle to the host.
    ///
    /// # Safety
    ///
    /// No kernel may write the range concurrently.
    pub(crate) unsafe fn read_bytes(&self) -> Vec<u8> {
        // SAFETY: the handle range is valid and the caller guarantees no concurrent writes.
        unsafe { core::slice::from_raw_parts(self.as_ptr(), self.size).to_vec() }
    }

    /// Copies this handle into `destination`, which may overlap.
    ///
    /// # Safety
    ///
    /// No kernel may access either range concurrently.
    pub(crate) unsafe fn copy_to(&self, destination: &Handle) -> Result<(), IoError> {
        if self.size > destination.size {
            return Err(IoError::OutOfBounds {
                offset: 0,
                end: self.size,
                size: destination.size,
            });
        }
        // SAFETY: both ranges are valid and the caller guarantees exclusive access.
        unsafe { core::ptr::copy(self.as_ptr(), destination.as_ptr(), self.size) };
        Ok(())
    }
}

/// A typed view over device memory, used by kernels to load and store elements.
///
/// A device slice keeps its allocation alive. Loads and stores are bounds checked, a faulting
/// access panics the cube, which the runtime reports as an execution error.
pub struct DeviceSlice<T> {
    handle: Handle,
    ptr: *mut T,
    len: usize,
}

// SAFETY: a device slice is a raw view on shared device memory. Accesses are unsafe and the
// kernels are responsible for not racing on the same element.
unsafe impl<T: Element> Send for DeviceSlice<T> {}
unsafe impl<T: Element> Sync for DeviceSlice<T> {}

impl<T> Clone for DeviceSlice<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            ptr: self.ptr,
            len: self.len,
        }
    }
}

impl<T> Debug for DeviceSlice<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceSlice")
            .field("handle", &self.handle)
            .field("len", &self.len)
            .finish()
    }
}

impl<T: Element> DeviceSlice<T> {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the slice has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The handle covering exactly this slice.
    pub fn handle(&self) -> Handle {
        Handle {
            allocation: self.handle.allocation.clone(),
            offset: self.handle.offset,
            size: self.len * size_of::<T>(),
        }
    }

    /// A view over a sub range of elements.
    pub fn slice(&self, range: Range<usize>) -> Result<DeviceSlice<T>, IoError> {
        let size = size_of::<T>();
        let handle = self.handle().slice(range.start * size..range.end * size)?;

        handle.as_slice_with_len(range.end - range.start)
    }

    /// Loads the element at `index`.
    ///
    /// # Safety
    ///
    /// No other unit may write the element concurrently.
    ///
    /// # Panics
    ///
    /// If `index` is out of bounds.
    #[inline]
    pub unsafe fn read(&self, index: usize) -> T {
        assert!(
            index < self.len,
            "Out of bounds load: index {index}, length {}",
            self.len
        );
        // SAFETY: the index is in bounds and the caller guarantees no concurrent write.
        unsafe { self.ptr.add(index).read() }
    }

    /// Stores `value` at `index`.
    ///
    /// # Safety
    ///
    /// No other unit may access the element concurrently.
    ///
    /// # Panics
    ///
    /// If `index` is out of bounds.
    #[inline]
    pub unsafe fn write(&self, index: usize, value: T) {
        assert!(
            index < self.len,
            "Out of bounds store: index {index}, length {}",
            self.len
        );
        // SAFETY: the index is in bounds and the caller guarantees exclusive access.
        unsafe { self.ptr.add(index).write(value) }
    }
}

impl DeviceSlice<u32> {
    /// The element at `index` viewed as an atomic.
    ///
    /// # Safety
    ///
    /// The element may only be accessed atomically while the returned reference is used.
    pub unsafe fn atomic(&self, index: usize) -> &AtomicU32 {
        assert!(index < self.len, "Out of bounds atomic: index {index}");
        // SAFETY: in bounds, aligned (checked at creation) and only accessed atomically.
        unsafe { AtomicU32::from_ptr(self.ptr.add(index)) }
    }
}

impl DeviceSlice<u64> {
    /// The element at `index` viewed as an atomic.
    ///
    /// # Safety
    ///
    /// The element may only be accessed atomically while the returned reference is used.
    pub unsafe fn atomic(&self, index: usize) -> &AtomicU64 {
        assert!(index < self.len, "Out of bounds atomic: index {index}");
        let ptr = unsafe { self.ptr.add(index) };
        assert!(
            ptr.cast::<AtomicU64>().is_aligned(),
            "Misaligned atomic at index {index}"
        );
        // SAFETY: in bounds, aligned and only accessed atomically.
        unsafe { AtomicU64::from_ptr(ptr) }
    }
}
