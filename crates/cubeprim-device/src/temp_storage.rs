use crate::PrimError;
use core::marker::PhantomData;
use cubeprim_common::Element;
use cubeprim_runtime::{DeviceSlice, Handle};

/// Smallest temporary storage size ever requested, so that a sizing call never returns zero.
pub const MIN_TEMP_STORAGE_SIZE: usize = 4;

const REGION_ALIGNMENT: usize = 16;

/// Placement of the typed regions of a primitive's temporary storage.
///
/// The layout only depends on the problem size and the configuration, never on the data, so
/// the sizing and execution calls of a primitive compute the same layout.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TempStorageLayout {
    size: usize,
}

/// A typed region of temporary storage.
#[derive(Debug)]
pub struct TempRegion<T> {
    offset: usize,
    len: usize,
    _elem: PhantomData<T>,
}

impl<T> Clone for TempRegion<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TempRegion<T> {}

impl TempStorageLayout {
    /// An empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a region of `len` elements.
    pub fn push<T: Element>(&mut self, len: usize) -> TempRegion<T> {
        let align = align_of::<T>().max(REGION_ALIGNMENT);
        let offset = self.size.next_multiple_of(align);
        self.size = offset + len * size_of::<T>();

        TempRegion {
            offset,
            len,
            _elem: PhantomData,
        }
    }

    /// Number of bytes to allocate.
    pub fn size(&self) -> usize {
        self.size.max(MIN_TEMP_STORAGE_SIZE)
    }
}

impl<T: Element> TempRegion<T> {
    /// Number of elements in the region.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the region inside the temporary storage.
    pub fn bind(&self, storage: &Handle) -> Result<DeviceSlice<T>, PrimError> {
        let end = self.offset + self.len * size_of::<T>();
        let slice = storage.slice(self.offset..end)?.as_slice_with_len(self.len)?;

        Ok(slice)
    }
}

/// Applies the temporary storage protocol.
///
/// Without storage, writes the required size and returns `None`: the caller must return
/// without doing any work. With storage, checks that both the declared size and the handle
/// are large enough.
pub(crate) fn negotiate<'a>(
    temporary_storage: Option<&'a Handle>,
    storage_size: &mut usize,
    layout: &TempStorageLayout,
) -> Result<Option<&'a Handle>, PrimError> {
    let required = layout.size();

    match temporary_storage {
        None => {
            *storage_size = required;
            Ok(None)
        }
        Some(storage) => {
            let provided = (*storage_size).min(storage.size());
            if provided < required {
                return Err(PrimError::AllocationFailure { required, provided });
            }

            Ok(Some(storage))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeprim_runtime::{ComputeClient, DeviceProperties};

    #[test]
    fn regions_are_aligned() {
        let mut layout = TempStorageLayout::new();
        let flags = layout.push::<u32>(3);
        let values = layout.push::<u64>(2);

        assert_eq!(flags.offset, 0);
        assert_eq!(values.offset, 16);
        assert_eq!(layout.size(), 32);
    }

    #[test]
    fn empty_layout_has_minimum_size() {
        let mut layout = TempStorageLayout::new();
        layout.push::<u32>(0);

        assert_eq!(layout.size(), MIN_TEMP_STORAGE_SIZE);
    }

    #[test]
    fn sizing_call_writes_required_size() {
        let mut layout = TempStorageLayout::new();
        layout.push::<u64>(10);
        let mut size = 0;

        let storage = negotiate(None, &mut size, &layout).unwrap();

        assert!(storage.is_none());
        assert_eq!(size, 80);
    }

    #[test]
    fn small_storage_is_rejected() {
        let client = ComputeClient::new(DeviceProperties::default());
        let mut layout = TempStorageLayout::new();
        layout.push::<u64>(10);
        let storage = client.empty(40);

        let mut size = 80;
        let err = negotiate(Some(&storage), &mut size, &layout).unwrap_err();
        assert_eq!(
            err,
            PrimError::AllocationFailure {
                required: 80,
                provided: 40
            }
        );

        let storage = client.empty(80);
        let mut size = 79;
        let err = negotiate(Some(&storage), &mut size, &layout).unwrap_err();
        assert_eq!(
            err,
            PrimError::AllocationFailure {
                required: 80,
                provided: 79
            }
        );
    }

    #[test]
    fn bound_regions_cover_their_bytes() {
        let client = ComputeClient::new(DeviceProperties::default());
        let mut layout = TempStorageLayout::new();
        let _flags = layout.push::<u32>(5);
        let values = layout.push::<u64>(4);
        let storage = client.empty(layout.size());

        let slice = values.bind(&storage).unwrap();

        assert_eq!(slice.len(), 4);
        assert_eq!(slice.handle().offset(), 32);
    }
}
