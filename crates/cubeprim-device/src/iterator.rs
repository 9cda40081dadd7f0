use core::{marker::PhantomData, ops::Range};
use cubeprim_common::{Element, Numeric};
use cubeprim_runtime::DeviceSlice;

/// A random access source of elements read by kernels.
///
/// Device primitives read their inputs through this trait, so fancy iterators computing their
/// elements on the fly can replace device buffers. Inputs must not be written by the kernel
/// reading them, except for the elements a cube reads before writing them itself.
pub trait InputIterator<T>: Clone + Send + Sync + 'static {
    /// The element at `index`.
    fn load(&self, index: usize) -> T;
}

impl<T: Element> InputIterator<T> for DeviceSlice<T> {
    #[inline]
    fn load(&self, index: usize) -> T {
        // SAFETY: primitives never write an input while another cube may read it.
        unsafe { self.read(index) }
    }
}

/// The sequence `start, start + 1, start + 2, ...`.
#[derive(new, Clone, Copy, Debug)]
pub struct CountingIterator<T> {
    start: T,
}

impl<T: Numeric> InputIterator<T> for CountingIterator<T> {
    fn load(&self, index: usize) -> T {
        self.start.plus(T::from_int(index as i64))
    }
}

/// The same value at every index.
#[derive(new, Clone, Copy, Debug)]
pub struct ConstantIterator<T> {
    value: T,
}

impl<T: Element> InputIterator<T> for ConstantIterator<T> {
    fn load(&self, _index: usize) -> T {
        self.value
    }
}

/// Applies a function to the elements of another iterator.
#[derive(Debug)]
pub struct TransformIterator<I, F, S> {
    inner: I,
    func: F,
    _source: PhantomData<fn(S) -> S>,
}

impl<I: Clone, F: Clone, S> Clone for TransformIterator<I, F, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            func: self.func.clone(),
            _source: PhantomData,
        }
    }
}

impl<S, T, I, F> InputIterator<T> for TransformIterator<I, F, S>
where
    S: 'static,
    I: InputIterator<S>,
    F: Fn(S) -> T + Clone + Send + Sync + 'static,
{
    fn load(&self, index: usize) -> T {
        (self.func)(self.inner.load(index))
    }
}

/// Adapters of input iterators.
pub trait InputIteratorExt<T>: InputIterator<T> + Sized {
    /// Applies `func` to every element.
    fn transform<U, F>(self, func: F) -> TransformIterator<Self, F, T>
    where
        F: Fn(T) -> U + Clone + Send + Sync + 'static,
    {
        TransformIterator {
            inner: self,
            func,
            _source: PhantomData,
        }
    }
}

impl<T, I: InputIterator<T>> InputIteratorExt<T> for I {}

/// Loads a full tile from a non-empty `range`, repeating the last valid item past its end.
pub(crate) fn load_tile<T, I: InputIterator<T>>(
    input: &I,
    range: Range<usize>,
    tile_size: usize,
) -> Vec<T> {
    let last = range.end - 1;
    (0..tile_size)
        .map(|offset| input.load((range.start + offset).min(last)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_iterator_wraps() {
        let counting = CountingIterator::new(250u8);

        assert_eq!(counting.load(0), 250);
        assert_eq!(counting.load(5), 255);
        assert_eq!(counting.load(6), 0);
    }

    #[test]
    fn transform_applies_function() {
        let squares = CountingIterator::new(0i64).transform(|value: i64| value * value);

        assert_eq!(squares.load(7), 49);
        assert_eq!(ConstantIterator::new(3.5f32).load(1_000_000), 3.5);
    }

    #[test]
    fn partial_tiles_repeat_last_item() {
        let tile = load_tile(&CountingIterator::new(10u32), 4..7, 5);

        assert_eq!(tile, vec![14, 15, 16, 16, 16]);
    }
}
