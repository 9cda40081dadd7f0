use core::ops::Range;
use cubeprim_common::CompareOp;

/// The run an item of a merge comes from, with its index in that run's storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeSource {
    /// Taken from the left run.
    Left(usize),
    /// Taken from the right run.
    Right(usize),
}

/// Splits the stable merge of two sorted runs along a diagonal.
///
/// Returns how many of the first `diag` merged items come from the left run. Ties are taken
/// from the left run first, which keeps merges stable. `left` and `right` load items by their
/// position in each run.
pub fn merge_path<K, C: CompareOp<K>>(
    diag: usize,
    left_len: usize,
    right_len: usize,
    left: impl Fn(usize) -> K,
    right: impl Fn(usize) -> K,
    cmp: &C,
) -> usize {
    let mut begin = diag.saturating_sub(right_len);
    let mut end = diag.min(left_len);

    while begin < end {
        let mid = begin + (end - begin) / 2;
        if cmp.less(&right(diag - 1 - mid), &left(mid)) {
            end = mid;
        } else {
            begin = mid + 1;
        }
    }

    begin
}

/// Sequentially merges up to `count` items from the two ranges, calling `emit` with the position
/// in the output and the source of every merged item.
pub fn serial_merge<K, C: CompareOp<K>>(
    mut left_range: Range<usize>,
    mut right_range: Range<usize>,
    count: usize,
    left: impl Fn(usize) -> K,
    right: impl Fn(usize) -> K,
    cmp: &C,
    mut emit: impl FnMut(usize, MergeSource),
) {
    for position in 0..count {
        let take_left = match (left_range.is_empty(), right_range.is_empty()) {
            (true, true) => return,
            (false, true) => true,
            (true, false) => false,
            (false, false) => !cmp.less(&right(right_range.start), &left(left_range.start)),
        };

        if take_left {
            emit(position, MergeSource::Left(left_range.start));
            left_range.start += 1;
        } else {
            emit(position, MergeSource::Right(right_range.start));
            right_range.start += 1;
        }
    }
}
