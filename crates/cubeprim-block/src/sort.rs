use crate::{BlockLayout, MergeSource, merge_path, serial_merge};
use cubeprim_common::CompareOp;

/// Stable sort of the valid items of a tile.
///
/// Every unit sorts its own items, then the sorted runs are merged pairwise, doubling the run
/// length each round. In every round each unit produces `items_per_unit` outputs of the merge
/// of its pair of runs, finding its inputs with a merge path search.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockMergeSort {
    layout: BlockLayout,
}

impl BlockMergeSort {
    /// Number of scratch elements needed for the keys, and for the values when sorting pairs.
    pub fn scratch_len(&self) -> usize {
        self.layout.tile_size()
    }

    /// Sort the first `valid` keys.
    pub fn sort_keys<K: Copy, C: CompareOp<K>>(
        &self,
        keys: &mut [K],
        valid: usize,
        scratch: &mut [K],
        cmp: &C,
    ) {
        self.sort::<K, (), C>(keys, None, valid, scratch, None, cmp);
    }

    /// Sort the first `valid` keys, permuting the values identically.
    pub fn sort_pairs<K: Copy, V: Copy, C: CompareOp<K>>(
        &self,
        keys: &mut [K],
        values: &mut [V],
        valid: usize,
        key_scratch: &mut [K],
        value_scratch: &mut [V],
        cmp: &C,
    ) {
        self.sort(
            keys,
            Some(values),
            valid,
            key_scratch,
            Some(value_scratch),
            cmp,
        );
    }

    fn sort<K: Copy, V: Copy, C: CompareOp<K>>(
        &self,
        keys: &mut [K],
        mut values: Option<&mut [V]>,
        valid: usize,
        key_scratch: &mut [K],
        mut value_scratch: Option<&mut [V]>,
        cmp: &C,
    ) {
        let valid = valid.min(keys.len());
        let ipt = self.layout.items_per_unit as usize;
        let units = self.layout.units as usize;

        for unit in 0..units {
            let range = self.layout.unit_items(unit, valid);
            for index in range.start + 1..range.end {
                let mut current = index;
                while current > range.start && cmp.less(&keys[current], &keys[current - 1]) {
                    keys.swap(current, current - 1);
                    if let Some(values) = values.as_deref_mut() {
                        values.swap(current, current - 1);
                    }
                    current -= 1;
                }
            }
        }

        let mut run = ipt;
        while run < valid {
            for unit in 0..units {
                let output = self.layout.unit_items(unit, valid);
                if output.is_empty() {
                    break;
                }

                let pair_start = output.start / (2 * run) * (2 * run);
                let left = pair_start..(pair_start + run).min(valid);
                let right = left.end..(left.end + run).min(valid);
                let diag = output.start - pair_start;

                let split = merge_path(
                    diag,
                    left.len(),
                    right.len(),
                    |i| keys[left.start + i],
                    |i| keys[right.start + i],
                    cmp,
                );
                serial_merge(
                    left.start + split..left.end,
                    right.start + diag - split..right.end,
                    output.len(),
                    |i| keys[i],
                    |i| keys[i],
                    cmp,
                    |position, source| {
                        let index = match source {
                            MergeSource::Left(index) | MergeSource::Right(index) => index,
                        };
                        key_scratch[output.start + position] = keys[index];
                        if let (Some(values), Some(scratch)) =
                            (values.as_deref(), value_scratch.as_deref_mut())
                        {
                            scratch[output.start + position] = values[index];
                        }
                    },
                );
            }

            // Block barrier, then the merged runs replace the previous ones.
            keys[..valid].copy_from_slice(&key_scratch[..valid]);
            if let (Some(values), Some(scratch)) = (values.as_deref_mut(), value_scratch.as_deref())
            {
                values[..valid].copy_from_slice(&scratch[..valid]);
            }
            run *= 2;
        }
    }
}
