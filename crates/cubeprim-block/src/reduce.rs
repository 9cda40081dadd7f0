use crate::BlockLayout;
use cubeprim_common::BinaryOp;

/// Reduces the valid items of a tile across all the units of a cube.
///
/// Every unit reduces its items, planes combine their lanes with a tree reduction, and the
/// plane aggregates are reduced from scratch. Operands are always combined in index order.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockReduce {
    layout: BlockLayout,
}

impl BlockReduce {
    /// Number of scratch elements needed by [BlockReduce::reduce].
    pub fn scratch_len(&self) -> usize {
        self.layout.num_planes()
    }

    /// Reduce the first `valid` items, returning `None` when there is none.
    pub fn reduce<T: Copy, Op: BinaryOp<T>>(
        &self,
        items: &[T],
        valid: usize,
        scratch: &mut [T],
        op: &Op,
    ) -> Option<T> {
        let valid = valid.min(items.len());
        if valid == 0 {
            return None;
        }

        let units = self.layout.units as usize;
        let plane_dim = self.layout.plane_dim as usize;
        let mut lanes: Vec<Option<T>> = (0..units)
            .map(|unit| {
                let range = self.layout.unit_items(unit, valid);
                items[range]
                    .iter()
                    .copied()
                    .reduce(|acc, value| op.combine(acc, value))
            })
            .collect();

        // Lanes are numbered from the start of their plane, whatever the plane size.
        let mut stride = 1;
        while stride < plane_dim {
            for plane_start in (0..units).step_by(plane_dim) {
                for lane in (0..plane_dim - stride).step_by(2 * stride) {
                    let unit = plane_start + lane;
                    let partner = unit + stride;
                    if partner >= units {
                        break;
                    }
                    lanes[unit] = match (lanes[unit], lanes[partner]) {
                        (Some(lhs), Some(rhs)) => Some(op.combine(lhs, rhs)),
                        (lhs, None) => lhs,
                        (None, rhs) => rhs,
                    };
                }
            }
            stride *= 2;
        }

        // Valid items are a prefix of the tile, so are the planes holding some.
        let mut planes = 0;
        for plane in 0..self.layout.num_planes() {
            if let Some(value) = lanes[plane * plane_dim] {
                scratch[plane] = value;
                planes += 1;
            }
        }

        scratch[1..planes]
            .iter()
            .fold(scratch[0], |acc, value| op.combine(acc, *value))
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeprim_common::{Maximum, Plus};

    #[test]
    fn reduces_only_valid_items() {
        let layout = BlockLayout::new(64, 4, 32);
        let reduce = BlockReduce::new(layout);
        let items: Vec<u64> = (1..=256).collect();
        let mut scratch = vec![0; reduce.scratch_len()];

        for valid in [1, 3, 4, 5, 127, 128, 129, 255, 256] {
            let expected = (1..=valid as u64).sum::<u64>();
            assert_eq!(reduce.reduce(&items, valid, &mut scratch, &Plus), Some(expected));
        }
        assert_eq!(reduce.reduce(&items, 0, &mut scratch, &Plus), None);
    }

    #[test]
    fn planes_of_any_size() {
        for (units, plane_dim) in [(48, 24), (50, 24), (48, 48), (30, 7), (9, 3)] {
            let reduce = BlockReduce::new(BlockLayout::new(units, 2, plane_dim));
            let items = vec![1u32; 2 * units as usize];
            let mut scratch = vec![0; reduce.scratch_len()];

            for valid in [1, 13, 17, items.len()] {
                assert_eq!(
                    reduce.reduce(&items, valid, &mut scratch, &Plus),
                    Some(valid as u32),
                    "{units} units in planes of {plane_dim}"
                );
            }
        }
    }

    #[test]
    fn non_commutative_operators_keep_order() {
        let layout = BlockLayout::new(12, 1, 4);
        let reduce = BlockReduce::new(layout);
        let items: Vec<(u64, u64)> = (1..=9).chain([4, 2, 7]).map(|d| (d, 10)).collect();
        let concat = |lhs: (u64, u64), rhs: (u64, u64)| (lhs.0 * rhs.1 + rhs.0, lhs.1 * rhs.1);
        let mut scratch = vec![(0, 0); reduce.scratch_len()];

        let result = reduce.reduce(&items, 11, &mut scratch, &concat);

        assert_eq!(result.map(|value| value.0), Some(12345678942));
        assert_eq!(
            reduce.reduce(&[3i32, -1, 9, 9], 4, &mut [0; 3], &Maximum),
            Some(9)
        );
    }
}
