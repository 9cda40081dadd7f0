use crate::BlockLayout;

/// Ranks the digits of a tile for a stable radix scatter.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRadixRank {
    layout: BlockLayout,
    radix_bits: u32,
}

impl BlockRadixRank {
    /// Number of distinct digits.
    pub fn radix_size(&self) -> usize {
        1 << self.radix_bits
    }

    /// Computes, for each of the first `valid` digits, how many earlier digits of the tile are
    /// equal to it, and counts the occurrences of every digit into `counts`.
    pub fn rank(&self, digits: &[u32], valid: usize, ranks: &mut [u32], counts: &mut [u32]) {
        assert!(digits.len() <= self.layout.tile_size());
        assert_eq!(counts.len(), self.radix_size());
        counts.fill(0);

        // Units are visited in order, so earlier items always get lower ranks.
        for unit in 0..self.layout.units as usize {
            for index in self.layout.unit_items(unit, valid.min(digits.len())) {
                let digit = digits[index] as usize;
                ranks[index] = counts[digit];
                counts[digit] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_stable_per_digit() {
        let rank = BlockRadixRank::new(BlockLayout::new(3, 2, 4), 2);
        let digits = [3, 1, 3, 0, 1, 3];
        let mut ranks = [u32::MAX; 6];
        let mut counts = [0; 4];

        rank.rank(&digits, 5, &mut ranks, &mut counts);

        assert_eq!(&ranks[..5], &[0, 0, 1, 0, 1]);
        assert_eq!(ranks[5], u32::MAX);
        assert_eq!(counts, [1, 2, 0, 2]);
    }
}
