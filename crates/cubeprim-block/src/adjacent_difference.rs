use crate::BlockLayout;

/// Applies an operator to every item of a tile and its neighbour.
///
/// The first item of every unit needs the last item of the previous unit, and the last item
/// the first of the next one; on a device they are exchanged through shared memory.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockAdjacentDifference {
    layout: BlockLayout,
}

impl BlockAdjacentDifference {
    /// `output[i] = op(input[i], input[i - 1])`.
    ///
    /// The first output is `op(input[0], predecessor)` when the tile has a predecessor,
    /// `input[0]` otherwise.
    pub fn subtract_left<T: Copy, F: Fn(T, T) -> T>(
        &self,
        input: &[T],
        output: &mut [T],
        op: F,
        tile_predecessor: Option<T>,
    ) {
        self.subtract_left_partial(input, output, op, tile_predecessor, input.len());
    }

    /// [BlockAdjacentDifference::subtract_left] over the first `valid` items, the others are
    /// copied unchanged.
    pub fn subtract_left_partial<T: Copy, F: Fn(T, T) -> T>(
        &self,
        input: &[T],
        output: &mut [T],
        op: F,
        tile_predecessor: Option<T>,
        valid: usize,
    ) {
        self.check(input, output);
        let valid = valid.min(input.len());

        for index in 0..input.len() {
            output[index] = if index >= valid {
                input[index]
            } else if index == 0 {
                match tile_predecessor {
                    Some(previous) => op(input[0], previous),
                    None => input[0],
                }
            } else {
                op(input[index], input[index - 1])
            };
        }
    }

    /// `output[i] = op(input[i], input[i + 1])`.
    ///
    /// The last output is `op(input[last], successor)` when the tile has a successor,
    /// `input[last]` otherwise.
    pub fn subtract_right<T: Copy, F: Fn(T, T) -> T>(
        &self,
        input: &[T],
        output: &mut [T],
        op: F,
        tile_successor: Option<T>,
    ) {
        self.check(input, output);
        let last = input.len() - 1;

        for index in 0..last {
            output[index] = op(input[index], input[index + 1]);
        }
        output[last] = match tile_successor {
            Some(next) => op(input[last], next),
            None => input[last],
        };
    }

    /// [BlockAdjacentDifference::subtract_right] where the tile ends after `valid` items: the
    /// last valid item is copied, the items after it are copied unchanged.
    pub fn subtract_right_partial<T: Copy, F: Fn(T, T) -> T>(
        &self,
        input: &[T],
        output: &mut [T],
        op: F,
        valid: usize,
    ) {
        self.check(input, output);
        let valid = valid.min(input.len());

        for index in 0..input.len() {
            output[index] = if index + 1 < valid {
                op(input[index], input[index + 1])
            } else {
                input[index]
            };
        }
    }

    fn check<T>(&self, input: &[T], output: &[T]) {
        assert_eq!(
            input.len(),
            self.layout.tile_size(),
            "Adjacent difference expects exactly one tile of items"
        );
        assert_eq!(input.len(), output.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> BlockAdjacentDifference {
        BlockAdjacentDifference::new(BlockLayout::new(4, 2, 4))
    }

    #[test]
    fn subtract_left_with_and_without_predecessor() {
        let input = [1.5f64, 2.0, 4.0, 4.0, 7.5, 0.0, -1.0, 2.0];
        let mut output = [0.0; 8];

        block().subtract_left(&input, &mut output, |a, b| a - b, None);
        assert_eq!(output, [1.5, 0.5, 2.0, 0.0, 3.5, -7.5, -1.0, 3.0]);

        block().subtract_left(&input, &mut output, |a, b| a - b, Some(1.0));
        assert_eq!(output[0], 0.5);
    }

    #[test]
    fn subtract_right_with_and_without_successor() {
        let input = [1i32, 3, 6, 10, 15, 21, 28, 36];
        let mut output = [0; 8];

        block().subtract_right(&input, &mut output, |a, b| b - a, None);
        assert_eq!(output, [2, 3, 4, 5, 6, 7, 8, 36]);

        block().subtract_right(&input, &mut output, |a, b| b - a, Some(45));
        assert_eq!(output[7], 9);
    }

    #[test]
    fn partial_tiles_copy_invalid_items() {
        let input = [1i32, 3, 6, 10, 15, 21, 28, 36];
        let mut output = [0; 8];

        block().subtract_right_partial(&input, &mut output, |a, b| b - a, 5);
        assert_eq!(output, [2, 3, 4, 5, 15, 21, 28, 36]);

        block().subtract_left_partial(&input, &mut output, |a, b| a - b, Some(0), 3);
        assert_eq!(output, [1, 2, 3, 10, 15, 21, 28, 36]);
    }
}
