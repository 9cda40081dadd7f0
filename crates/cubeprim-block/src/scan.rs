use crate::{BlockLayout, SharedLayout};
use cubeprim_common::BinaryOp;

/// How the units of a cube cooperate to scan their aggregates.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum BlockScanAlgorithm {
    /// Scan inside every plane, then scan the plane aggregates.
    #[default]
    #[serde(rename = "warp_scan")]
    WarpScan,
    /// Store every unit aggregate in shared memory and let the first plane scan them.
    #[serde(rename = "reduce_then_scan")]
    ReduceThenScan,
}

/// Scans the aggregates of the units of a cube.
///
/// Implementations only differ in how units communicate; for an associative operator they
/// produce identical results, always combining in increasing unit order.
pub trait UnitScan {
    /// Number of scratch elements the strategy needs.
    fn scratch_len(&self, layout: &BlockLayout) -> usize;

    /// Writes the exclusive prefix of every unit into `prefixes`, `None` for the first unit, and
    /// returns the aggregate of all units.
    fn scan_units<T: Copy, Op: BinaryOp<T>>(
        &self,
        layout: &BlockLayout,
        aggregates: &[T],
        prefixes: &mut [Option<T>],
        scratch: &mut [T],
        op: &Op,
    ) -> T;
}

/// Kogge-Stone scan of the unit aggregates of every plane, followed by a scan of the plane
/// aggregates stored in scratch.
#[derive(Clone, Copy, Debug, Default)]
pub struct WarpScan;

/// Unit aggregates go through shared memory, where the first plane scans them in chunks.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReduceThenScan;

/// Inclusive Kogge-Stone scan of every `width` wide segment of `values`.
///
/// Every step reads the values of the previous step, like a plane shuffle would.
fn plane_inclusive_scan<T: Copy, Op: BinaryOp<T>>(values: &mut [T], width: usize, op: &Op) {
    let mut offset = 1;
    while offset < width {
        let previous = values.to_vec();
        for (unit, value) in values.iter_mut().enumerate() {
            if unit % width >= offset {
                *value = op.combine(previous[unit - offset], previous[unit]);
            }
        }
        offset *= 2;
    }
}

fn combine_prefix<T: Copy, Op: BinaryOp<T>>(lhs: Option<T>, rhs: Option<T>, op: &Op) -> Option<T> {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => Some(op.combine(lhs, rhs)),
        (lhs, None) => lhs,
        (None, rhs) => rhs,
    }
}

impl UnitScan for WarpScan {
    fn scratch_len(&self, layout: &BlockLayout) -> usize {
        layout.num_planes()
    }

    fn scan_units<T: Copy, Op: BinaryOp<T>>(
        &self,
        layout: &BlockLayout,
        aggregates: &[T],
        prefixes: &mut [Option<T>],
        scratch: &mut [T],
        op: &Op,
    ) -> T {
        let plane_dim = layout.plane_dim as usize;
        let num_planes = layout.num_planes();
        let units = aggregates.len();

        let mut lanes = aggregates.to_vec();
        plane_inclusive_scan(&mut lanes, plane_dim, op);

        // The last lane of every plane publishes the plane aggregate.
        for plane in 0..num_planes {
            let last = ((plane + 1) * plane_dim).min(units) - 1;
            scratch[plane] = lanes[last];
        }
        // Block barrier, then the first plane scans the plane aggregates.
        plane_inclusive_scan(&mut scratch[..num_planes], num_planes, op);

        for (unit, prefix) in prefixes.iter_mut().enumerate() {
            let plane = unit / plane_dim;
            let plane_prefix = (plane > 0).then(|| scratch[plane - 1]);
            let lane_prefix = (unit % plane_dim > 0).then(|| lanes[unit - 1]);

            *prefix = combine_prefix(plane_prefix, lane_prefix, op);
        }

        scratch[num_planes - 1]
    }
}

impl UnitScan for ReduceThenScan {
    fn scratch_len(&self, layout: &BlockLayout) -> usize {
        layout.units as usize
    }

    fn scan_units<T: Copy, Op: BinaryOp<T>>(
        &self,
        layout: &BlockLayout,
        aggregates: &[T],
        prefixes: &mut [Option<T>],
        scratch: &mut [T],
        op: &Op,
    ) -> T {
        let units = aggregates.len();
        let plane_dim = layout.plane_dim as usize;
        let chunk = units.div_ceil(plane_dim);
        let scratch = &mut scratch[..units];
        scratch.copy_from_slice(aggregates);

        // Block barrier, then every lane of the first plane scans its chunk serially.
        let lanes = units.div_ceil(chunk);
        let mut totals = Vec::with_capacity(lanes);
        for values in scratch.chunks_mut(chunk) {
            for index in 1..values.len() {
                values[index] = op.combine(values[index - 1], values[index]);
            }
            totals.push(values[values.len() - 1]);
        }

        plane_inclusive_scan(&mut totals, plane_dim, op);
        for (lane, values) in scratch.chunks_mut(chunk).enumerate().skip(1) {
            let prefix = totals[lane - 1];
            for value in values.iter_mut() {
                *value = op.combine(prefix, *value);
            }
        }

        // Block barrier, then every unit reads the scan of the units before it.
        for (unit, prefix) in prefixes.iter_mut().enumerate() {
            *prefix = (unit > 0).then(|| scratch[unit - 1]);
        }

        scratch[units - 1]
    }
}

/// Scans the items of a tile across all the units of a cube.
///
/// The strategy is picked when the scan is created. Both strategies first reduce the items of
/// every unit, scan the unit aggregates cooperatively, and finally let every unit scan its own
/// items seeded with its prefix.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockScan {
    layout: BlockLayout,
    algorithm: BlockScanAlgorithm,
}

impl BlockScan {
    /// Layout of the scanned tile.
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// The strategy used to scan unit aggregates.
    pub fn algorithm(&self) -> BlockScanAlgorithm {
        self.algorithm
    }

    /// Number of scratch elements needed by [BlockScan::inclusive_scan] and
    /// [BlockScan::exclusive_scan].
    pub fn scratch_len(&self) -> usize {
        match self.algorithm {
            BlockScanAlgorithm::WarpScan => WarpScan.scratch_len(&self.layout),
            BlockScanAlgorithm::ReduceThenScan => ReduceThenScan.scratch_len(&self.layout),
        }
    }

    /// Bytes of shared memory a kernel must declare to scan elements of type `T`.
    pub fn storage_size<T: bytemuck::Pod>(&self) -> usize {
        let mut layout = SharedLayout::new();
        layout.push::<T>(self.scratch_len());
        layout.size()
    }

    /// Inclusive scan of `items` in place, returning the aggregate of the tile.
    ///
    /// # Panics
    ///
    /// If `items` doesn't hold exactly one tile or `scratch` is too small.
    pub fn inclusive_scan<T: Copy, Op: BinaryOp<T>>(
        &self,
        items: &mut [T],
        scratch: &mut [T],
        op: &Op,
    ) -> T {
        let (prefixes, aggregate) = self.unit_prefixes(items, scratch, op);
        let ipt = self.layout.items_per_unit as usize;

        for (values, prefix) in items.chunks_mut(ipt).zip(prefixes) {
            let mut running = prefix;
            for value in values.iter_mut() {
                let scanned = match running {
                    Some(running) => op.combine(running, *value),
                    None => *value,
                };
                *value = scanned;
                running = Some(scanned);
            }
        }

        aggregate
    }

    /// Exclusive scan of `items` in place seeded with `init`, returning the aggregate of the tile
    /// without `init`.
    ///
    /// # Panics
    ///
    /// If `items` doesn't hold exactly one tile or `scratch` is too small.
    pub fn exclusive_scan<T: Copy, Op: BinaryOp<T>>(
        &self,
        items: &mut [T],
        init: T,
        scratch: &mut [T],
        op: &Op,
    ) -> T {
        let (prefixes, aggregate) = self.unit_prefixes(items, scratch, op);
        let ipt = self.layout.items_per_unit as usize;

        for (values, prefix) in items.chunks_mut(ipt).zip(prefixes) {
            let mut running = match prefix {
                Some(prefix) => op.combine(init, prefix),
                None => init,
            };
            for value in values.iter_mut() {
                let next = op.combine(running, *value);
                *value = running;
                running = next;
            }
        }

        aggregate
    }

    fn unit_prefixes<T: Copy, Op: BinaryOp<T>>(
        &self,
        items: &[T],
        scratch: &mut [T],
        op: &Op,
    ) -> (Vec<Option<T>>, T) {
        assert_eq!(
            items.len(),
            self.layout.tile_size(),
            "Block scan expects exactly one tile of items"
        );
        assert!(
            scratch.len() >= self.scratch_len(),
            "Block scan scratch too small: {} < {}",
            scratch.len(),
            self.scratch_len()
        );

        let aggregates: Vec<T> = items
            .chunks(self.layout.items_per_unit as usize)
            .map(|values| {
                values[1..]
                    .iter()
                    .fold(values[0], |acc, value| op.combine(acc, *value))
            })
            .collect();
        let mut prefixes = vec![None; aggregates.len()];

        let aggregate = match self.algorithm {
            BlockScanAlgorithm::WarpScan => {
                WarpScan.scan_units(&self.layout, &aggregates, &mut prefixes, scratch, op)
            }
            BlockScanAlgorithm::ReduceThenScan => {
                ReduceThenScan.scan_units(&self.layout, &aggregates, &mut prefixes, scratch, op)
            }
        };

        (prefixes, aggregate)
    }
}
