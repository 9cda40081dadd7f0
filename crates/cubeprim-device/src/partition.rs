use core::ops::Range;
use cubeprim_runtime::{CubeCount, DeviceProperties};

/// One launch of a partitioned kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileLaunch {
    /// Cube count of the launch.
    pub cube_count: CubeCount,
    /// Linear index of the first cube of the launch.
    pub cube_offset: u64,
}

/// Maps tiles onto cubes, within the cube count limits of a device.
///
/// Tile indices are folded across the x, y and z dimensions of the cube count. When the tiles
/// don't fit a single launch, they are split over several launches, each one numbering its cubes
/// after the previous ones. In every case the cube with linear index `i` handles tile `i`; the
/// last launch may have a few extra cubes, which must check the tile count and exit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilePartition {
    num_tiles: u64,
    launches: Vec<TileLaunch>,
}

impl TilePartition {
    /// Partition `num_items` items into tiles of `tile_size` items.
    pub fn new(num_items: usize, tile_size: usize, properties: &DeviceProperties) -> Self {
        Self::from_tiles(num_items.div_ceil(tile_size.max(1)) as u64, properties)
    }

    /// Partition `num_tiles` tiles.
    pub fn from_tiles(num_tiles: u64, properties: &DeviceProperties) -> Self {
        let per_launch = properties.max_cubes_per_launch().max(1);
        let mut launches = Vec::new();
        let mut offset = 0;

        while offset < num_tiles {
            let cubes = per_launch.min(num_tiles - offset);
            launches.push(TileLaunch {
                cube_count: fold(cubes, properties.max_cube_count),
                cube_offset: offset,
            });
            offset += cubes;
        }

        if launches.len() > 1 {
            log::debug!(
                "{num_tiles} tiles exceed the {per_launch} cubes of a launch, splitting in {} launches",
                launches.len()
            );
        }

        Self {
            num_tiles,
            launches,
        }
    }

    /// Number of tiles.
    pub fn num_tiles(&self) -> u64 {
        self.num_tiles
    }

    /// Launches covering every tile, in order.
    pub fn launches(&self) -> &[TileLaunch] {
        &self.launches
    }

    /// Total number of cubes launched, including the extra cubes of the last launch.
    pub fn num_cubes(&self) -> u64 {
        self.launches
            .iter()
            .map(|launch| launch.cube_count.num_cubes())
            .sum()
    }
}

/// Range of the items of `tile`, the last tile being possibly partial.
pub fn tile_range(tile: u64, tile_size: usize, num_items: usize) -> Range<usize> {
    let start = (tile as usize).saturating_mul(tile_size).min(num_items);
    let end = start.saturating_add(tile_size).min(num_items);

    start..end
}

/// Smallest cube count with at least `cubes` cubes within `max`, filling x first.
fn fold(cubes: u64, max: (u32, u32, u32)) -> CubeCount {
    let max_x = max.0.max(1) as u64;
    let max_y = max.1.max(1) as u64;

    if cubes <= max_x {
        return CubeCount::new_1d(cubes as u32);
    }

    let y = cubes.div_ceil(max_x);
    if y <= max_y {
        return CubeCount::new(max_x as u32, y as u32, 1);
    }

    let z = cubes.div_ceil(max_x * max_y);
    CubeCount::new(max_x as u32, max_y as u32, z as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(max_cube_count: (u32, u32, u32)) -> DeviceProperties {
        DeviceProperties {
            max_cube_count,
            ..Default::default()
        }
    }

    #[test]
    fn small_partition_is_one_dimensional() {
        let partition = TilePartition::new(257, 256, &properties((1024, 8, 8)));

        assert_eq!(partition.num_tiles(), 2);
        assert_eq!(
            partition.launches(),
            &[TileLaunch {
                cube_count: CubeCount::new_1d(2),
                cube_offset: 0
            }]
        );
    }

    #[test]
    fn tiles_are_folded_over_dimensions() {
        let partition = TilePartition::from_tiles(10, &properties((4, 2, 8)));

        assert_eq!(partition.launches().len(), 1);
        assert_eq!(partition.launches()[0].cube_count, CubeCount::new(4, 2, 2));
        assert!(partition.num_cubes() >= 10);

        let partition = TilePartition::from_tiles(7, &properties((4, 2, 8)));
        assert_eq!(partition.launches()[0].cube_count, CubeCount::new(4, 2, 1));
    }

    #[test]
    fn large_partitions_are_split_in_launches() {
        let partition = TilePartition::from_tiles(20, &properties((2, 2, 2)));
        let launches = partition.launches();

        assert_eq!(launches.len(), 3);
        assert_eq!(launches[0].cube_count, CubeCount::new(2, 2, 2));
        assert_eq!(launches[1].cube_offset, 8);
        assert_eq!(launches[2].cube_offset, 16);
        assert_eq!(launches[2].cube_count, CubeCount::new(2, 2, 1));
    }

    #[test]
    fn empty_partition_has_no_launch() {
        let partition = TilePartition::new(0, 256, &DeviceProperties::default());

        assert_eq!(partition.num_tiles(), 0);
        assert!(partition.launches().is_empty());
    }

    #[test]
    fn tile_ranges_are_clipped() {
        assert_eq!(tile_range(0, 256, 257), 0..256);
        assert_eq!(tile_range(1, 256, 257), 256..257);
        assert_eq!(tile_range(2, 256, 257), 257..257);
    }
}
