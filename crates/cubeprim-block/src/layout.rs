/// How the items of a tile are distributed over the units of a cube.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockLayout {
    /// Units in the cube.
    pub units: u32,
    /// Items owned by every unit.
    pub items_per_unit: u32,
    /// Units in a plane.
    pub plane_dim: u32,
}

impl BlockLayout {
    /// Number of items in a full tile.
    pub fn tile_size(&self) -> usize {
        self.units as usize * self.items_per_unit as usize
    }

    /// Number of planes in the cube, the last one possibly partial.
    pub fn num_planes(&self) -> usize {
        (self.units as usize).div_ceil(self.plane_dim as usize)
    }

    /// Range of items owned by `unit`, clipped to the `valid` first items of the tile.
    pub fn unit_items(&self, unit: usize, valid: usize) -> core::ops::Range<usize> {
        let ipt = self.items_per_unit as usize;
        let start = (unit * ipt).min(valid);
        let end = ((unit + 1) * ipt).min(valid);

        start..end
    }
}
