use core::sync::atomic::{AtomicBool, Ordering};

/// Number of units in a cube, along three dimensions.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CubeDim {
    /// Units along x.
    pub x: u32,
    /// Units along y.
    pub y: u32,
    /// Units along z.
    pub z: u32,
}

impl CubeDim {
    /// A one dimensional cube.
    pub const fn new_1d(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// Total number of units.
    pub const fn num_units(&self) -> u32 {
        self.x * self.y * self.z
    }
}

/// Number of cubes in a launch, along three dimensions.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CubeCount {
    /// Cubes along x.
    pub x: u32,
    /// Cubes along y.
    pub y: u32,
    /// Cubes along z.
    pub z: u32,
}

impl CubeCount {
    /// A one dimensional launch.
    pub const fn new_1d(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    /// Total number of cubes.
    pub const fn num_cubes(&self) -> u64 {
        (self.x as u64)
            .saturating_mul(self.y as u64)
            .saturating_mul(self.z as u64)
    }

    /// Position of the cube with the given linear index, x varying fastest.
    pub const fn position(&self, index: u64) -> CubePos {
        let x = self.x as u64;
        let xy = x * self.y as u64;

        CubePos {
            x: (index % x) as u32,
            y: ((index / x) % self.y as u64) as u32,
            z: (index / xy) as u32,
        }
    }
}

/// Position of a cube in its launch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CubePos {
    /// Position along x.
    pub x: u32,
    /// Position along y.
    pub y: u32,
    /// Position along z.
    pub z: u32,
}

/// A data parallel kernel, executed once per cube.
///
/// The runtime runs the cubes of a launch on its workers, claiming them in increasing linear
/// order. A cube executes all of its units: kernels express cooperation between units as
/// phases separated by block barriers, sharing data through [CubeContext::shared_memory].
pub trait CubeKernel: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }

    /// Number of units of every cube.
    fn cube_dim(&self) -> CubeDim;

    /// Shared memory needed by every cube, in bytes.
    fn shared_memory_size(&self) -> usize {
        0
    }

    /// Execute one cube.
    fn execute(&self, cube: &mut CubeContext<'_>);
}

/// Execution state of the cube being run.
pub struct CubeContext<'a> {
    /// Position of the cube in its launch.
    pub cube_pos: CubePos,
    /// Cube count of the launch.
    pub cube_count: CubeCount,
    /// Units of the cube.
    pub cube_dim: CubeDim,
    /// Units in a plane.
    pub plane_dim: u32,
    /// Linear index of the first cube of the launch, for kernels split over several launches.
    pub cube_offset: u64,
    shared: &'a mut [u8],
    abort: &'a AtomicBool,
}

impl<'a> CubeContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cube_pos: CubePos,
        cube_count: CubeCount,
        cube_dim: CubeDim,
        plane_dim: u32,
        cube_offset: u64,
        shared: &'a mut [u8],
        abort: &'a AtomicBool,
    ) -> Self {
        Self {
            cube_pos,
            cube_count,
            cube_dim,
            plane_dim,
            cube_offset,
            shared,
            abort,
        }
    }

    /// Linear index of the cube across every launch of the same kernel.
    pub fn cube_index(&self) -> u64 {
        let x = self.cube_count.x as u64;
        let y = self.cube_count.y as u64;

        self.cube_offset
            + self.cube_pos.x as u64
            + self.cube_pos.y as u64 * x
            + self.cube_pos.z as u64 * x * y
    }

    /// Number of units in the cube.
    pub fn num_units(&self) -> u32 {
        self.cube_dim.num_units()
    }

    /// Shared memory of the cube, 16 bytes aligned, with the size requested by the kernel.
    pub fn shared_memory(&mut self) -> &mut [u8] {
        self.shared
    }

    /// Whether another cube of the launch faulted.
    ///
    /// Cubes waiting on other cubes must poll this flag, the cube they wait on might never run.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_follow_linear_order() {
        let count = CubeCount::new(4, 3, 2);

        assert_eq!(count.num_cubes(), 24);
        assert_eq!(count.position(0), CubePos { x: 0, y: 0, z: 0 });
        assert_eq!(count.position(5), CubePos { x: 1, y: 1, z: 0 });
        assert_eq!(count.position(23), CubePos { x: 3, y: 2, z: 1 });
    }

    #[test]
    fn huge_counts_saturate() {
        assert_eq!(CubeCount::new(u32::MAX, u32::MAX, 2).num_cubes(), u64::MAX);
        assert_eq!(
            CubeCount::new(u32::MAX, u32::MAX, 1).num_cubes(),
            u32::MAX as u64 * u32::MAX as u64
        );
    }

    #[test]
    fn cube_index_adds_offset() {
        let abort = AtomicBool::new(false);
        let mut shared = [0u8; 0];
        let count = CubeCount::new(4, 3, 2);
        let context = CubeContext::new(
            count.position(17),
            count,
            CubeDim::new_1d(32),
            32,
            100,
            &mut shared,
            &abort,
        );

        assert_eq!(context.cube_index(), 117);
    }
}
