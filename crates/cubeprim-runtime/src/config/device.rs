/// Limits and execution resources of the compute device.
///
/// Launches are folded and split against the cube count limit. Lowering it exercises the large
/// index paths on small inputs.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Number of worker threads executing cubes. Defaults to the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Number of units in a plane.
    pub plane_dim: u32,

    /// Maximum number of units in a single cube.
    pub max_units_per_cube: u32,

    /// Maximum shared memory a single cube can request, in bytes.
    pub max_shared_memory_size: usize,

    /// Maximum cube count along each dimension of a single launch.
    pub max_cube_count: (u32, u32, u32),
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            workers: None,
            plane_dim: 32,
            max_units_per_cube: 1024,
            max_shared_memory_size: 64 * 1024,
            max_cube_count: (i32::MAX as u32, u16::MAX as u32, u16::MAX as u32),
        }
    }
}
