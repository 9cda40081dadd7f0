use cubeprim_runtime::{ComputeClient, CubeContext, CubeDim, CubeKernel, DeviceProperties, DeviceSlice};

pub fn test_client() -> ComputeClient {
    ComputeClient::new(DeviceProperties {
        num_workers: 4,
        ..Default::default()
    })
}

/// Adds two buffers, one unit per element.
pub struct DummyElementwiseAddition {
    pub lhs: DeviceSlice<u32>,
    pub rhs: DeviceSlice<u32>,
    pub out: DeviceSlice<u32>,
}

impl CubeKernel for DummyElementwiseAddition {
    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(32)
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let base = cube.cube_index() as usize * 32;
        for unit in 0..32 {
            let index = base + unit;
            if index < self.out.len() {
                unsafe {
                    self.out
                        .write(index, self.lhs.read(index) + self.rhs.read(index));
                }
            }
        }
    }
}

/// Writes the linear cube index of every cube.
pub struct DummyCubeIndex {
    pub out: DeviceSlice<u64>,
}

impl CubeKernel for DummyCubeIndex {
    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(1)
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let index = cube.cube_index();
        unsafe { self.out.write(index as usize, index + 1) };
    }
}

/// Reverses a buffer through shared memory, one cube per buffer.
pub struct DummySharedReverse {
    pub data: DeviceSlice<u32>,
}

impl CubeKernel for DummySharedReverse {
    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.data.len() as u32)
    }

    fn shared_memory_size(&self) -> usize {
        self.data.len() * size_of::<u32>()
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        let len = self.data.len();
        let shared: &mut [u32] = bytemuck::cast_slice_mut(cube.shared_memory());
        for unit in 0..len {
            shared[unit] = unsafe { self.data.read(unit) };
        }
        for unit in 0..len {
            unsafe { self.data.write(unit, shared[len - 1 - unit]) };
        }
    }
}

/// Panics in the given cube.
pub struct DummyFault {
    pub faulty_cube: u64,
}

impl CubeKernel for DummyFault {
    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(1)
    }

    fn execute(&self, cube: &mut CubeContext<'_>) {
        if cube.cube_index() == self.faulty_cube {
            panic!("dummy fault");
        }
    }
}

/// Requests more resources than a device can provide.
pub struct DummyOversized {
    pub units: u32,
    pub shared: usize,
}

impl CubeKernel for DummyOversized {
    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(self.units)
    }

    fn shared_memory_size(&self) -> usize {
        self.shared
    }

    fn execute(&self, _cube: &mut CubeContext<'_>) {}
}
