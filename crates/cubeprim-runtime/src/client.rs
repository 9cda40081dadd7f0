use crate::{
    CubeCount,
    compute::{ExecutionQueue, Scheduler},
    config::{GlobalConfig, device::DeviceConfig},
    logging::ServerLogger,
    storage::{DeviceSlice, Handle},
    stream::{Stream, StreamId},
};
use core::sync::atomic::{AtomicU64, Ordering};
use cubeprim_common::Element;
use std::sync::{Arc, Mutex};

/// Limits and resources of a compute device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Number of units in a plane.
    pub plane_dim: u32,
    /// Maximum number of units in a cube.
    pub max_units_per_cube: u32,
    /// Maximum shared memory per cube, in bytes.
    pub max_shared_memory_size: usize,
    /// Maximum cube count along each dimension of a launch.
    pub max_cube_count: (u32, u32, u32),
    /// Number of worker threads.
    pub num_workers: usize,
}

impl DeviceProperties {
    /// Resolve the properties described by a configuration.
    pub fn from_config(config: &DeviceConfig) -> Self {
        let num_workers = config.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|value| value.get())
                .unwrap_or(1)
        });

        Self {
            plane_dim: config.plane_dim.max(1),
            max_units_per_cube: config.max_units_per_cube,
            max_shared_memory_size: config.max_shared_memory_size,
            max_cube_count: config.max_cube_count,
            num_workers: num_workers.max(1),
        }
    }

    /// Maximum number of cubes in a single launch.
    pub fn max_cubes_per_launch(&self) -> u64 {
        let (x, y, z) = self.max_cube_count;
        CubeCount::new(x, y, z).num_cubes()
    }
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self::from_config(&DeviceConfig::default())
    }
}

/// Entry point to a compute device: allocates memory and creates streams.
///
/// Clients are cheap to clone. Worker threads stop once the client and every stream it created
/// are dropped.
#[derive(Clone, Debug)]
pub struct ComputeClient {
    state: Arc<ClientState>,
}

#[derive(Debug)]
struct ClientState {
    properties: Arc<DeviceProperties>,
    scheduler: Arc<Mutex<Scheduler>>,
    logger: Arc<ServerLogger>,
    default_stream: Stream,
    stream_count: AtomicU64,
}

impl Default for ComputeClient {
    fn default() -> Self {
        Self::from_config(GlobalConfig::get())
    }
}

impl ComputeClient {
    /// Create a client for a device with the given properties.
    pub fn new(properties: DeviceProperties) -> Self {
        Self::with_logger(properties, Arc::new(ServerLogger::default()))
    }

    /// Create a client from a configuration.
    pub fn from_config(config: Arc<GlobalConfig>) -> Self {
        let properties = DeviceProperties::from_config(&config.device);
        Self::with_logger(properties, Arc::new(ServerLogger::new(config)))
    }

    /// Create a client logging its executions with `logger`.
    pub fn with_logger(properties: DeviceProperties, logger: Arc<ServerLogger>) -> Self {
        log::debug!("Creating compute client with {properties:?}");

        let properties = Arc::new(properties);
        let scheduler = Arc::new(Mutex::new(Scheduler::new(
            properties.num_workers,
            properties.plane_dim,
        )));
        let default_stream = Self::new_stream(0, &properties, &scheduler, &logger);

        Self {
            state: Arc::new(ClientState {
                properties,
                scheduler,
                logger,
                default_stream,
                stream_count: AtomicU64::new(1),
            }),
        }
    }

    fn new_stream(
        id: u64,
        properties: &Arc<DeviceProperties>,
        scheduler: &Arc<Mutex<Scheduler>>,
        logger: &Arc<ServerLogger>,
    ) -> Stream {
        let queue = ExecutionQueue::new(
            format!("cubeprim-stream-{id}"),
            scheduler.clone(),
            logger.clone(),
        );
        Stream::new(StreamId { value: id }, queue, properties.clone())
    }

    /// Properties of the device.
    pub fn properties(&self) -> &DeviceProperties {
        &self.state.properties
    }

    /// The stream used when no other stream is specified.
    pub fn default_stream(&self) -> Stream {
        self.state.default_stream.clone()
    }

    /// Create a new stream, independent from every other stream.
    pub fn create_stream(&self) -> Stream {
        let id = self.state.stream_count.fetch_add(1, Ordering::Relaxed);
        Self::new_stream(
            id,
            &self.state.properties,
            &self.state.scheduler,
            &self.state.logger,
        )
    }

    /// Allocate `size` zeroed bytes.
    pub fn empty(&self, size: usize) -> Handle {
        Handle::alloc(size)
    }

    /// Allocate a buffer holding `data`.
    pub fn create(&self, data: &[u8]) -> Handle {
        let handle = Handle::alloc(data.len());
        // SAFETY: the allocation was just created, no kernel can access it.
        if let Err(err) = unsafe { handle.write_bytes(data) } {
            log::error!("Fresh allocation is too small: {err}");
        }
        handle
    }

    /// Allocate `len` zeroed elements.
    pub fn empty_slice<T: Element>(&self, len: usize) -> DeviceSlice<T> {
        Handle::alloc_slice(len)
    }

    /// Allocate a buffer holding `data`.
    pub fn create_slice<T: Element>(&self, data: &[T]) -> DeviceSlice<T> {
        let slice = Handle::alloc_slice(data.len());
        for (index, value) in data.iter().enumerate() {
            // SAFETY: the allocation was just created, no kernel can access it.
            unsafe { slice.write(index, *value) };
        }
        slice
    }
}
