use crate::{
    CubeCount, CubeKernel, DeviceProperties, Graph,
    compute::{ExecutionQueue, Task},
    server::{IoError, LaunchError, ResourceLimitError, ServerError},
    storage::{DeviceSlice, Handle},
};
use cubeprim_common::Element;
use std::sync::Arc;

/// Unique identifier of a stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct StreamId {
    /// The value representing the stream.
    pub value: u64,
}

/// An ordered queue of device work.
///
/// Work submitted to a stream executes asynchronously, in submission order. Different streams
/// have no ordering guarantee between each other. While a stream is capturing, submitted work
/// is recorded into a [Graph] instead of being executed.
#[derive(Clone, Debug)]
pub struct Stream {
    state: Arc<StreamState>,
}

#[derive(Debug)]
struct StreamState {
    id: StreamId,
    queue: ExecutionQueue,
    capture: spin::Mutex<Option<Vec<Task>>>,
    properties: Arc<DeviceProperties>,
}

impl Stream {
    pub(crate) fn new(id: StreamId, queue: ExecutionQueue, properties: Arc<DeviceProperties>) -> Self {
        Self {
            state: Arc::new(StreamState {
                id,
                queue,
                capture: spin::Mutex::new(None),
                properties,
            }),
        }
    }

    /// The stream identifier.
    pub fn id(&self) -> StreamId {
        self.state.id
    }

    /// Properties of the device executing the stream.
    pub fn properties(&self) -> &DeviceProperties {
        &self.state.properties
    }

    /// Launch a kernel with the given cube count.
    pub fn launch<K: CubeKernel>(&self, kernel: K, cube_count: CubeCount) -> Result<(), LaunchError> {
        self.launch_with_offset(kernel, cube_count, 0)
    }

    /// Launch a kernel whose cubes are numbered starting at `cube_offset`.
    ///
    /// Used to split a kernel over several launches when its cube count exceeds the device
    /// limits, see [crate::CubeContext::cube_index].
    pub fn launch_with_offset<K: CubeKernel>(
        &self,
        kernel: K,
        cube_count: CubeCount,
        cube_offset: u64,
    ) -> Result<(), LaunchError> {
        self.validate_launch(&kernel, cube_count)?;

        if cube_count.num_cubes() == 0 {
            log::trace!("Skipping empty launch of {}", kernel.name());
            return Ok(());
        }

        log::trace!(
            "Launching {} on stream {} with {cube_count:?} at offset {cube_offset}",
            kernel.name(),
            self.state.id.value
        );
        self.submit(Task::Launch {
            kernel: Arc::new(kernel),
            cube_count,
            cube_offset,
        })
    }

    /// Copy `data` to the start of `handle` once the previously submitted work completed.
    pub fn write(&self, handle: &Handle, data: &[u8]) -> Result<(), LaunchError> {
        if data.len() > handle.size() {
            return Err(IoError::OutOfBounds {
                offset: 0,
                end: data.len(),
                size: handle.size(),
            }
            .into());
        }

        self.submit(Task::Write {
            data: Arc::from(data),
            handle: handle.clone(),
        })
    }

    /// Copy elements to the start of `slice` once the previously submitted work completed.
    pub fn write_slice<T: Element>(&self, slice: &DeviceSlice<T>, data: &[T]) -> Result<(), LaunchError> {
        self.write(&slice.handle(), bytemuck::cast_slice(data))
    }

    /// Copy `source` to the start of `destination` once the previously submitted work completed.
    pub fn copy(&self, source: &Handle, destination: &Handle) -> Result<(), LaunchError> {
        if source.size() > destination.size() {
            return Err(IoError::OutOfBounds {
                offset: 0,
                end: source.size(),
                size: destination.size(),
            }
            .into());
        }

        self.submit(Task::Copy {
            source: source.clone(),
            destination: destination.clone(),
        })
    }

    /// Wait for all submitted work, returning the first execution error since the last
    /// synchronization.
    ///
    /// Once the error is reported, the stream accepts work again.
    pub fn sync(&self) -> Result<(), ServerError> {
        if self.is_capturing() {
            return Err(ServerError::Capture {
                reason: "Can't synchronize a stream while it is capturing".to_string(),
            });
        }

        let errors = self.state.queue.flush()?;
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Synchronize and read the content of a handle.
    pub fn read(&self, handle: &Handle) -> Result<Vec<u8>, ServerError> {
        self.sync()?;
        // SAFETY: the stream is idle; work on other streams must be synchronized by the caller.
        Ok(unsafe { handle.read_bytes() })
    }

    /// Synchronize and read the elements of a slice.
    pub fn read_slice<T: Element>(&self, slice: &DeviceSlice<T>) -> Result<Vec<T>, ServerError> {
        let bytes = self.read(&slice.handle())?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Start recording submitted work into a graph instead of executing it.
    pub fn begin_capture(&self) -> Result<(), ServerError> {
        let mut capture = self.state.capture.lock();
        if capture.is_some() {
            return Err(ServerError::Capture {
                reason: "The stream is already capturing".to_string(),
            });
        }

        log::debug!("Stream {} begins capture", self.state.id.value);
        *capture = Some(Vec::new());
        Ok(())
    }

    /// Stop recording and return the recorded graph.
    pub fn end_capture(&self) -> Result<Graph, ServerError> {
        let tasks = self
            .state
            .capture
            .lock()
            .take()
            .ok_or_else(|| ServerError::Capture {
                reason: "The stream isn't capturing".to_string(),
            })?;

        log::debug!(
            "Stream {} captured a graph of {} tasks",
            self.state.id.value,
            tasks.len()
        );
        Ok(Graph::new(tasks))
    }

    /// Whether submitted work is currently being recorded.
    pub fn is_capturing(&self) -> bool {
        self.state.capture.lock().is_some()
    }

    /// Check a launch against the limits of the device executing the stream.
    pub(crate) fn validate_launch(
        &self,
        kernel: &dyn CubeKernel,
        cube_count: CubeCount,
    ) -> Result<(), LaunchError> {
        let properties = &self.state.properties;

        let units = kernel.cube_dim().num_units();
        if units == 0 || units > properties.max_units_per_cube {
            return Err(ResourceLimitError::Units {
                requested: units,
                max: properties.max_units_per_cube,
            }
            .into());
        }

        let shared = kernel.shared_memory_size();
        if shared > properties.max_shared_memory_size {
            return Err(ResourceLimitError::SharedMemory {
                requested: shared,
                max: properties.max_shared_memory_size,
            }
            .into());
        }

        let max = properties.max_cube_count;
        if cube_count.x > max.0 || cube_count.y > max.1 || cube_count.z > max.2 {
            return Err(LaunchError::CubeCount {
                requested: (cube_count.x, cube_count.y, cube_count.z),
                max,
            });
        }

        Ok(())
    }

    pub(crate) fn submit(&self, task: Task) -> Result<(), LaunchError> {
        let mut capture = self.state.capture.lock();
        if let Some(tasks) = capture.as_mut() {
            tasks.push(task);
            return Ok(());
        }
        drop(capture);

        if self.state.queue.is_faulted() {
            return Err(LaunchError::StreamUnhealthy {
                reason: "A previous task failed, synchronize the stream to get its error"
                    .to_string(),
            });
        }

        self.state
            .queue
            .push(task)
            .map_err(|err| LaunchError::StreamUnhealthy {
                reason: err.to_string(),
            })
    }
}
