use super::worker::{Worker, WorkerMessage};
use crate::{CubeContext, CubeCount, CubeKernel, server::ServerError};
use core::fmt::Debug;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, mpsc};

/// Dispatches the cubes of a launch to the workers.
pub(crate) struct Scheduler {
    workers: Vec<Worker>,
    plane_dim: u32,
}

impl Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Scheduler {{ workers: {} }}", self.workers.len())
    }
}

/// The state of one launch, shared by every worker executing it.
pub(crate) struct CubeJob {
    kernel: Arc<dyn CubeKernel>,
    cube_count: CubeCount,
    cube_offset: u64,
    plane_dim: u32,
    num_cubes: u64,
    next_cube: AtomicU64,
    abort: AtomicBool,
    fault: spin::Mutex<Option<String>>,
}

impl CubeJob {
    /// Claims cubes in increasing linear order until the launch is exhausted or aborted.
    ///
    /// A cube can therefore only wait on cubes that were claimed before it, which always make
    /// progress.
    pub fn run(&self, shared: &mut Vec<u128>) {
        let shared_size = self.kernel.shared_memory_size();
        let cube_dim = self.kernel.cube_dim();
        shared.resize(shared_size.div_ceil(size_of::<u128>()), 0);

        loop {
            if self.abort.load(Ordering::Acquire) {
                break;
            }
            let index = self.next_cube.fetch_add(1, Ordering::Relaxed);
            if index >= self.num_cubes {
                break;
            }

            let bytes: &mut [u8] = bytemuck::cast_slice_mut(shared.as_mut_slice());
            let mut context = CubeContext::new(
                self.cube_count.position(index),
                self.cube_count,
                cube_dim,
                self.plane_dim,
                self.cube_offset,
                &mut bytes[..shared_size],
                &self.abort,
            );

            let result = catch_unwind(AssertUnwindSafe(|| self.kernel.execute(&mut context)));
            if let Err(payload) = result {
                let reason = panic_message(payload.as_ref());
                log::trace!("Cube {index} of {} faulted: {reason}", self.kernel.name());

                let mut fault = self.fault.lock();
                if fault.is_none() {
                    *fault = Some(format!("cube {index}: {reason}"));
                }
                self.abort.store(true, Ordering::Release);
            }
        }
    }
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Scheduler {
    pub fn new(num_workers: usize, plane_dim: u32) -> Self {
        let workers = (0..num_workers.max(1)).map(Worker::new).collect();

        Self { workers, plane_dim }
    }

    /// Executes every cube of the launch, returning once all of them completed.
    pub fn execute(
        &mut self,
        kernel: Arc<dyn CubeKernel>,
        cube_count: CubeCount,
        cube_offset: u64,
    ) -> Result<(), ServerError> {
        let num_cubes = cube_count.num_cubes();
        if num_cubes == 0 {
            return Ok(());
        }

        let job = Arc::new(CubeJob {
            kernel,
            cube_count,
            cube_offset,
            plane_dim: self.plane_dim,
            num_cubes,
            next_cube: AtomicU64::new(0),
            abort: AtomicBool::new(false),
            fault: spin::Mutex::new(None),
        });

        let (send, receive) = mpsc::channel();
        let mut msg_count = 0;
        for worker in self.workers.iter().take(usize::try_from(num_cubes).unwrap_or(usize::MAX)) {
            let message = WorkerMessage {
                job: job.clone(),
                done: send.clone(),
            };
            if worker.send(message) {
                msg_count += 1;
            }
        }
        drop(send);

        if msg_count == 0 {
            return Err(ServerError::StreamUnhealthy {
                reason: "No worker is available to execute cubes".to_string(),
            });
        }
        for _ in 0..msg_count {
            if receive.recv().is_err() {
                return Err(ServerError::StreamUnhealthy {
                    reason: format!("A worker stopped while executing {}", job.kernel.name()),
                });
            }
        }

        match job.fault.lock().take() {
            Some(reason) => Err(ServerError::Execution {
                kernel: job.kernel.name().to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}
