use super::{Scheduler, Task};
use crate::{logging::ServerLogger, server::ServerError};
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};

/// The ordered execution queue of a stream, served by a dedicated thread.
#[derive(Clone, Debug)]
pub(crate) struct ExecutionQueue {
    sender: mpsc::SyncSender<QueueItem>,
    faulted: Arc<AtomicBool>,
}

enum QueueItem {
    Task(Task),
    Flush(mpsc::SyncSender<Vec<ServerError>>),
}

impl ExecutionQueue {
    pub fn new(
        name: String,
        scheduler: Arc<Mutex<Scheduler>>,
        logger: Arc<ServerLogger>,
    ) -> Self {
        let (sender, receiver) = mpsc::sync_channel(32);
        let faulted = Arc::new(AtomicBool::new(false));
        let mut server = ExecutionQueueServer {
            scheduler,
            logger,
            errors: Vec::new(),
            faulted: faulted.clone(),
        };

        std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                // Stops once every handle to the queue is dropped.
                while let Ok(item) = receiver.recv() {
                    match item {
                        QueueItem::Task(task) => server.execute_task(task),
                        QueueItem::Flush(sender) => {
                            sender.send(core::mem::take(&mut server.errors)).ok();
                            server.faulted.store(false, Ordering::Release);
                        }
                    }
                }
            })
            .map_err(|err| log::error!("Can't spawn execution queue: {err}"))
            .ok();

        Self { sender, faulted }
    }

    pub fn push(&self, task: Task) -> Result<(), ServerError> {
        self.sender
            .send(QueueItem::Task(task))
            .map_err(|_| Self::stopped())
    }

    /// Waits for every queued task and returns the errors they produced.
    pub fn flush(&self) -> Result<Vec<ServerError>, ServerError> {
        let (sender, receiver) = mpsc::sync_channel(1);
        self.sender
            .send(QueueItem::Flush(sender))
            .map_err(|_| Self::stopped())?;
        receiver.recv().map_err(|_| Self::stopped())
    }

    /// Whether a task failed since the last flush.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    fn stopped() -> ServerError {
        ServerError::StreamUnhealthy {
            reason: "The execution queue stopped".to_string(),
        }
    }
}

struct ExecutionQueueServer {
    scheduler: Arc<Mutex<Scheduler>>,
    logger: Arc<ServerLogger>,
    errors: Vec<ServerError>,
    faulted: Arc<AtomicBool>,
}

impl ExecutionQueueServer {
    fn execute_task(&mut self, task: Task) {
        // Work queued after a fault depends on a partial result, it is dropped until the error
        // is reported.
        if !self.errors.is_empty() {
            log::trace!("Skipping {task:?} on a faulted stream");
            return;
        }

        if let Err(err) = self.run(task) {
            self.errors.push(err);
            self.faulted.store(true, Ordering::Release);
        }
    }

    fn run(&mut self, task: Task) -> Result<(), ServerError> {
        match task {
            Task::Launch {
                kernel,
                cube_count,
                cube_offset,
            } => {
                let profile = self.logger.start();
                let name = kernel.name();
                let mut scheduler = self.scheduler.lock().map_err(|_| ServerError::StreamUnhealthy {
                    reason: "The scheduler was poisoned".to_string(),
                })?;
                let result = scheduler.execute(kernel, cube_count, cube_offset);
                drop(scheduler);

                self.logger
                    .register_execution(profile, name, cube_count, cube_offset);
                result
            }
            // SAFETY: tasks of a stream run one at a time, kernels on other streams must not
            // use the same memory without synchronization.
            Task::Write { data, handle } => Ok(unsafe { handle.write_bytes(&data) }?),
            Task::Copy {
                source,
                destination,
            } => Ok(unsafe { source.copy_to(&destination) }?),
        }
    }
}
