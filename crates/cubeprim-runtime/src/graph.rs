use crate::{compute::Task, server::LaunchError, stream::Stream};

/// Work recorded by a capturing [Stream], replayable on any stream.
///
/// Launches are checked again against the limits of the stream they are replayed on.
#[derive(Clone, Debug)]
pub struct Graph {
    tasks: Vec<Task>,
}

impl Graph {
    pub(crate) fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Number of recorded tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Submit every recorded task to `stream`, in recording order.
    ///
    /// Nothing is submitted when a launch exceeds the limits of `stream`.
    pub fn launch(&self, stream: &Stream) -> Result<(), LaunchError> {
        log::debug!("Launching a graph of {} tasks", self.tasks.len());

        for task in self.tasks.iter() {
            if let Task::Launch {
                kernel, cube_count, ..
            } = task
            {
                stream.validate_launch(kernel.as_ref(), *cube_count)?;
            }
        }

        for task in self.tasks.iter() {
            stream.submit(task.clone())?;
        }

        Ok(())
    }
}
