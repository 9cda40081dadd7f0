mod queue;
mod scheduler;
mod task;
mod worker;

pub(crate) use queue::*;
pub(crate) use scheduler::*;
pub(crate) use task::*;
