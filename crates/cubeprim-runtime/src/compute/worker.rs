use super::scheduler::CubeJob;
use std::sync::{Arc, mpsc};
use std::thread;

pub(crate) struct WorkerMessage {
    pub job: Arc<CubeJob>,
    pub done: mpsc::Sender<()>,
}

/// A thread executing the cubes of the jobs it receives.
#[derive(Debug)]
pub(crate) struct Worker {
    tx: mpsc::Sender<WorkerMessage>,
}

impl Worker {
    pub fn new(thread_id: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        let inner_worker = InnerWorker { thread_id, rx };
        thread::Builder::new()
            .name(format!("cubeprim-worker-{thread_id}"))
            .spawn(move || inner_worker.work())
            .map_err(|err| log::error!("Can't spawn worker {thread_id}: {err}"))
            .ok();

        Self { tx }
    }

    /// Returns false if the worker thread is gone.
    pub fn send(&self, message: WorkerMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

struct InnerWorker {
    thread_id: usize,
    rx: mpsc::Receiver<WorkerMessage>,
}

impl InnerWorker {
    fn work(self) {
        log::trace!("Worker {} started", self.thread_id);
        let mut shared = Vec::new();

        for message in self.rx.iter() {
            message.job.run(&mut shared);
            // The scheduler may have given up waiting.
            message.done.send(()).ok();
        }
        log::trace!("Worker {} stopped", self.thread_id);
    }
}
