//! Worker thread pool
//!
//! Fire-and-forget closures go through [`Threading::add_task`]. Work whose
//! results the caller needs goes through [`Threading::run_parallel`], which
//! blocks on a [`WaitGroup`] until every job has finished instead of spinning.

use std::cell::Cell;
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use crossbeam::sync::WaitGroup;

type Job = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static IS_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Fixed-size thread pool
pub struct Threading {
    workers: Vec<Worker>,
    sender: Option<Sender<Job>>,
}

impl Threading {
    /// Spawn `size` worker threads (at least one)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let workers = (0..size)
            .filter_map(|id| match Worker::spawn(id, receiver.clone()) {
                Ok(worker) => Some(worker),
                Err(e) => {
                    log::error!("Failed to spawn worker {id}: {e}");
                    None
                }
            })
            .collect::<Vec<_>>();

        log::info!("Threading initialized with {} workers", workers.len());
        Self {
            workers,
            sender: Some(sender),
        }
    }

    /// Number of live worker threads
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a closure; it runs to completion on some worker
    pub fn add_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.workers.is_empty() {
            task();
            return;
        }
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.send(Box::new(task)) {
            log::error!("Worker queue closed, running task inline");
            (e.into_inner())();
        }
    }

    /// Run every job on the pool and wait for all of them
    ///
    /// Results come back in job order. A job that panics is missing from the
    /// output. Called from a worker thread, the jobs run inline so a busy pool
    /// can never wait on itself.
    pub fn run_parallel<T, F>(&self, jobs: Vec<F>) -> Vec<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if IS_WORKER.with(Cell::get) || self.workers.is_empty() {
            return jobs.into_iter().map(|job| job()).collect();
        }

        let job_count = jobs.len();
        let (result_tx, result_rx) = unbounded();
        let wait_group = WaitGroup::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let wait_group = wait_group.clone();
            let result_tx = result_tx.clone();
            self.add_task(move || {
                let result = job();
                // The receiver outlives the wait, so this cannot fail
                let _ = result_tx.send((index, result));
                drop(wait_group);
            });
        }
        drop(result_tx);
        wait_group.wait();

        let mut results: Vec<(usize, T)> = result_rx.try_iter().collect();
        if results.len() != job_count {
            log::warn!("{} of {job_count} parallel jobs did not complete", job_count - results.len());
        }
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

impl Drop for Threading {
    fn drop(&mut self) {
        // Closing the channel lets every worker leave its loop
        self.sender.take();
        if IS_WORKER.with(Cell::get) {
            // Last handle released by a task; a worker can't join itself
            log::debug!("Threading released from a worker, detaching {} threads", self.workers.len());
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.thread.join().is_err() {
                log::error!("Worker {} panicked", worker.id);
            }
        }
        log::debug!("Threading shut down");
    }
}

struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn spawn(id: usize, receiver: Receiver<Job>) -> std::io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("lumen-worker-{id}"))
            .spawn(move || {
                IS_WORKER.with(|flag| flag.set(true));
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })?;

        Ok(Self { id, thread })
    }
}
