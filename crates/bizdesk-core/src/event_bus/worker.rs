//! Worker pool for asynchronous subscriber callbacks.
//!
//! Callbacks are blocking closures, so they run on the blocking thread pool
//! of a tokio runtime owned by the bus, capped at the configured thread
//! count. Jobs sharing a lane key run one at a time in submission order;
//! different lanes run in parallel. Submission never blocks the caller.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};

use super::subscription::SubscriptionId;
use crate::error::EventBusError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pending jobs per lane. A key is present while a drainer owns the lane.
type Lanes = Arc<Mutex<HashMap<SubscriptionId, VecDeque<Job>>>>;

pub(crate) struct WorkerPool {
    runtime: Option<Runtime>,
    lanes: Lanes,
}

impl WorkerPool {
    pub(crate) fn new(threads: usize) -> Result<Self, EventBusError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name("bizdesk-worker")
            .build()
            .map_err(|e| EventBusError::WorkerPool(e.to_string()))?;
        tracing::debug!("Worker pool started with {} threads", threads);
        Ok(Self {
            runtime: Some(runtime),
            lanes: Lanes::default(),
        })
    }

    /// Submission handle, shareable with the dispatch loop
    pub(crate) fn spawner(&self) -> Option<Spawner> {
        self.runtime.as_ref().map(|runtime| Spawner {
            handle: runtime.handle().clone(),
            lanes: Arc::clone(&self.lanes),
        })
    }

    /// Stop accepting work. Running jobs finish on their own threads.
    pub(crate) fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            tracing::debug!("Worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cloneable handle that submits jobs to a [`WorkerPool`].
///
/// Jobs submitted after the pool shut down are dropped without running.
#[derive(Clone)]
pub(crate) struct Spawner {
    handle: Handle,
    lanes: Lanes,
}

impl Spawner {
    /// Queue `job` behind earlier jobs of the same lane
    pub(crate) fn submit<F>(&self, lane: SubscriptionId, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let start_drainer = match self.lanes.lock().entry(lane) {
            Entry::Occupied(mut pending) => {
                pending.get_mut().push_back(Box::new(job));
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::from([Box::new(job) as Job]));
                true
            }
        };

        if start_drainer {
            let drainer = Drainer {
                lanes: Arc::clone(&self.lanes),
                lane,
                finished: false,
            };
            self.handle.spawn_blocking(move || drainer.run());
        }
    }
}

/// Runs the jobs of one lane until it is empty.
///
/// If the drainer is dropped without finishing (pool already shut down, or
/// a job panicked) the remaining jobs of its lane are discarded, which
/// releases whatever they own.
struct Drainer {
    lanes: Lanes,
    lane: SubscriptionId,
    finished: bool,
}

impl Drainer {
    fn run(mut self) {
        loop {
            let job = {
                let mut lanes = self.lanes.lock();
                match lanes.get_mut(&self.lane).and_then(VecDeque::pop_front) {
                    Some(job) => job,
                    None => {
                        lanes.remove(&self.lane);
                        self.finished = true;
                        return;
                    }
                }
            };
            job();
        }
    }
}

impl Drop for Drainer {
    fn drop(&mut self) {
        if !self.finished {
            let abandoned = self.lanes.lock().remove(&self.lane);
            drop(abandoned);
        }
    }
}
