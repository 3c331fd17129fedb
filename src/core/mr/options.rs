use crate::config::{self, MAPREDUCE_MIN_WORKERS};
use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};

/// Options customizes one map-reduce run.
#[derive(Debug)]
pub struct Options {
    pub(crate) workers: usize,
    pub(crate) deadline: Option<Instant>,
    pub(crate) abort: Option<Receiver<()>>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            workers: config::mapreduce_config().workers.max(MAPREDUCE_MIN_WORKERS),
            deadline: None,
            abort: None,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mappers running at the same time, at least one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(MAPREDUCE_MIN_WORKERS);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A message on `abort`, or its disconnection, aborts the run
    /// as if the deadline was exceeded.
    pub fn with_abort(mut self, abort: Receiver<()>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}
