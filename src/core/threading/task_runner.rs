use super::go_safe;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Debug)]
struct Slots {
    active: Mutex<usize>,
    cond: Condvar,
}

impl Slots {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self) {
        let mut active = self.lock();
        *active -= 1;
        self.cond.notify_all();
    }
}

// releases the slot even if the task panics
struct SlotGuard(Arc<Slots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// TaskRunner runs tasks on background threads, at most `limit` of them at a time.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    limit: usize,
    slots: Arc<Slots>,
}

impl TaskRunner {
    pub fn new(limit: usize) -> Self {
        TaskRunner {
            limit: limit.max(1),
            slots: Arc::new(Slots {
                active: Mutex::new(0),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// `schedule` blocks until a slot is free, then runs `task` on a new thread.
    /// Panics of `task` are logged.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut active = self.slots.lock();
            while *active >= self.limit {
                active = self
                    .slots
                    .cond
                    .wait(active)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            *active += 1;
        }
        let guard = SlotGuard(self.slots.clone());
        go_safe(move || {
            let _guard = guard;
            task();
        });
    }

    /// `wait` blocks until all the scheduled tasks are finished.
    pub fn wait(&self) {
        let mut active = self.slots.lock();
        while *active > 0 {
            active = self
                .slots
                .cond
                .wait(active)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::sleep_for_ms;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn limit() {
        let runner = TaskRunner::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let running = running.clone();
            let peak = peak.clone();
            let done = done.clone();
            runner.schedule(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep_for_ms(5);
                running.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        runner.wait();
        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn panic_frees_slot() {
        let runner = TaskRunner::new(1);
        runner.schedule(|| panic!("boom"));
        let done = Arc::new(AtomicUsize::new(0));
        runner.schedule({
            let done = done.clone();
            move || {
                done.fetch_add(1, Ordering::SeqCst);
            }
        });
        runner.wait();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(runner.limit(), 1);
    }
}
