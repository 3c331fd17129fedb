use crate::utils::{curr_time_millis, format_time_millis};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

const NUM_HISTORY_REASONS: usize = 5;

#[derive(Debug, Default)]
struct Reasons {
    reasons: [String; NUM_HISTORY_REASONS],
    index: usize,
    count: usize,
}

/// ErrorWindow keeps the latest failure reasons of a breaker, stamped with the time they happen.
#[derive(Debug, Default)]
pub struct ErrorWindow {
    inner: Mutex<Reasons>,
}

impl ErrorWindow {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Reasons> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, reason: &str) {
        self.add_with_time(reason, curr_time_millis())
    }

    pub fn add_with_time(&self, reason: &str, now: u64) {
        let mut inner = self.lock();
        let index = inner.index;
        inner.reasons[index] = format!("{} {}", format_time_millis(now), reason);
        inner.index = (index + 1) % NUM_HISTORY_REASONS;
        inner.count = (inner.count + 1).min(NUM_HISTORY_REASONS);
    }

    pub fn len(&self) -> usize {
        self.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// newest first, one reason per line
impl fmt::Display for ErrorWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        for i in 0..inner.count {
            if i > 0 {
                writeln!(f)?;
            }
            let pos = (inner.index + NUM_HISTORY_REASONS - 1 - i) % NUM_HISTORY_REASONS;
            write!(f, "{}", inner.reasons[pos])?;
        }
        Ok(())
    }
}
