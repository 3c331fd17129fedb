use crate::utils::curr_time_millis;
use crate::{Error, Result};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Bucket aggregates the contributions within one time slice.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bucket {
    pub sum: f64,
    pub count: i64,
}

impl Bucket {
    fn add(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

#[derive(Debug)]
struct Window {
    buckets: Vec<Bucket>,
    // the bucket currently accumulating
    offset: usize,
    // start of the current bucket, aligned to the interval
    last_time: u64,
}

/// RollingWindow is a sliding window of `size` buckets, each covering `interval_ms`.
///
/// Writes go to the bucket of "now". Buckets left behind by elapsed time are zeroed
/// before they are reused, so a fold never sees data older than one window length.
/// When `ignore_current` is set, `reduce` skips the bucket that is still filling.
#[derive(Debug)]
pub struct RollingWindow {
    size: usize,
    interval_ms: u64,
    ignore_current: bool,
    window: RwLock<Window>,
}

impl RollingWindow {
    pub fn new(size: usize, interval_ms: u64, ignore_current: bool) -> Result<Self> {
        Self::new_with_time(size, interval_ms, ignore_current, curr_time_millis())
    }

    pub fn new_with_time(
        size: usize,
        interval_ms: u64,
        ignore_current: bool,
        now: u64,
    ) -> Result<Self> {
        if size == 0 || interval_ms == 0 {
            return Err(Error::msg(format!(
                "invalid rolling window parameters, size: {}, interval_ms: {}",
                size, interval_ms
            )));
        }
        Ok(RollingWindow {
            size,
            interval_ms,
            ignore_current,
            window: RwLock::new(Window {
                buckets: vec![Bucket::default(); size],
                offset: 0,
                last_time: now,
            }),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    fn read(&self) -> RwLockReadGuard<'_, Window> {
        self.window
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Window> {
        self.window
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// the number of whole buckets elapsed since the last write, at most `size`
    fn span(&self, window: &Window, now: u64) -> usize {
        let elapsed = now.saturating_sub(window.last_time) / self.interval_ms;
        if elapsed < self.size as u64 {
            elapsed as usize
        } else {
            self.size
        }
    }

    fn update_offset(&self, window: &mut Window, now: u64) {
        let span = self.span(window, now);
        if span == 0 {
            return;
        }
        let offset = window.offset;
        for i in 0..span {
            window.buckets[(offset + i + 1) % self.size].reset();
        }
        window.offset = (offset + span) % self.size;
        // align to the start of the current bucket
        let elapsed = now.saturating_sub(window.last_time);
        window.last_time = now - elapsed % self.interval_ms;
    }

    pub fn add(&self, v: f64) {
        self.add_with_time(v, curr_time_millis())
    }

    pub fn add_with_time(&self, v: f64, now: u64) {
        let mut window = self.write();
        self.update_offset(&mut window, now);
        let offset = window.offset;
        window.buckets[offset].add(v);
    }

    /// `reduce` folds `f` over the buckets that are still inside the window.
    pub fn reduce<F: FnMut(&Bucket)>(&self, f: F) {
        self.reduce_with_time(f, curr_time_millis())
    }

    pub fn reduce_with_time<F: FnMut(&Bucket)>(&self, mut f: F, now: u64) {
        let window = self.read();
        let span = self.span(&window, now);
        let diff = if span == 0 && self.ignore_current {
            self.size - 1
        } else {
            self.size - span
        };
        if diff == 0 {
            return;
        }
        let start = (window.offset + span + 1) % self.size;
        for i in 0..diff {
            f(&window.buckets[(start + i) % self.size]);
        }
    }
}
