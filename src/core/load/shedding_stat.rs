use crate::{config, logging, system_metric, utils};
use enum_map::{Enum, EnumMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Enum)]
pub enum SheddingEvent {
    Total,
    Pass,
    Drop,
}

/// Snapshot of the counters of one report interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SheddingSnapshot {
    pub total: u64,
    pub pass: u64,
    pub drop: u64,
}

/// SheddingStat counts the admission decisions of a shedder and logs them periodically.
#[derive(Debug)]
pub struct SheddingStat {
    name: String,
    counter: EnumMap<SheddingEvent, AtomicU64>,
}

impl SheddingStat {
    /// `new` starts a reporter logging the counters every `stat_interval_ms`
    /// of the global shedder configuration. The reporter exits after the stat is dropped.
    pub fn new(name: &str) -> Arc<Self> {
        let stat = Arc::new(Self::new_detached(name));
        let interval = config::shedder_config().stat_interval_ms;
        if interval > 0 {
            let weak = Arc::downgrade(&stat);
            thread::spawn(move || run(weak, interval));
        }
        stat
    }

    fn new_detached(name: &str) -> Self {
        SheddingStat {
            name: name.into(),
            counter: EnumMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn increment(&self, event: SheddingEvent) {
        self.counter[event].fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_total(&self) {
        self.increment(SheddingEvent::Total)
    }

    pub fn increment_pass(&self) {
        self.increment(SheddingEvent::Pass)
    }

    pub fn increment_drop(&self) {
        self.increment(SheddingEvent::Drop)
    }

    /// `reset` takes the counters and restarts them from zero.
    pub fn reset(&self) -> SheddingSnapshot {
        SheddingSnapshot {
            total: self.counter[SheddingEvent::Total].swap(0, Ordering::SeqCst),
            pass: self.counter[SheddingEvent::Pass].swap(0, Ordering::SeqCst),
            drop: self.counter[SheddingEvent::Drop].swap(0, Ordering::SeqCst),
        }
    }

    fn report(&self) {
        let st = self.reset();
        if !config::shedder_config().log_enabled {
            return;
        }
        let cpu = system_metric::current_cpu_usage();
        if st.drop == 0 {
            logging::info!(
                "[SheddingStat] ({}) shedding_stat, cpu: {}, total: {}, pass: {}, drop: {}",
                self.name,
                cpu,
                st.total,
                st.pass,
                st.drop
            );
        } else {
            logging::warn!(
                "[SheddingStat] ({}) shedding_stat_drop, cpu: {}, total: {}, pass: {}, drop: {}",
                self.name,
                cpu,
                st.total,
                st.pass,
                st.drop
            );
        }
    }
}

fn run(stat: Weak<SheddingStat>, interval_ms: u64) {
    loop {
        utils::sleep_for_ms(interval_ms);
        match stat.upgrade() {
            Some(stat) => stat.report(),
            None => return,
        }
    }
}
