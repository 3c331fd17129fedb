use crate::{logging, utils};
use lazy_static::lazy_static;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, Once,
};
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};

lazy_static! {
    static ref SYSTEM: Mutex<System> = Mutex::new(System::new());
    static ref CPU_CORES: f32 = std::thread::available_parallelism()
        .map(|n| n.get() as f32)
        .unwrap_or(1.0);
    static ref CPU_ONCE: Once = Once::new();
}

// cpu usage of the current process in millicpu, 1000 means all the cores are busy
static CURRENT_CPU: AtomicU64 = AtomicU64::new(0);

/// `init_cpu_collector` starts the background sampler of the process cpu usage once.
pub fn init_cpu_collector(cpu_interval: u32) {
    if cpu_interval == 0 {
        return;
    }
    CPU_ONCE.call_once(move || {
        std::thread::spawn(move || loop {
            CURRENT_CPU.store(get_process_cpu_stat(), Ordering::SeqCst);
            utils::sleep_for_ms(cpu_interval as u64);
        });
        logging::info!(
            "[SystemMetric] CPU usage collector started, interval {}ms",
            cpu_interval
        );
    });
}

#[inline]
fn to_millicpu(percent: f32, cores: f32) -> u64 {
    let usage = percent / cores * 10.0;
    if usage <= 0.0 {
        0
    } else if usage >= 1000.0 {
        1000
    } else {
        usage.round() as u64
    }
}

fn get_process_cpu_stat() -> u64 {
    let mut system = SYSTEM.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match get_current_pid() {
        Ok(pid) => {
            system.refresh_process(pid);
            system
                .process(pid)
                .map(|process| to_millicpu(process.cpu_usage(), *CPU_CORES))
                .unwrap_or(0)
        }
        Err(_) => 0,
    }
}

/// `current_cpu_usage` returns the latest sampled cpu usage in millicpu (0..=1000).
#[inline]
pub fn current_cpu_usage() -> u64 {
    CURRENT_CPU.load(Ordering::SeqCst)
}

#[cfg(test)]
#[inline]
pub fn set_cpu_usage(usage: u64) {
    CURRENT_CPU.store(usage, Ordering::SeqCst)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn millicpu() {
        assert_eq!(to_millicpu(0.0, 4.0), 0);
        assert_eq!(to_millicpu(-1.0, 4.0), 0);
        assert_eq!(to_millicpu(100.0, 4.0), 250);
        assert_eq!(to_millicpu(400.0, 4.0), 1000);
        assert_eq!(to_millicpu(900.0, 4.0), 1000);
        assert_eq!(to_millicpu(45.0, 1.0), 450);
    }

    #[test]
    #[ignore]
    fn cpu_usage() {
        set_cpu_usage(0);
        assert_eq!(current_cpu_usage(), 0);
        set_cpu_usage(300);
        assert_eq!(current_cpu_usage(), 300);
    }

    #[test]
    #[ignore]
    #[cfg(not(target_os = "macos"))]
    fn process_cpu_stat() {
        std::thread::spawn(|| loop {
            let start = utils::curr_time_millis();
            while utils::curr_time_millis() - start < 50 {
                let _ = 0;
            }
            utils::sleep_for_ms(20);
        });
        init_cpu_collector(50);
        utils::sleep_for_ms(500);
        assert!(current_cpu_usage() > 0);
    }
}
