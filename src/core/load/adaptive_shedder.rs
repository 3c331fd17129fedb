use super::{NopShedder, Promise, Shedder};
use crate::base::BlockError;
use crate::config::{self, ShedderConfig};
use crate::stat::RollingWindow;
use crate::utils::curr_time_millis;
use crate::{logging, system_metric, Error, Result};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

// minimum response time assumed before any request is measured, large enough not to drop
const DEFAULT_MIN_RT: f64 = 1000.0;
// moving average hyperparameter beta for the requests on the fly
const FLYING_BETA: f64 = 0.9;

/// Reads the cpu usage of the process in millicpu, 0..=1000.
pub type CpuProbe = Arc<dyn Fn() -> u64 + Send + Sync>;

/// ShedderOptions customizes an adaptive shedder.
/// The default value is a snapshot of the global shedder configuration.
#[derive(Clone)]
pub struct ShedderOptions {
    pub(crate) enabled: bool,
    pub(crate) log_enabled: bool,
    pub(crate) window_ms: u64,
    pub(crate) buckets: u32,
    pub(crate) cpu_threshold: u64,
    pub(crate) cool_off_ms: u64,
    pub(crate) cpu_probe: Option<CpuProbe>,
}

impl From<ShedderConfig> for ShedderOptions {
    fn from(config: ShedderConfig) -> Self {
        ShedderOptions {
            enabled: config.enabled,
            log_enabled: config.log_enabled,
            window_ms: config.window_ms,
            buckets: config.buckets,
            cpu_threshold: config.cpu_threshold,
            cool_off_ms: config.cool_off_ms,
            cpu_probe: None,
        }
    }
}

impl Default for ShedderOptions {
    fn default() -> Self {
        config::shedder_config().into()
    }
}

impl ShedderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_log(mut self, log_enabled: bool) -> Self {
        self.log_enabled = log_enabled;
        self
    }

    pub fn with_window(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }

    pub fn with_buckets(mut self, buckets: u32) -> Self {
        self.buckets = buckets;
        self
    }

    /// `with_cpu_threshold` sets the threshold in millicpu, 900 means 90% of all the cores.
    pub fn with_cpu_threshold(mut self, threshold: u64) -> Self {
        self.cpu_threshold = threshold;
        self
    }

    pub fn with_cool_off(mut self, cool_off_ms: u64) -> Self {
        self.cool_off_ms = cool_off_ms;
        self
    }

    /// `with_cpu_probe` replaces the sampled process cpu usage.
    pub fn with_cpu_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.cpu_probe = Some(Arc::new(probe));
        self
    }
}

/// `new_adaptive_shedder` returns an adaptive shedder,
/// or a shedder admitting everything if shedding is disabled in the options.
pub fn new_adaptive_shedder(options: ShedderOptions) -> Result<Arc<dyn Shedder>> {
    if !options.enabled {
        return Ok(Arc::new(NopShedder));
    }
    Ok(Arc::new(AdaptiveShedder::new(options)?))
}

#[derive(Debug)]
struct ShedderState {
    cpu_threshold: u64,
    // buckets per second
    windows: i64,
    flying: AtomicI64,
    avg_flying: Mutex<f64>,
    // in milliseconds, 0 means never dropped
    drop_time: AtomicU64,
    dropped_recently: AtomicBool,
    cool_off_ms: u64,
    log_enabled: bool,
    pass_counter: RollingWindow,
    rt_counter: RollingWindow,
}

/// AdaptiveShedder drops requests when the process is overloaded and there are more
/// requests on the fly than the estimated capacity.
///
/// The capacity follows Little's law: the best pass count of a bucket, scaled to a
/// second, times the best average response time in seconds.
/// After a drop the shedder stays hot for the cool-off period, during which it keeps
/// dropping as long as the flying requests exceed the capacity, whatever the cpu usage.
pub struct AdaptiveShedder {
    state: Arc<ShedderState>,
    cpu_probe: CpuProbe,
}

impl AdaptiveShedder {
    pub fn new(options: ShedderOptions) -> Result<Self> {
        Self::new_with_time(options, curr_time_millis())
    }

    fn new_with_time(options: ShedderOptions, now: u64) -> Result<Self> {
        if options.buckets == 0 {
            return Err(Error::msg("adaptive shedder needs at least one bucket"));
        }
        let bucket_ms = options.window_ms / options.buckets as u64;
        if bucket_ms == 0 {
            return Err(Error::msg(format!(
                "adaptive shedder window {}ms is too small for {} buckets",
                options.window_ms, options.buckets
            )));
        }
        let cpu_probe: CpuProbe = match options.cpu_probe {
            Some(probe) => probe,
            None => {
                system_metric::init_cpu_collector(config::cpu_stat_collect_interval_ms());
                Arc::new(system_metric::current_cpu_usage)
            }
        };
        let buckets = options.buckets as usize;
        Ok(AdaptiveShedder {
            state: Arc::new(ShedderState {
                cpu_threshold: options.cpu_threshold,
                windows: (1000 / bucket_ms) as i64,
                flying: AtomicI64::new(0),
                avg_flying: Mutex::new(0.0),
                drop_time: AtomicU64::new(0),
                dropped_recently: AtomicBool::new(false),
                cool_off_ms: options.cool_off_ms,
                log_enabled: options.log_enabled,
                // an incomplete bucket would distort both the pass count and the response time
                pass_counter: RollingWindow::new_with_time(buckets, bucket_ms, true, now)?,
                rt_counter: RollingWindow::new_with_time(buckets, bucket_ms, true, now)?,
            }),
            cpu_probe,
        })
    }

    fn system_overloaded(&self) -> bool {
        (self.cpu_probe)() >= self.state.cpu_threshold
    }

    fn should_drop(&self) -> bool {
        let state = &self.state;
        if !(self.system_overloaded() || state.still_hot()) || !state.high_thru() {
            return false;
        }
        if state.log_enabled {
            logging::error!(
                "[AdaptiveShedder] dropreq, cpu: {}, maxPass: {}, minRt: {:.2}, hot: {}, flying: {}, avgFlying: {:.2}",
                (self.cpu_probe)(),
                state.max_pass(),
                state.min_rt(),
                state.still_hot(),
                state.flying.load(Ordering::SeqCst),
                state.avg_flying()
            );
        }
        true
    }
}

impl ShedderState {
    fn add_flying(&self, delta: i64) {
        let flying = self.flying.fetch_add(delta, Ordering::SeqCst) + delta;
        // only updated on completion, so the average lags behind the flying requests
        if delta < 0 {
            let mut avg = self
                .avg_flying
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *avg = *avg * FLYING_BETA + flying as f64 * (1.0 - FLYING_BETA);
        }
    }

    fn avg_flying(&self) -> f64 {
        *self
            .avg_flying
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn high_thru(&self) -> bool {
        let max_flight = self.max_flight();
        self.avg_flying() as i64 > max_flight && self.flying.load(Ordering::SeqCst) > max_flight
    }

    fn max_flight(&self) -> i64 {
        // max qps = max pass * windows, min rt in milliseconds
        let max_flight = (self.max_pass() * self.windows) as f64 * self.min_rt() / 1e3;
        max_flight.max(1.0) as i64
    }

    fn max_pass(&self) -> i64 {
        let mut result = 1.0;
        self.pass_counter.reduce(|b| {
            if b.sum > result {
                result = b.sum;
            }
        });
        result as i64
    }

    fn min_rt(&self) -> f64 {
        let mut result = DEFAULT_MIN_RT;
        self.rt_counter.reduce(|b| {
            if b.count <= 0 {
                return;
            }
            let avg = (b.sum / b.count as f64).round();
            if avg < result {
                result = avg;
            }
        });
        result
    }

    fn still_hot(&self) -> bool {
        if !self.dropped_recently.load(Ordering::SeqCst) {
            return false;
        }
        let drop_time = self.drop_time.load(Ordering::SeqCst);
        if drop_time == 0 {
            return false;
        }
        let hot = curr_time_millis().saturating_sub(drop_time) < self.cool_off_ms;
        if !hot {
            self.dropped_recently.store(false, Ordering::SeqCst);
        }
        hot
    }
}

impl Shedder for AdaptiveShedder {
    fn allow(&self) -> Result<Box<dyn Promise>> {
        if self.should_drop() {
            self.state.drop_time.store(curr_time_millis(), Ordering::SeqCst);
            self.state.dropped_recently.store(true, Ordering::SeqCst);
            return Err(Error::new(BlockError::service_overloaded()));
        }
        self.state.add_flying(1);
        Ok(Box::new(AdaptivePromise {
            start: Instant::now(),
            state: self.state.clone(),
            completed: false,
        }))
    }
}

struct AdaptivePromise {
    start: Instant,
    state: Arc<ShedderState>,
    completed: bool,
}

impl Promise for AdaptivePromise {
    fn pass(mut self: Box<Self>) {
        self.completed = true;
        let rt = self.start.elapsed().as_secs_f64() * 1e3;
        self.state.add_flying(-1);
        self.state.rt_counter.add(rt.ceil());
        self.state.pass_counter.add(1.0);
    }

    fn fail(mut self: Box<Self>) {
        self.completed = true;
        self.state.add_flying(-1);
    }
}

// an abandoned promise counts as a failure
impl Drop for AdaptivePromise {
    fn drop(&mut self) {
        if !self.completed {
            self.state.add_flying(-1);
        }
    }
}
