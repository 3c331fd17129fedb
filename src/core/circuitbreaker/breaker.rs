use super::{ErrorWindow, GoogleBreaker};
use crate::base::is_breaker_open;
use crate::config::{self, BreakerConfig};
use crate::utils::curr_time_millis;
use crate::{logging, Error, Result};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The guarded call.
pub type Request<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;
/// Called with the rejection error instead of the request when the breaker is open.
pub type Fallback<'a> = Box<dyn FnOnce(Error) -> Result<()> + 'a>;
/// Tells whether the outcome of a request counts as a success,
/// `None` stands for a request finished without error.
pub type Acceptable<'a> = &'a dyn Fn(Option<&Error>) -> bool;

// interval between two reports of the same open breaker
const REPORT_INTERVAL_MS: u64 = 1000;
const RANDOM_NAME_LEN: usize = 8;

/// `default_acceptable` only treats the requests finished without error as successful.
pub fn default_acceptable(err: Option<&Error>) -> bool {
    err.is_none()
}

/// Promise reports the outcome of a request admitted by `Breaker::allow`.
pub trait Promise: Send {
    fn accept(self: Box<Self>);
    fn reject(self: Box<Self>, reason: &str);
}

/// `Breaker` guards the calls to a dependency and rejects them when it looks unhealthy.
pub trait Breaker: Send + Sync {
    fn name(&self) -> &str;

    /// `allow` checks the admission and, if admitted, hands back a `Promise`
    /// to report the outcome later. Used by callers that cannot wrap the call in a closure.
    fn allow(&self) -> Result<Box<dyn Promise>>;

    /// `do_req` runs `req` if admitted, otherwise returns the rejection
    /// or the result of `fallback` with the rejection.
    /// The outcome is classified by `acceptable`. A panic in `req` is counted
    /// as a failure and keeps unwinding.
    fn do_req(
        &self,
        req: Request<'_>,
        fallback: Option<Fallback<'_>>,
        acceptable: Acceptable<'_>,
    ) -> Result<()>;

    fn do_request(&self, req: Request<'_>) -> Result<()> {
        self.do_req(req, None, &default_acceptable)
    }

    fn do_with_acceptable(&self, req: Request<'_>, acceptable: Acceptable<'_>) -> Result<()> {
        self.do_req(req, None, acceptable)
    }

    fn do_with_fallback(&self, req: Request<'_>, fallback: Fallback<'_>) -> Result<()> {
        self.do_req(req, Some(fallback), &default_acceptable)
    }

    fn do_with_fallback_acceptable(
        &self,
        req: Request<'_>,
        fallback: Fallback<'_>,
        acceptable: Acceptable<'_>,
    ) -> Result<()> {
        self.do_req(req, Some(fallback), acceptable)
    }
}

fn random_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_NAME_LEN)
        .map(char::from)
        .collect()
}

/// LoggedThrottle records the failure reasons of the wrapped breaker
/// and reports them when requests are being dropped.
#[derive(Debug)]
struct LoggedThrottle {
    name: String,
    internal: GoogleBreaker,
    errs: Arc<ErrorWindow>,
    last_report: AtomicU64,
}

impl LoggedThrottle {
    fn new(name: String, config: &BreakerConfig) -> Result<Self> {
        Ok(LoggedThrottle {
            name,
            internal: GoogleBreaker::new(config)?,
            errs: Arc::new(ErrorWindow::new()),
            last_report: AtomicU64::new(0),
        })
    }

    fn allow(&self) -> Result<Box<dyn Promise>> {
        match self.internal.allow() {
            Ok(promise) => Ok(Box::new(PromiseWithReason {
                promise,
                errs: self.errs.clone(),
            })),
            Err(err) => Err(self.log_error(err)),
        }
    }

    fn do_req(
        &self,
        req: Request<'_>,
        fallback: Option<Fallback<'_>>,
        acceptable: Acceptable<'_>,
    ) -> Result<()> {
        let errs = &self.errs;
        let res = self.internal.do_req(req, fallback, &|err: Option<&Error>| {
            let accept = acceptable(err);
            if !accept {
                if let Some(err) = err {
                    errs.add(&err.to_string());
                }
            }
            accept
        });
        res.map_err(|err| self.log_error(err))
    }

    fn log_error(&self, err: Error) -> Error {
        if is_breaker_open(&err) {
            self.report_dropped();
        }
        err
    }

    // at most once per REPORT_INTERVAL_MS for each breaker
    fn report_dropped(&self) {
        let now = curr_time_millis();
        let last = self.last_report.load(Ordering::SeqCst);
        if now < last + REPORT_INTERVAL_MS {
            return;
        }
        if self
            .last_report
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        logging::error!(
            "[CircuitBreaker] proc({}/{}), callee: {}, breaker is open and requests dropped\nlast errors:\n{}",
            config::app_name(),
            std::process::id(),
            self.name,
            self.errs
        );
    }
}

struct PromiseWithReason {
    promise: Box<dyn Promise>,
    errs: Arc<ErrorWindow>,
}

impl Promise for PromiseWithReason {
    fn accept(self: Box<Self>) {
        self.promise.accept();
    }

    fn reject(self: Box<Self>, reason: &str) {
        self.errs.add(reason);
        self.promise.reject(reason);
    }
}

/// CircuitBreaker is the adaptive breaker with failure reporting.
#[derive(Debug)]
pub struct CircuitBreaker {
    throttle: LoggedThrottle,
}

impl CircuitBreaker {
    /// `new` builds a breaker from the global breaker configuration,
    /// a blank name is replaced by a random one.
    pub fn new(name: &str) -> Result<Self> {
        Self::new_with_config(name, &config::breaker_config())
    }

    pub fn new_with_config(name: &str, config: &BreakerConfig) -> Result<Self> {
        let name = if name.trim().is_empty() {
            random_name()
        } else {
            name.to_string()
        };
        Ok(CircuitBreaker {
            throttle: LoggedThrottle::new(name, config)?,
        })
    }

    /// `last_errors` lists the latest failure reasons, newest first.
    pub fn last_errors(&self) -> String {
        self.throttle.errs.to_string()
    }
}

impl Breaker for CircuitBreaker {
    fn name(&self) -> &str {
        &self.throttle.name
    }

    fn allow(&self) -> Result<Box<dyn Promise>> {
        self.throttle.allow()
    }

    fn do_req(
        &self,
        req: Request<'_>,
        fallback: Option<Fallback<'_>>,
        acceptable: Acceptable<'_>,
    ) -> Result<()> {
        self.throttle.do_req(req, fallback, acceptable)
    }
}

/// NopBreaker admits every request.
#[derive(Debug, Clone)]
pub struct NopBreaker {
    name: String,
}

impl NopBreaker {
    pub fn new(name: &str) -> Self {
        NopBreaker { name: name.into() }
    }
}

struct NopPromise;

impl Promise for NopPromise {
    fn accept(self: Box<Self>) {}
    fn reject(self: Box<Self>, _reason: &str) {}
}

impl Breaker for NopBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn allow(&self) -> Result<Box<dyn Promise>> {
        Ok(Box::new(NopPromise))
    }

    fn do_req(
        &self,
        req: Request<'_>,
        _fallback: Option<Fallback<'_>>,
        _acceptable: Acceptable<'_>,
    ) -> Result<()> {
        req()
    }
}
