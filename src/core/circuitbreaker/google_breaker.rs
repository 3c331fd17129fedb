//! The adaptive throttling of the Google SRE book, chapter "Handling Overload".
//!
//! Clients track the requests they sent (`total`) and the ones the backend accepted (`accepts`),
//! and reject locally with the probability
//!
//! ```text
//!     max(0, (total - protection - k * accepts) / (total + 1))
//! ```
//!
//! `protection` keeps a quiet backend from being cut off after a few failures,
//! a larger `k` tolerates more failures before requests are dropped.

use super::{Acceptable, Fallback, Promise, Request};
use crate::base::BlockError;
use crate::config::BreakerConfig;
use crate::stat::RollingWindow;
use crate::{Error, Result};
use rand::Rng;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// `drop_ratio` is the probability to reject the next request.
#[inline]
pub fn drop_ratio(accepts: i64, total: i64, k: f64, protection: i64) -> f64 {
    let weighted_accepts = k * accepts as f64;
    let ratio = ((total - protection) as f64 - weighted_accepts) / (total + 1) as f64;
    ratio.max(0.0)
}

#[derive(Debug)]
pub struct GoogleBreaker {
    k: f64,
    protection: i64,
    stat: Arc<RollingWindow>,
}

impl GoogleBreaker {
    pub fn new(config: &BreakerConfig) -> Result<Self> {
        let buckets = config.buckets.max(1) as u64;
        let interval_ms = (config.window_ms / buckets).max(1);
        Ok(GoogleBreaker {
            k: config.k,
            protection: config.protection,
            stat: Arc::new(RollingWindow::new(buckets as usize, interval_ms, false)?),
        })
    }

    /// `accept` rolls the dice with the current drop ratio.
    pub fn accept(&self) -> Result<()> {
        let (accepts, total) = self.history();
        let ratio = drop_ratio(accepts, total, self.k, self.protection);
        if ratio <= 0.0 {
            return Ok(());
        }
        if rand::thread_rng().gen::<f64>() < ratio {
            Err(Error::new(BlockError::breaker_open()))
        } else {
            Ok(())
        }
    }

    pub fn allow(&self) -> Result<Box<dyn Promise>> {
        self.accept()?;
        Ok(Box::new(GooglePromise {
            stat: self.stat.clone(),
        }))
    }

    pub fn do_req(
        &self,
        req: Request<'_>,
        fallback: Option<Fallback<'_>>,
        acceptable: Acceptable<'_>,
    ) -> Result<()> {
        if let Err(err) = self.accept() {
            return match fallback {
                Some(fallback) => fallback(err),
                None => Err(err),
            };
        }
        match panic::catch_unwind(AssertUnwindSafe(req)) {
            Ok(res) => {
                if acceptable(res.as_ref().err()) {
                    self.mark_success();
                } else {
                    self.mark_failure();
                }
                res
            }
            Err(payload) => {
                // the aborted call still counts
                self.mark_failure();
                panic::resume_unwind(payload)
            }
        }
    }

    pub fn mark_success(&self) {
        self.stat.add(1.0);
    }

    pub fn mark_failure(&self) {
        self.stat.add(0.0);
    }

    /// `history` returns the accepted and the total requests inside the window.
    pub fn history(&self) -> (i64, i64) {
        let mut accepts = 0.0;
        let mut total = 0;
        self.stat.reduce(|b| {
            accepts += b.sum;
            total += b.count;
        });
        (accepts as i64, total)
    }
}

struct GooglePromise {
    stat: Arc<RollingWindow>,
}

impl Promise for GooglePromise {
    fn accept(self: Box<Self>) {
        self.stat.add(1.0);
    }

    fn reject(self: Box<Self>, _reason: &str) {
        self.stat.add(0.0);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::is_breaker_open;
    use std::cell::Cell;

    fn new_breaker() -> GoogleBreaker {
        GoogleBreaker::new(&BreakerConfig::default()).unwrap()
    }

    fn default_acceptable(err: Option<&Error>) -> bool {
        err.is_none()
    }

    #[test]
    fn ratio_low_volume() {
        for total in 0..=5 {
            for accepts in 0..=total {
                assert!(drop_ratio(accepts, total, 1.5, 5) <= 0.0);
            }
        }
    }

    #[test]
    fn ratio_monotonic() {
        for total in 0..200 {
            let mut last = 0.0;
            for accepts in (0..=total).rev() {
                let ratio = drop_ratio(accepts, total, 1.5, 5);
                assert!(ratio >= last);
                assert!(ratio < 1.0);
                last = ratio;
            }
        }
    }

    #[test]
    fn closed() {
        let b = new_breaker();
        for _ in 0..80 {
            b.mark_success();
        }
        for _ in 0..120 {
            assert!(b.accept().is_ok());
            b.mark_success();
        }
    }

    #[test]
    fn low_volume_failures() {
        let b = new_breaker();
        for _ in 0..5 {
            b.mark_failure();
        }
        for _ in 0..100 {
            assert!(b.accept().is_ok());
        }
    }

    #[test]
    fn open() {
        let b = new_breaker();
        for _ in 0..1000 {
            b.mark_failure();
        }
        let mut rejected = 0;
        for _ in 0..100 {
            if let Err(err) = b.accept() {
                assert!(is_breaker_open(&err));
                rejected += 1;
            }
        }
        assert!(rejected > 80);
    }

    #[test]
    fn history() {
        let b = new_breaker();
        for _ in 0..10 {
            b.mark_success();
        }
        for _ in 0..5 {
            b.mark_failure();
        }
        assert_eq!(b.history(), (10, 15));
    }

    #[test]
    fn promise() {
        let b = new_breaker();
        b.allow().unwrap().accept();
        b.allow().unwrap().reject("failed");
        assert_eq!(b.history(), (1, 2));
    }

    #[test]
    fn acceptable_error() {
        let b = new_breaker();
        let res = b.do_req(
            Box::new(|| Err(Error::msg("not found"))),
            None,
            &|_: Option<&Error>| true,
        );
        assert_eq!(res.unwrap_err().to_string(), "not found");
        let res = b.do_req(
            Box::new(|| Err(Error::msg("unavailable"))),
            None,
            &default_acceptable,
        );
        assert!(res.is_err());
        assert!(b.do_req(Box::new(|| Ok(())), None, &default_acceptable).is_ok());
        assert_eq!(b.history(), (2, 3));
    }

    #[test]
    fn fallback_when_open() {
        let b = new_breaker();
        for _ in 0..1000 {
            b.mark_failure();
        }
        let fallbacks = Cell::new(0);
        for _ in 0..100 {
            let res = b.do_req(
                Box::new(|| Err(Error::msg("unavailable"))),
                Some(Box::new(|err: Error| {
                    assert!(is_breaker_open(&err));
                    fallbacks.set(fallbacks.get() + 1);
                    Ok(())
                })),
                &default_acceptable,
            );
            if res.is_ok() {
                assert!(fallbacks.get() > 0);
            }
        }
        assert!(fallbacks.get() > 0);
    }

    #[test]
    fn panic_is_recorded() {
        let b = new_breaker();
        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = b.do_req(Box::new(|| panic!("boom")), None, &default_acceptable);
        }));
        assert!(res.is_err());
        assert_eq!(b.history(), (0, 1));
    }
}
