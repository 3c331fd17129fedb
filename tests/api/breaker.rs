use rand;
use sentinel_kit::base::is_breaker_open;
use sentinel_kit::circuitbreaker::{self, Breaker, CircuitBreaker};
use sentinel_kit::Error;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn unhealthy_dependency() {
    let breaker = Arc::new(CircuitBreaker::new("unhealthy-dependency").unwrap());
    let rejected = Arc::new(AtomicUsize::new(0));
    let mut handlers = Vec::new();
    for _ in 0..4 {
        let breaker = breaker.clone();
        let rejected = rejected.clone();
        handlers.push(std::thread::spawn(move || {
            for _ in 0..1000 {
                let res = breaker.do_request(Box::new(|| {
                    // mostly failing dependency
                    if rand::random::<u8>() % 10 == 0 {
                        Ok(())
                    } else {
                        Err(Error::msg("connection refused"))
                    }
                }));
                if let Err(err) = res {
                    if is_breaker_open(&err) {
                        rejected.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }));
    }
    for h in handlers {
        h.join().expect("Couldn't join on the associated thread");
    }
    assert!(rejected.load(Ordering::SeqCst) > 0);
    assert!(breaker.last_errors().contains("connection refused"));
}

#[test]
fn healthy_dependency() {
    for _ in 0..1000 {
        assert!(circuitbreaker::do_request("healthy-dependency", || Ok(())).is_ok());
    }
}

#[test]
fn registry_fallback() {
    let name = "registry-fallback";
    for _ in 0..5000 {
        let _ = circuitbreaker::do_request(name, || Err(Error::msg("timeout")));
    }
    let fallbacks = Cell::new(0);
    for _ in 0..100 {
        let res = circuitbreaker::do_with_fallback(
            name,
            || Ok(()),
            |err| {
                assert!(is_breaker_open(&err));
                fallbacks.set(fallbacks.get() + 1);
                Ok(())
            },
        );
        assert!(res.is_ok());
    }
    assert!(fallbacks.get() > 0);
}

#[test]
fn disabled_breaker() {
    circuitbreaker::no_breaker_for("disabled-dependency");
    for _ in 0..1000 {
        let res = circuitbreaker::do_request("disabled-dependency", || Err(Error::msg("boom")));
        assert_eq!(res.unwrap_err().to_string(), "boom");
    }
}
