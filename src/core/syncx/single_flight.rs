use crate::{utils, Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// SharedError is the failure of a single flight call, observed by every caller of the call.
#[derive(Debug, Clone)]
pub struct SharedError(Arc<Error>);

impl SharedError {
    pub fn new(err: Error) -> Self {
        SharedError(Arc::new(err))
    }

    pub fn inner(&self) -> &Error {
        &self.0
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

type CallResult<V> = std::result::Result<V, SharedError>;

struct Call<V> {
    result: Mutex<Option<CallResult<V>>>,
    done: Condvar,
}

impl<V: Clone> Call<V> {
    fn new() -> Self {
        Call {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CallResult<V>>> {
        self.result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish(&self, result: CallResult<V>) {
        *self.lock() = Some(result);
        self.done.notify_all();
    }

    fn wait(&self) -> CallResult<V> {
        let mut result = self.lock();
        loop {
            if let Some(result) = result.as_ref() {
                return result.clone();
            }
            result = self
                .done
                .wait(result)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// SingleFlight lets the concurrent calls with the same key share one execution.
///
/// If A calls `f` with a key and B calls with the same key before `f` returns,
/// B does not execute its own function but waits and shares the result of A.
/// Calls made after the result is delivered execute again.
pub struct SingleFlight<K, V> {
    calls: Mutex<HashMap<K, Arc<Call<V>>>>,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        SingleFlight {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Arc<Call<V>>>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn do_call<F>(&self, key: K, f: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        self.do_call_ex(key, f).0
    }

    /// `do_call_ex` also tells whether the result is fresh, i.e. `f` ran in this call.
    /// If `f` panics, the waiters get an error and the panic goes on in this call.
    pub fn do_call_ex<F>(&self, key: K, f: F) -> (Result<V>, bool)
    where
        F: FnOnce() -> Result<V>,
    {
        let call = {
            let mut calls = self.lock();
            let existing = calls.get(&key).cloned();
            if let Some(call) = existing {
                drop(calls);
                return (call.wait().map_err(Error::new), false);
            }
            let call = Arc::new(Call::new());
            calls.insert(key.clone(), call.clone());
            call
        };

        let (result, payload) = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(v)) => (Ok(v), None),
            Ok(Err(err)) => (Err(SharedError::new(err)), None),
            Err(payload) => {
                let err = Error::msg(format!(
                    "single flight call panicked: {}",
                    utils::panic_message(payload.as_ref())
                ));
                (Err(SharedError::new(err)), Some(payload))
            }
        };
        self.lock().remove(&key);
        call.finish(result.clone());

        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
        (result.map_err(Error::new), true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::sleep_for_ms;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn single_call() {
        let g = SingleFlight::new();
        let v = g.do_call("key", || Ok("bar".to_string())).unwrap();
        assert_eq!(v, "bar");
    }

    #[test]
    fn error() {
        let g: SingleFlight<&str, i32> = SingleFlight::new();
        let err = g.do_call("key", || Err(Error::msg("dummy"))).unwrap_err();
        assert_eq!(err.to_string(), "dummy");
    }

    #[test]
    fn dedup() {
        let g = Arc::new(SingleFlight::<String, usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let fresh = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(10));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let g = g.clone();
                let calls = calls.clone();
                let fresh = fresh.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let (v, is_fresh) = g.do_call_ex("key".into(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep_for_ms(100);
                        Ok(42)
                    });
                    if is_fresh {
                        fresh.fetch_add(1, Ordering::SeqCst);
                    }
                    v.unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 42);
        }
        let executed = calls.load(Ordering::SeqCst);
        assert!(executed >= 1);
        assert_eq!(executed, fresh.load(Ordering::SeqCst));
        // all the threads pass the barrier well within the sleep
        assert_eq!(executed, 1);
    }

    #[test]
    fn shared_error() {
        let g = Arc::new(SingleFlight::<&'static str, i32>::new());
        let started = Arc::new(Barrier::new(2));
        let leader = thread::spawn({
            let g = g.clone();
            let started = started.clone();
            move || {
                g.do_call("key", || {
                    started.wait();
                    sleep_for_ms(200);
                    Err(Error::msg("connection refused"))
                })
            }
        });
        started.wait();
        let (res, fresh) = g.do_call_ex("key", || Ok(1));
        assert!(!fresh);
        let err = res.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
        assert!(err.downcast_ref::<SharedError>().is_some());
        assert_eq!(
            leader.join().unwrap().unwrap_err().to_string(),
            "connection refused"
        );
    }

    #[test]
    fn sequential_calls_run_again() {
        let g = SingleFlight::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let (v, fresh) = g.do_call_ex(1, || Ok(calls.fetch_add(1, Ordering::SeqCst)));
            assert!(fresh);
            assert!(v.is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panic_releases_waiters() {
        let g = Arc::new(SingleFlight::<&'static str, i32>::new());
        let started = Arc::new(Barrier::new(2));
        let leader = thread::spawn({
            let g = g.clone();
            let started = started.clone();
            move || {
                g.do_call("key", || {
                    started.wait();
                    sleep_for_ms(200);
                    panic!("boom")
                })
            }
        });
        started.wait();
        let err = g.do_call("key", || Ok(1)).unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(leader.join().is_err());
        // the key is released after the panic
        assert_eq!(g.do_call("key", || Ok(2)).unwrap(), 2);
    }
}
