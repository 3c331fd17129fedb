use sentinel_kit::syncx::{Closable, ResourceManager, SingleFlight};
use sentinel_kit::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

struct Connection {
    closed: Arc<AtomicUsize>,
}

impl Closable for Connection {
    fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn shared_connections() {
    let manager = Arc::new(ResourceManager::new());
    let dials = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(10));
    let mut handlers = Vec::new();
    for i in 0..10 {
        let (manager, dials, closed, barrier) =
            (manager.clone(), dials.clone(), closed.clone(), barrier.clone());
        handlers.push(std::thread::spawn(move || {
            barrier.wait();
            let key = if i % 2 == 0 { "mysql" } else { "redis" };
            manager
                .get_resource(key, || {
                    dials.fetch_add(1, Ordering::SeqCst);
                    sentinel_kit::utils::sleep_for_ms(50);
                    Ok(Connection { closed })
                })
                .map(|_| ())
        }));
    }
    for h in handlers {
        h.join().expect("Couldn't join on the associated thread").unwrap();
    }
    assert_eq!(dials.load(Ordering::SeqCst), 2);
    manager.close().unwrap();
    assert_eq!(closed.load(Ordering::SeqCst), 2);
    assert!(manager
        .get_resource("mysql", || Err(Error::msg("unreachable")))
        .is_err());
}

#[test]
fn single_flight() {
    let flight: Arc<SingleFlight<String, usize>> = Arc::new(SingleFlight::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));
    let handlers: Vec<_> = (0..8)
        .map(|_| {
            let (flight, calls, barrier) = (flight.clone(), calls.clone(), barrier.clone());
            std::thread::spawn(move || {
                barrier.wait();
                flight
                    .do_call("key".into(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sentinel_kit::utils::sleep_for_ms(100);
                        Ok(42)
                    })
                    .unwrap()
            })
        })
        .collect();
    for h in handlers {
        assert_eq!(h.join().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
