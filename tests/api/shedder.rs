use sentinel_kit::base::is_overloaded;
use sentinel_kit::load::{new_adaptive_shedder, Promise, ShedderGroup, ShedderOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn options(cpu: Arc<AtomicU64>) -> ShedderOptions {
    ShedderOptions::new()
        .with_enabled(true)
        .with_log(false)
        .with_cpu_probe(move || cpu.load(Ordering::SeqCst))
}

#[test]
fn overloaded() {
    let cpu = Arc::new(AtomicU64::new(1000));
    let shedder = new_adaptive_shedder(options(cpu.clone())).unwrap();
    // nothing completed yet, so the average of the flying requests is still zero
    let mut promises: Vec<Box<dyn Promise>> = (0..200).map(|_| shedder.allow().unwrap()).collect();
    for promise in promises.drain(100..) {
        promise.fail();
    }
    let err = shedder.allow().err().unwrap();
    assert!(is_overloaded(&err));

    // still hot, but the flying requests are gone
    drop(promises);
    cpu.store(0, Ordering::SeqCst);
    shedder.allow().unwrap().pass();
}

#[test]
fn idle() {
    let cpu = Arc::new(AtomicU64::new(0));
    let shedder = new_adaptive_shedder(options(cpu)).unwrap();
    let promises: Vec<Box<dyn Promise>> = (0..500).map(|_| shedder.allow().unwrap()).collect();
    for promise in promises {
        promise.pass();
    }
}

#[test]
fn group() {
    let cpu = Arc::new(AtomicU64::new(0));
    let group = ShedderGroup::new(options(cpu));
    let a = group.get_shedder("orders").unwrap();
    let b = group.get_shedder("orders").unwrap();
    let c = group.get_shedder("users").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert!(a.allow().is_ok());
}
