use crossbeam_channel::unbounded;
use sentinel_kit::collection::TimingWheel;
use std::time::{Duration, Instant};

#[test]
fn session_timeouts() {
    let (expired, expirations) = unbounded();
    let wheel = TimingWheel::new(Duration::from_millis(10), 16, move |session: String, id: u32| {
        let _ = expired.send((session, id, Instant::now()));
    })
    .unwrap();
    let start = Instant::now();
    wheel
        .set_timer("alice".into(), 1, Duration::from_millis(50))
        .unwrap();
    wheel
        .set_timer("bob".into(), 2, Duration::from_millis(300))
        .unwrap();
    wheel
        .set_timer("carol".into(), 3, Duration::from_millis(100))
        .unwrap();
    // carol logs out, bob stays active
    wheel.remove_timer("carol".into()).unwrap();
    wheel
        .move_timer("bob".into(), Duration::from_millis(150))
        .unwrap();

    let (session, id, at) = expirations.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!((session.as_str(), id), ("alice", 1));
    assert!(at.duration_since(start) >= Duration::from_millis(40));
    let (session, id, _) = expirations.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!((session.as_str(), id), ("bob", 2));
    assert!(expirations
        .recv_timeout(Duration::from_millis(200))
        .is_err());
    wheel.stop().unwrap();
}

#[test]
fn drain_on_shutdown() {
    let (drained, pending) = unbounded();
    let wheel = TimingWheel::new(Duration::from_millis(100), 8, |_: u32, _: u32| {}).unwrap();
    for i in 0..10 {
        wheel.set_timer(i, i * 10, Duration::from_secs(60)).unwrap();
    }
    wheel
        .drain(move |key, value| {
            let _ = drained.send((key, value));
        })
        .unwrap();
    let mut got: Vec<(u32, u32)> = (0..10)
        .map(|_| pending.recv_timeout(Duration::from_secs(2)).unwrap())
        .collect();
    got.sort_unstable();
    assert_eq!(got, (0..10).map(|i| (i, i * 10)).collect::<Vec<_>>());
    wheel.stop().unwrap();
    assert!(wheel.set_timer(1, 1, Duration::from_secs(1)).is_err());
}
