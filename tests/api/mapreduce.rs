use crossbeam_channel::{Receiver, Sender};
use sentinel_kit::mr::{self, Cancel, MapReduceError, Options, Writer};
use sentinel_kit::Error;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
struct User {
    id: u64,
    name: String,
}

fn query_user(id: u64) -> sentinel_kit::Result<User> {
    if id == 0 {
        return Err(Error::msg("invalid user id"));
    }
    Ok(User {
        id,
        name: format!("user-{}", id),
    })
}

#[test]
fn batch_query() {
    let users: HashMap<u64, User> = mr::map_reduce(
        |source: &Sender<u64>| {
            for id in 1..=50 {
                source.send(id).unwrap();
            }
        },
        |id: u64, writer: &dyn Writer<User>, cancel: &Cancel| match query_user(id) {
            Ok(user) => writer.write(user),
            Err(err) => cancel.cancel(Some(err)),
        },
        |users: &Receiver<User>, writer: &dyn Writer<HashMap<u64, User>>, _: &Cancel| {
            writer.write(users.iter().map(|user| (user.id, user)).collect());
        },
        Options::new().with_workers(8),
    )
    .unwrap();
    assert_eq!(users.len(), 50);
    assert_eq!(users[&7].name, "user-7");
}

#[test]
fn batch_query_fails() {
    let err = mr::map_reduce(
        |source: &Sender<u64>| {
            for id in (0..50).rev() {
                source.send(id).unwrap();
            }
        },
        |id: u64, writer: &dyn Writer<User>, cancel: &Cancel| match query_user(id) {
            Ok(user) => writer.write(user),
            Err(err) => cancel.cancel(Some(err)),
        },
        |users: &Receiver<User>, writer: &dyn Writer<usize>, _: &Cancel| {
            writer.write(users.iter().count());
        },
        Options::new().with_workers(8),
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "invalid user id");
}

#[test]
fn slow_backend() {
    let res = mr::finish(vec![
        Box::new(|| Ok(())),
        Box::new(|| {
            sentinel_kit::utils::sleep_for_ms(500);
            Ok(())
        }),
    ]);
    assert!(res.is_ok());

    let err = mr::for_each(
        |source: &Sender<u64>| {
            for id in 0..4 {
                source.send(id).unwrap();
            }
        },
        |_: u64| sentinel_kit::utils::sleep_for_ms(300),
        Options::new().with_timeout(Duration::from_millis(50)),
    )
    .unwrap_err();
    assert_eq!(
        err.downcast_ref::<MapReduceError>(),
        Some(&MapReduceError::DeadlineExceeded)
    );
}
