use crate::{logging, utils};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

/// `run_safe` runs `f` and logs the panic instead of unwinding into the caller.
pub fn run_safe<F: FnOnce()>(f: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        logging::error!(
            "[Threading] Recovered from panic, reason: {}",
            utils::panic_message(payload.as_ref())
        );
    }
}

/// `go_safe` runs `f` on a new thread with `run_safe`.
pub fn go_safe<F>(f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(move || run_safe(f))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn recover() {
        run_safe(|| panic!("boom"));
        let handle = go_safe(|| panic!("boom"));
        assert!(handle.join().is_ok());
    }

    #[test]
    fn runs() {
        let ran = Arc::new(AtomicBool::new(false));
        go_safe({
            let ran = ran.clone();
            move || ran.store(true, Ordering::SeqCst)
        })
        .join()
        .unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
