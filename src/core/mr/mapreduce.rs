use super::Options;
use crate::{Error, Result};
use crossbeam_channel::{at, bounded, never, select, Receiver, Sender, TryRecvError};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread::{self, JoinHandle};

const REDUCER_WRITTEN_TWICE: &str = "more than one element written in reducer";

/// A unit of work for `finish`.
pub type Task = Box<dyn FnOnce() -> Result<()> + Send>;
/// A unit of work for `finish_void`.
pub type VoidTask = Box<dyn FnOnce() + Send>;

type PanicPayload = Box<dyn Any + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapReduceError {
    /// `cancel` was called without an error.
    CancelledWithNil,
    /// The deadline elapsed or the run was aborted.
    DeadlineExceeded,
    /// The reducer returned without writing a value.
    ReduceNoOutput,
}

impl fmt::Display for MapReduceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            MapReduceError::CancelledWithNil => "mapreduce cancelled with nil",
            MapReduceError::DeadlineExceeded => "mapreduce deadline exceeded",
            MapReduceError::ReduceNoOutput => "reduce not writing value",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for MapReduceError {}

fn is_error(err: &Error, expected: MapReduceError) -> bool {
    err.downcast_ref::<MapReduceError>() == Some(&expected)
}

/// Writer hands a value to the next stage.
pub trait Writer<T> {
    fn write(&self, item: T);
}

/// Cancel stops a run from inside a mapper or the reducer.
/// Only the first call counts, and it never blocks.
pub struct Cancel {
    once: Once,
    err: Mutex<Option<Error>>,
    // dropped to close the done signal
    done_tx: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

impl Cancel {
    fn new() -> Self {
        let (done_tx, done) = bounded(0);
        Cancel {
            once: Once::new(),
            err: Mutex::new(None),
            done_tx: Mutex::new(Some(done_tx)),
            done,
        }
    }

    /// `cancel` aborts the run, the caller gets `err`,
    /// or `MapReduceError::CancelledWithNil` for `None`.
    pub fn cancel(&self, err: Option<Error>) {
        self.once.call_once(|| {
            let err = err.unwrap_or_else(|| Error::new(MapReduceError::CancelledWithNil));
            *self.err.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(err);
            self.finish();
        });
    }

    /// `is_done` tells whether the run is over, mappers and the reducer
    /// should stop producing once it is.
    pub fn is_done(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// `done` disconnects when the run is over, it never carries a message.
    pub fn done(&self) -> &Receiver<()> {
        &self.done
    }

    fn finish(&self) {
        self.done_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    fn take_err(&self) -> Option<Error> {
        self.err
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Keeps the first panic of the run.
#[derive(Default)]
struct PanicSlot {
    failed: AtomicBool,
    payload: Mutex<Option<PanicPayload>>,
}

impl PanicSlot {
    fn write(&self, payload: PanicPayload) {
        if self.failed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self
            .payload
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(payload);
    }

    fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn take(&self) -> Option<PanicPayload> {
        self.payload
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

struct GuardedWriter<T> {
    collector: Sender<T>,
    cancel: Arc<Cancel>,
}

impl<T> Writer<T> for GuardedWriter<T> {
    fn write(&self, item: T) {
        if self.cancel.is_done() {
            return;
        }
        select! {
            send(self.collector, item) -> _ => {},
            recv(self.cancel.done) -> _ => {},
        }
    }
}

struct OutputWriter<T> {
    value: RefCell<Option<T>>,
    written: Cell<bool>,
    cancel: Arc<Cancel>,
}

impl<T> OutputWriter<T> {
    fn new(cancel: Arc<Cancel>) -> Self {
        OutputWriter {
            value: RefCell::new(None),
            written: Cell::new(false),
            cancel,
        }
    }

    fn into_inner(self) -> Option<T> {
        self.value.into_inner()
    }
}

impl<T> Writer<T> for OutputWriter<T> {
    fn write(&self, item: T) {
        if self.written.replace(true) {
            panic!("{}", REDUCER_WRITTEN_TWICE);
        }
        if !self.cancel.is_done() {
            *self.value.borrow_mut() = Some(item);
        }
    }
}

fn build_source<T, G>(generate: G, cancel: Arc<Cancel>, panics: Arc<PanicSlot>) -> Receiver<T>
where
    T: Send + 'static,
    G: FnOnce(&Sender<T>) + Send + 'static,
{
    let (source, rx) = bounded(0);
    thread::spawn(move || {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| generate(&source))) {
            panics.write(payload);
            cancel.finish();
        }
    });
    rx
}

fn run_mapper<T, U, M>(
    source: &Receiver<T>,
    writer: &GuardedWriter<U>,
    mapper: &M,
    cancel: &Cancel,
    panics: &PanicSlot,
) where
    M: Fn(T, &dyn Writer<U>, &Cancel),
{
    let writer: &dyn Writer<U> = writer;
    while !panics.failed() && !cancel.is_done() {
        let item = select! {
            recv(cancel.done) -> _ => return,
            recv(source) -> item => match item {
                Ok(item) => item,
                Err(_) => return,
            },
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| mapper(item, writer, cancel)))
        {
            panics.write(payload);
            cancel.finish();
            return;
        }
    }
}

// The mapper pool, the collector is closed once every worker has returned.
fn execute_mappers<T, U, M>(
    source: Receiver<T>,
    collector: Sender<U>,
    mapper: M,
    workers: usize,
    cancel: Arc<Cancel>,
    panics: Arc<PanicSlot>,
) where
    T: Send + 'static,
    U: Send + 'static,
    M: Fn(T, &dyn Writer<U>, &Cancel) + Send + Sync + 'static,
{
    let mapper = Arc::new(mapper);
    thread::spawn(move || {
        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|_| {
                let source = source.clone();
                let writer = GuardedWriter {
                    collector: collector.clone(),
                    cancel: cancel.clone(),
                };
                let mapper = mapper.clone();
                let cancel = cancel.clone();
                let panics = panics.clone();
                thread::spawn(move || {
                    run_mapper(&source, &writer, mapper.as_ref(), &cancel, &panics)
                })
            })
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
        drop(collector);
        // unblock the generator
        for _ in source.iter() {}
    });
}

fn execute_reducer<U, V, R>(
    collector: Receiver<U>,
    reducer: R,
    cancel: Arc<Cancel>,
    panics: Arc<PanicSlot>,
) -> JoinHandle<Option<V>>
where
    U: Send + 'static,
    V: Send + 'static,
    R: FnOnce(&Receiver<U>, &dyn Writer<V>, &Cancel) + Send + 'static,
{
    thread::spawn(move || {
        let writer = OutputWriter::new(cancel.clone());
        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            reducer(&collector, &writer as &dyn Writer<V>, cancel.as_ref())
        }));
        if let Err(payload) = res {
            panics.write(payload);
            cancel.finish();
        }
        // unblock the mappers
        for _ in collector.iter() {}
        cancel.finish();
        writer.into_inner()
    })
}

fn map_reduce_with_panics<T, U, V, M, R>(
    source: Receiver<T>,
    cancel: Arc<Cancel>,
    panics: Arc<PanicSlot>,
    mapper: M,
    reducer: R,
    options: Options,
) -> Result<V>
where
    T: Send + 'static,
    U: Send + 'static,
    V: Send + 'static,
    M: Fn(T, &dyn Writer<U>, &Cancel) + Send + Sync + 'static,
    R: FnOnce(&Receiver<U>, &dyn Writer<V>, &Cancel) + Send + 'static,
{
    let (collector, collected) = bounded(options.workers);
    let reducer = execute_reducer(collected, reducer, cancel.clone(), panics.clone());
    execute_mappers(
        source,
        collector,
        mapper,
        options.workers,
        cancel.clone(),
        panics.clone(),
    );

    let deadline = options.deadline.map(at).unwrap_or_else(never);
    let abort = options.abort.unwrap_or_else(never);
    select! {
        recv(deadline) -> _ => {},
        recv(abort) -> _ => {},
        recv(cancel.done) -> _ => {
            let output = reducer.join().ok().flatten();
            if let Some(payload) = panics.take() {
                panic::resume_unwind(payload);
            }
            if let Some(err) = cancel.take_err() {
                return Err(err);
            }
            return output.ok_or_else(|| Error::new(MapReduceError::ReduceNoOutput));
        },
    }
    // the workers and the reducer wind down on their own
    cancel.cancel(Some(Error::new(MapReduceError::DeadlineExceeded)));
    Err(Error::new(MapReduceError::DeadlineExceeded))
}

/// `map_reduce` feeds the items of `generate` to `mapper` on a pool of
/// `options.workers` threads and returns the value written by `reducer`.
///
/// `mapper` writes zero or one value per item to the reducer, `reducer` writes the
/// final value at most once, writing twice is a bug and panics. Both may call
/// `Cancel::cancel` to stop the run, the caller then gets the cancel error.
/// A panic in any stage is re-raised in the caller once the stages are done.
pub fn map_reduce<T, U, V, G, M, R>(generate: G, mapper: M, reducer: R, options: Options) -> Result<V>
where
    T: Send + 'static,
    U: Send + 'static,
    V: Send + 'static,
    G: FnOnce(&Sender<T>) + Send + 'static,
    M: Fn(T, &dyn Writer<U>, &Cancel) + Send + Sync + 'static,
    R: FnOnce(&Receiver<U>, &dyn Writer<V>, &Cancel) + Send + 'static,
{
    let cancel = Arc::new(Cancel::new());
    let panics = Arc::new(PanicSlot::default());
    let source = build_source(generate, cancel.clone(), panics.clone());
    map_reduce_with_panics(source, cancel, panics, mapper, reducer, options)
}

/// `map_reduce_chan` is `map_reduce` over the items received from `source`.
pub fn map_reduce_chan<T, U, V, M, R>(
    source: Receiver<T>,
    mapper: M,
    reducer: R,
    options: Options,
) -> Result<V>
where
    T: Send + 'static,
    U: Send + 'static,
    V: Send + 'static,
    M: Fn(T, &dyn Writer<U>, &Cancel) + Send + Sync + 'static,
    R: FnOnce(&Receiver<U>, &dyn Writer<V>, &Cancel) + Send + 'static,
{
    let cancel = Arc::new(Cancel::new());
    let panics = Arc::new(PanicSlot::default());
    map_reduce_with_panics(source, cancel, panics, mapper, reducer, options)
}

/// `map_reduce_void` is `map_reduce` with a reducer that has no output.
pub fn map_reduce_void<T, U, G, M, R>(generate: G, mapper: M, reducer: R, options: Options) -> Result<()>
where
    T: Send + 'static,
    U: Send + 'static,
    G: FnOnce(&Sender<T>) + Send + 'static,
    M: Fn(T, &dyn Writer<U>, &Cancel) + Send + Sync + 'static,
    R: FnOnce(&Receiver<U>, &Cancel) + Send + 'static,
{
    let res = map_reduce(
        generate,
        mapper,
        move |collected: &Receiver<U>, _: &dyn Writer<()>, cancel: &Cancel| {
            reducer(collected, cancel)
        },
        options,
    );
    match res {
        Err(err) if is_error(&err, MapReduceError::ReduceNoOutput) => Ok(()),
        res => res,
    }
}

/// `for_each` runs `mapper` on every generated item.
pub fn for_each<T, G, M>(generate: G, mapper: M, options: Options) -> Result<()>
where
    T: Send + 'static,
    G: FnOnce(&Sender<T>) + Send + 'static,
    M: Fn(T) + Send + Sync + 'static,
{
    map_reduce_void(
        generate,
        move |item: T, _: &dyn Writer<()>, _: &Cancel| mapper(item),
        |_: &Receiver<()>, _: &Cancel| {},
        options,
    )
}

/// `finish` runs `tasks` in parallel and returns the first error,
/// the tasks not started yet are skipped once one fails.
pub fn finish(tasks: Vec<Task>) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }
    let workers = tasks.len();
    map_reduce_void(
        move |source: &Sender<Task>| {
            for task in tasks {
                if source.send(task).is_err() {
                    return;
                }
            }
        },
        |task: Task, _: &dyn Writer<()>, cancel: &Cancel| {
            if let Err(err) = task() {
                cancel.cancel(Some(err));
            }
        },
        |_: &Receiver<()>, _: &Cancel| {},
        Options::new().with_workers(workers),
    )
}

/// `finish_void` runs `tasks` in parallel and waits for all of them.
pub fn finish_void(tasks: Vec<VoidTask>) {
    if tasks.is_empty() {
        return;
    }
    let workers = tasks.len();
    // no deadline, so the only outcome is a panic
    let _ = for_each(
        move |source: &Sender<VoidTask>| {
            for task in tasks {
                if source.send(task).is_err() {
                    return;
                }
            }
        },
        |task: VoidTask| task(),
        Options::new().with_workers(workers),
    );
}
