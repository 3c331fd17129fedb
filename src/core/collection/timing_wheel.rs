//! A hashed timing wheel.
//!
//! The wheel is a ring of slots, the cursor moves one slot per tick and the entries
//! of the slot under the cursor are due. An entry further away than one revolution
//! keeps a `circle` count, decremented each time the cursor passes its slot.
//! Rescheduling to a later slot is lazy: the entry records a `diff` and is relocated
//! the next time the cursor reaches it.
//!
//! All the state is owned by one thread, the operations are commands sent to it.

use crate::config;
use crate::threading::{go_safe, TaskRunner};
use crate::{logging, Error, Result};
use crossbeam_channel::{bounded, never, select, tick, Receiver, Sender};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Executes the due tasks.
pub type Execute<K, V> = Arc<dyn Fn(K, V) + Send + Sync>;

enum Command<K, V> {
    Set { key: K, value: V, delay: Duration },
    Move { key: K, delay: Duration },
    Remove(K),
    Drain(Execute<K, V>),
    Stop,
}

struct TimingEntry<K, V> {
    key: K,
    value: V,
    circle: usize,
    diff: usize,
    removed: bool,
}

#[derive(Debug, Clone, Copy)]
struct PositionEntry {
    pos: usize,
    id: u64,
}

struct Wheel<K, V> {
    interval: Duration,
    num_slots: usize,
    // the slot visited by the previous tick
    ticked_pos: usize,
    // ids of the entries, in insertion order
    slots: Vec<Vec<u64>>,
    entries: HashMap<u64, TimingEntry<K, V>>,
    // the live entry of each key
    timers: HashMap<K, PositionEntry>,
    next_id: u64,
    execute: Execute<K, V>,
    runner: TaskRunner,
    drain_workers: usize,
}

/// TimingWheel runs `execute(key, value)` once the delay of a key has elapsed.
pub struct TimingWheel<K, V> {
    commands: Sender<Command<K, V>>,
}

impl<K, V> TimingWheel<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// `new` starts a wheel of `num_slots` slots, ticking every `interval`.
    pub fn new<F>(interval: Duration, num_slots: usize, execute: F) -> Result<Self>
    where
        F: Fn(K, V) + Send + Sync + 'static,
    {
        if interval.as_nanos() == 0 || num_slots == 0 {
            return Err(invalid(interval, num_slots));
        }
        Self::new_with_ticker(interval, num_slots, execute, tick(interval))
    }

    /// `new_with_ticker` starts a wheel driven by the given tick source,
    /// each message of `ticker` advances the wheel by one slot.
    pub fn new_with_ticker<F>(
        interval: Duration,
        num_slots: usize,
        execute: F,
        ticker: Receiver<Instant>,
    ) -> Result<Self>
    where
        F: Fn(K, V) + Send + Sync + 'static,
    {
        if interval.as_nanos() == 0 || num_slots == 0 {
            return Err(invalid(interval, num_slots));
        }
        let drain_workers = config::timing_wheel_config().drain_workers;
        let wheel = Wheel {
            interval,
            num_slots,
            ticked_pos: num_slots - 1,
            slots: vec![Vec::new(); num_slots],
            entries: HashMap::new(),
            timers: HashMap::new(),
            next_id: 0,
            execute: Arc::new(execute),
            runner: TaskRunner::new(drain_workers),
            drain_workers,
        };
        let (tx, rx) = bounded(0);
        thread::Builder::new()
            .name("timing-wheel".into())
            .spawn(move || wheel.run(ticker, rx))?;
        Ok(TimingWheel { commands: tx })
    }

    fn send(&self, command: Command<K, V>) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::msg("timing wheel is stopped"))
    }

    /// `set_timer` schedules `key`, or reschedules it with the new value if it is pending.
    /// Delays shorter than one interval are rounded up to it, a zero delay is ignored.
    pub fn set_timer(&self, key: K, value: V, delay: Duration) -> Result<()> {
        if delay.as_nanos() == 0 {
            return Ok(());
        }
        self.send(Command::Set { key, value, delay })
    }

    /// `move_timer` changes the delay of a pending `key`, counted from now.
    /// A delay shorter than one interval runs the task right away.
    pub fn move_timer(&self, key: K, delay: Duration) -> Result<()> {
        if delay.as_nanos() == 0 {
            return Ok(());
        }
        self.send(Command::Move { key, delay })
    }

    pub fn remove_timer(&self, key: K) -> Result<()> {
        self.send(Command::Remove(key))
    }

    /// `drain` hands all the pending tasks to `f` instead of waiting for them,
    /// leaving the wheel empty. `f` runs on a bounded pool of worker threads.
    pub fn drain<F>(&self, f: F) -> Result<()>
    where
        F: Fn(K, V) + Send + Sync + 'static,
    {
        self.send(Command::Drain(Arc::new(f)))
    }

    /// `stop` halts the wheel, the pending tasks never run.
    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }
}

fn invalid(interval: Duration, num_slots: usize) -> Error {
    Error::msg(format!(
        "invalid timing wheel, interval: {:?}, slots: {}",
        interval, num_slots
    ))
}

impl<K, V> Wheel<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn run(mut self, ticker: Receiver<Instant>, commands: Receiver<Command<K, V>>) {
        let mut ticker = ticker;
        loop {
            let mut ticker_closed = false;
            select! {
                recv(ticker) -> msg => match msg {
                    Ok(_) => self.on_tick(),
                    Err(_) => ticker_closed = true,
                },
                recv(commands) -> msg => match msg {
                    Ok(Command::Set { key, value, delay }) => self.set_task(key, value, delay),
                    Ok(Command::Move { key, delay }) => self.move_task(&key, delay),
                    Ok(Command::Remove(key)) => self.remove_task(&key),
                    Ok(Command::Drain(f)) => self.drain_all(f),
                    Ok(Command::Stop) | Err(_) => {
                        logging::debug!("[TimingWheel] Stopped");
                        return;
                    }
                },
            }
            // the tick source is gone, keep serving the commands
            if ticker_closed {
                ticker = never();
            }
        }
    }

    fn position_and_circle(&self, delay: Duration) -> (usize, usize) {
        let steps = (delay.as_nanos() / self.interval.as_nanos()) as usize;
        let pos = (self.ticked_pos + steps) % self.num_slots;
        let circle = steps.saturating_sub(1) / self.num_slots;
        (pos, circle)
    }

    fn push_entry(&mut self, pos: usize, entry: TimingEntry<K, V>) {
        let id = self.next_id;
        self.next_id += 1;
        self.timers.insert(entry.key.clone(), PositionEntry { pos, id });
        self.entries.insert(id, entry);
        self.slots[pos].push(id);
    }

    fn set_task(&mut self, key: K, value: V, delay: Duration) {
        let delay = delay.max(self.interval);
        if let Some(timer) = self.timers.get(&key).copied() {
            if let Some(entry) = self.entries.get_mut(&timer.id) {
                entry.value = value;
            }
            self.move_task(&key, delay);
        } else {
            let (pos, circle) = self.position_and_circle(delay);
            self.push_entry(
                pos,
                TimingEntry {
                    key,
                    value,
                    circle,
                    diff: 0,
                    removed: false,
                },
            );
        }
    }

    fn move_task(&mut self, key: &K, delay: Duration) {
        let timer = match self.timers.get(key).copied() {
            Some(timer) => timer,
            None => return,
        };
        if delay < self.interval {
            // already due, the old entry must not fire again
            self.timers.remove(key);
            let task = self.entries.get_mut(&timer.id).map(|entry| {
                entry.removed = true;
                (entry.key.clone(), entry.value.clone())
            });
            if let Some(task) = task {
                self.run_tasks(vec![task]);
            }
            return;
        }

        let (pos, circle) = self.position_and_circle(delay);
        let num_slots = self.num_slots;
        let entry = match self.entries.get_mut(&timer.id) {
            Some(entry) => entry,
            None => return,
        };
        if pos >= timer.pos {
            entry.circle = circle;
            entry.diff = pos - timer.pos;
        } else if circle > 0 {
            entry.circle = circle - 1;
            entry.diff = num_slots + pos - timer.pos;
        } else {
            // due earlier than the current slot, reinsert instead of relocating
            entry.removed = true;
            let fresh = TimingEntry {
                key: entry.key.clone(),
                value: entry.value.clone(),
                circle: 0,
                diff: 0,
                removed: false,
            };
            self.push_entry(pos, fresh);
        }
    }

    fn remove_task(&mut self, key: &K) {
        if let Some(timer) = self.timers.remove(key) {
            if let Some(entry) = self.entries.get_mut(&timer.id) {
                entry.removed = true;
            }
        }
    }

    fn on_tick(&mut self) {
        self.ticked_pos = (self.ticked_pos + 1) % self.num_slots;
        self.scan_and_run_tasks();
    }

    fn scan_and_run_tasks(&mut self) {
        let ticked_pos = self.ticked_pos;
        let ids = std::mem::take(&mut self.slots[ticked_pos]);
        let mut kept = Vec::with_capacity(ids.len());
        let mut tasks = Vec::new();

        for id in ids {
            let entry = match self.entries.get_mut(&id) {
                Some(entry) => entry,
                None => continue,
            };
            if entry.removed {
                self.entries.remove(&id);
            } else if entry.circle > 0 {
                entry.circle -= 1;
                kept.push(id);
            } else if entry.diff > 0 {
                let pos = (ticked_pos + entry.diff) % self.num_slots;
                entry.diff = 0;
                if let Some(timer) = self.timers.get_mut(&entry.key) {
                    timer.pos = pos;
                }
                if pos == ticked_pos {
                    kept.push(id);
                } else {
                    self.slots[pos].push(id);
                }
            } else if let Some(entry) = self.entries.remove(&id) {
                self.timers.remove(&entry.key);
                tasks.push((entry.key, entry.value));
            }
        }

        // entries relocated a full revolution ahead wait for the next visit
        kept.append(&mut self.slots[ticked_pos]);
        self.slots[ticked_pos] = kept;
        self.run_tasks(tasks);
    }

    fn run_tasks(&self, tasks: Vec<(K, V)>) {
        if tasks.is_empty() {
            return;
        }
        let runner = self.runner.clone();
        let execute = self.execute.clone();
        go_safe(move || {
            for (key, value) in tasks {
                let execute = execute.clone();
                runner.schedule(move || execute(key, value));
            }
        });
    }

    fn drain_all(&mut self, f: Execute<K, V>) {
        let runner = TaskRunner::new(self.drain_workers);
        for slot in self.slots.iter_mut() {
            for id in slot.drain(..) {
                if let Some(entry) = self.entries.remove(&id) {
                    if !entry.removed {
                        let f = f.clone();
                        runner.schedule(move || f(entry.key, entry.value));
                    }
                }
            }
        }
        self.entries.clear();
        self.timers.clear();
    }
}
