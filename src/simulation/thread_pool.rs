//! Fixed worker pool with one mailbox per worker
//!
//! Work is addressed to an explicit worker index rather than pulled from a
//! shared queue, so a caller can pin a static partition of its data to
//! specific threads. Each worker owns:
//! - one OS thread,
//! - one mutex-protected mailbox (item slot, busy flag, shutdown flag),
//! - one condition variable used for both wake-up and completion.
//!
//! The processed item is handed back by `join`, which lets a task own its
//! output buffer and the caller copy results out after the barrier.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error};

struct Mailbox<T> {
    item: Option<T>,
    busy: bool,     // set by dispatch, cleared by the worker when done
    shutdown: bool, // checked after each item
}

struct Slot<T> {
    mailbox: Mutex<Mailbox<T>>,
    signal: Condvar,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, Mailbox<T>> {
        // `f` runs outside the lock, so a poisoned mailbox still holds
        // consistent flags
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Number of workers to spawn: one per hardware thread, leaving one for the
/// caller, at least one, and at most `max`.
pub fn worker_count(max: usize) -> usize {
    num_cpus::get().saturating_sub(1).max(1).min(max.max(1))
}

pub struct ThreadPool<T: Send + 'static> {
    slots: Vec<Arc<Slot<T>>>,
    handles: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> ThreadPool<T> {
    /// Spawn `worker_count(max_workers)` workers that run `f` on each item.
    pub fn new<F>(max_workers: usize, f: F) -> Result<Self>
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::with_workers(worker_count(max_workers), f)
    }

    /// Spawn exactly `workers` workers (at least one).
    pub fn with_workers<F>(workers: usize, f: F) -> Result<Self>
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::spawn_with(workers, f, |index, body| {
            thread::Builder::new()
                .name(format!("bhsolver-worker-{index}"))
                .spawn(body)
        })
    }

    /// Build the pool one worker at a time. If `spawn` fails the partial pool
    /// is dropped, which shuts down and joins the workers started so far.
    fn spawn_with<F, S>(workers: usize, f: F, mut spawn: S) -> Result<Self>
    where
        F: Fn(&mut T) + Send + Sync + 'static,
        S: FnMut(usize, Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>>,
    {
        let workers = workers.max(1);
        let f = Arc::new(f);
        let mut pool = Self {
            slots: Vec::with_capacity(workers),
            handles: Vec::with_capacity(workers),
        };

        for index in 0..workers {
            let slot = Arc::new(Slot {
                mailbox: Mutex::new(Mailbox {
                    item: None,
                    busy: false,
                    shutdown: false,
                }),
                signal: Condvar::new(),
            });

            let worker_slot = Arc::clone(&slot);
            let worker_f = Arc::clone(&f);
            let handle = spawn(index, Box::new(move || worker_loop(index, &worker_slot, worker_f.as_ref())))
                .with_context(|| format!("failed to spawn worker {index}"))?;

            pool.slots.push(slot);
            pool.handles.push(handle);
        }

        debug!("thread pool started with {workers} workers");
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Hand `item` to worker `index` and wake it.
    ///
    /// Fails if the index is out of range or the worker has not been joined
    /// since its last dispatch. An unjoined result from an earlier, finished
    /// dispatch is discarded.
    pub fn dispatch(&self, index: usize, item: T) -> Result<()> {
        let slot = self
            .slots
            .get(index)
            .ok_or_else(|| anyhow!("worker {index} out of range ({} workers)", self.len()))?;

        let mut mailbox = slot.lock();
        if mailbox.busy {
            bail!("worker {index} is busy; join it before dispatching again");
        }
        mailbox.item = Some(item);
        mailbox.busy = true;
        drop(mailbox);

        slot.signal.notify_all();
        Ok(())
    }

    /// Block until worker `index` is idle and take back its processed item.
    ///
    /// Returns `None` if nothing was dispatched, the index is out of range, or
    /// the work function panicked on the item.
    pub fn join(&self, index: usize) -> Option<T> {
        let slot = self.slots.get(index)?;
        let mut mailbox = slot.lock();
        while mailbox.busy {
            mailbox = slot
                .signal
                .wait(mailbox)
                .unwrap_or_else(PoisonError::into_inner);
        }
        mailbox.item.take()
    }

    /// Join every worker in index order.
    pub fn join_all(&self) -> Vec<Option<T>> {
        (0..self.len()).map(|i| self.join(i)).collect()
    }
}

impl<T: Send + 'static> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.lock().shutdown = true;
            slot.signal.notify_all();
        }
        for (index, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                error!("worker {index} terminated abnormally");
            }
        }
    }
}

fn worker_loop<T, F>(index: usize, slot: &Slot<T>, f: &F)
where
    F: Fn(&mut T),
{
    loop {
        // Wait for work or shutdown; pending work is finished first
        let mut item = {
            let mut mailbox = slot.lock();
            loop {
                if mailbox.busy {
                    if let Some(item) = mailbox.item.take() {
                        break item;
                    }
                }
                if mailbox.shutdown {
                    return;
                }
                mailbox = slot
                    .signal
                    .wait(mailbox)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut item)));

        let mut mailbox = slot.lock();
        match outcome {
            Ok(()) => mailbox.item = Some(item),
            Err(_) => error!("worker {index} panicked while processing an item"),
        }
        mailbox.busy = false;
        drop(mailbox);
        slot.signal.notify_all();
    }
}
