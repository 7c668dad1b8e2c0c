//! Concurrent worker-pool scheduler
//!
//! One [`ConcurrentScheduler`] owns a fixed pool of worker threads, a live
//! processor→queue table, two staging lists, and a timer thread. Workers
//! cycle through: wait for the run gate, wait for the work counter, then
//! dispatch — draining one staged unregistration per wake with priority,
//! else bulk-committing all staged registrations, else advancing a private
//! round-robin cursor over the live table and popping one message.
//!
//! The work counter is a coarse semaphore: incremented once per enqueue,
//! registration, and unregistration. Table mutations take the exclusive
//! lock briefly; queue discovery takes the shared lock; the actual
//! `process_message` call runs outside every table lock, wrapped in a
//! lazily created per-processor mutex when the target is not threadsafe.
//!
//! Worker threads hold only the inner core; the outer handle signals
//! shutdown and joins them when dropped, so a scheduler's lifetime is its
//! owner's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::message::Message;
use crate::processor::MessageProcessor;
use crate::queue::SyncMessageQueue;
use crate::scheduler::{MessageScheduler, SchedulerError, SchedulerRegistry, TimerToken};
use crate::timer::TimerService;
use types::ProcessorId;

struct Entry {
    processor: Arc<dyn MessageProcessor>,
    queue: Arc<SyncMessageQueue>,
}

#[derive(Default)]
struct LiveTable {
    entries: HashMap<ProcessorId, Entry>,
    /// Round-robin iteration order; kept in registration order.
    order: Vec<ProcessorId>,
}

pub(crate) struct SchedulerCore {
    name: String,
    registry: Arc<dyn SchedulerRegistry>,
    detect_loops: bool,

    running: Mutex<bool>,
    run_cv: Condvar,
    work: Mutex<i64>,
    work_cv: Condvar,
    shutdown: AtomicBool,

    table: RwLock<LiveTable>,
    staged_registrations: Mutex<Vec<(ProcessorId, Entry)>>,
    staged_unregistrations: Mutex<Vec<ProcessorId>>,
    dispatch_locks: Mutex<HashMap<ProcessorId, Arc<Mutex<()>>>>,

    dest_cache: DashMap<ProcessorId, Weak<dyn MessageScheduler>>,
    src_cache: DashMap<ProcessorId, Weak<dyn MessageScheduler>>,

    dispatched: AtomicU64,
    dropped: AtomicU64,
}

impl SchedulerCore {
    fn add_work(&self, units: i64) {
        {
            let mut work = self.work.lock();
            *work += units;
        }
        if units == 1 {
            self.work_cv.notify_one();
        } else {
            self.work_cv.notify_all();
        }
    }

    /// Removes work units consumed beyond the one the waking worker already
    /// took, e.g. after a bulk registration commit.
    fn consume_extra_work(&self, units: i64) {
        let mut work = self.work.lock();
        *work = (*work - units).max(0);
    }

    fn is_live(&self, id: ProcessorId) -> bool {
        self.table.read().entries.contains_key(&id)
    }

    fn is_staged(&self, id: ProcessorId) -> bool {
        self.staged_registrations
            .lock()
            .iter()
            .any(|(sid, _)| *sid == id)
    }

    pub(crate) fn has_message_processor(&self, id: ProcessorId) -> bool {
        self.is_live(id) || self.is_staged(id)
    }

    fn register(&self, processor: Arc<dyn MessageProcessor>) -> Result<(), SchedulerError> {
        let id = processor.id();
        let live = self.is_live(id);
        let pending_removal = live && self.staged_unregistrations.lock().contains(&id);
        if live && !pending_removal {
            return Err(SchedulerError::AlreadyRegistered { id });
        }
        {
            let mut staged = self.staged_registrations.lock();
            if staged.iter().any(|(sid, _)| *sid == id) {
                return Err(SchedulerError::AlreadyRegistered { id });
            }
            debug!(
                scheduler = %self.name,
                processor = %id,
                name = %processor.name(),
                "registration staged"
            );
            staged.push((
                id,
                Entry {
                    processor,
                    queue: Arc::new(SyncMessageQueue::new()),
                },
            ));
        }
        self.add_work(1);
        Ok(())
    }

    fn unregister(&self, id: ProcessorId) -> Result<(), SchedulerError> {
        {
            let mut staged = self.staged_registrations.lock();
            if let Some(pos) = staged.iter().position(|(sid, _)| *sid == id) {
                let (_, entry) = staged.remove(pos);
                let pending = entry.queue.len();
                if pending > 0 {
                    debug!(
                        scheduler = %self.name,
                        processor = %id,
                        pending,
                        "staged registration withdrawn with queued messages"
                    );
                }
                // its staged work unit stays behind; workers tolerate an
                // empty wake
                return Ok(());
            }
        }
        if !self.is_live(id) {
            return Err(SchedulerError::UnknownMessageProcessor { id });
        }
        {
            let mut pending = self.staged_unregistrations.lock();
            if pending.contains(&id) {
                return Ok(());
            }
            debug!(scheduler = %self.name, processor = %id, "unregistration staged");
            pending.push(id);
        }
        self.add_work(1);
        Ok(())
    }

    pub(crate) fn send_message(&self, msg: Message) -> Result<(), SchedulerError> {
        let from = msg.from();
        let to = msg.to();

        let from_known = self.has_message_processor(from)
            || self.lookup_remote(&self.src_cache, from).is_some();
        if !from_known {
            return Err(SchedulerError::UnknownMessageProcessor { id: from });
        }

        {
            let table = self.table.read();
            if let Some(entry) = table.entries.get(&to) {
                entry.queue.push(msg);
                drop(table);
                self.add_work(1);
                return Ok(());
            }
        }
        {
            let staged = self.staged_registrations.lock();
            if let Some((_, entry)) = staged.iter().find(|(sid, _)| *sid == to) {
                // destination not committed yet; queue on the staged entry
                // so nothing is lost
                entry.queue.push(msg);
                drop(staged);
                self.add_work(1);
                return Ok(());
            }
        }
        if let Some(remote) = self.lookup_remote(&self.dest_cache, to) {
            trace!(
                scheduler = %self.name,
                to = %to,
                remote = remote.name(),
                "forwarding message to owning scheduler"
            );
            return remote.pass_message(msg);
        }
        Err(SchedulerError::UnknownMessageProcessor { id: to })
    }

    pub(crate) fn pass_message(&self, msg: Message) -> Result<(), SchedulerError> {
        let to = msg.to();
        if !self.has_message_processor(to) {
            return Err(SchedulerError::NotResponsible { id: to });
        }
        self.send_message(msg)
    }

    /// Memoized processor→scheduler resolution. Never called with any local
    /// lock held: the registry probes every scheduler, including this one.
    fn lookup_remote(
        &self,
        cache: &DashMap<ProcessorId, Weak<dyn MessageScheduler>>,
        id: ProcessorId,
    ) -> Option<Arc<dyn MessageScheduler>> {
        if let Some(cached) = cache.get(&id) {
            if let Some(scheduler) = cached.value().upgrade() {
                return Some(scheduler);
            }
        }
        let found = self.registry.lookup_scheduler(id)?;
        cache.insert(id, Arc::downgrade(&found));
        Some(found)
    }

    fn commit_registrations(&self, staged: Vec<(ProcessorId, Entry)>) {
        let mut table = self.table.write();
        for (id, entry) in staged {
            debug!(
                scheduler = %self.name,
                processor = %id,
                queued = entry.queue.len(),
                "processor registered"
            );
            if !table.order.contains(&id) {
                table.order.push(id);
            }
            table.entries.insert(id, entry);
        }
    }

    fn commit_unregistration(&self, id: ProcessorId) {
        let removed = {
            let mut table = self.table.write();
            table.order.retain(|pid| *pid != id);
            table.entries.remove(&id)
        };
        match removed {
            Some(entry) => {
                let drained = entry.queue.drain().len();
                if drained > 0 {
                    warn!(
                        scheduler = %self.name,
                        processor = %id,
                        drained,
                        "processor unregistered, pending messages dropped"
                    );
                } else {
                    debug!(scheduler = %self.name, processor = %id, "processor unregistered");
                }
                self.dispatch_locks.lock().remove(&id);
                self.dest_cache.remove(&id);
                self.src_cache.remove(&id);
            }
            None => {
                // staged unregistrations are validated against the live
                // table, so this cannot happen
                error!(scheduler = %self.name, processor = %id, "unregistration target vanished");
            }
        }
    }

    fn dispatch_lock(&self, id: ProcessorId) -> Arc<Mutex<()>> {
        self.dispatch_locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn dispatch(&self, owner: ProcessorId, processor: Arc<dyn MessageProcessor>, mut msg: Message) {
        assert!(
            msg.to() == owner,
            "popped message addressed to {} from queue owned by {owner}",
            msg.to()
        );
        if self.detect_loops && msg.record_visit(owner) {
            warn!(
                scheduler = %self.name,
                processor = %owner,
                "message revisited a processor, possible dispatch loop"
            );
        }

        let kind = msg.kind();
        let from = msg.from();
        let stale = msg.is_flow_stale();

        let result = if processor.is_threadsafe() {
            processor.process_message(msg)
        } else {
            let lock = self.dispatch_lock(owner);
            let _serial = lock.lock();
            processor.process_message(msg)
        };

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = result {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if stale {
                // expected race on a dying flow, not a bug
                debug!(
                    scheduler = %self.name,
                    from = %from,
                    to = %owner,
                    kind = ?kind,
                    error = %err,
                    "message dropped (flow already stale)"
                );
            } else {
                warn!(
                    scheduler = %self.name,
                    from = %from,
                    to = %owner,
                    kind = ?kind,
                    error = %err,
                    "message dropped"
                );
            }
        }
    }
}

fn worker_loop(core: Arc<SchedulerCore>, worker: usize) {
    let mut cursor: usize = 0;
    loop {
        {
            let mut running = core.running.lock();
            while !*running {
                if core.shutdown.load(Ordering::Acquire) {
                    return;
                }
                core.run_cv.wait(&mut running);
            }
        }
        {
            let mut work = core.work.lock();
            while *work == 0 {
                if core.shutdown.load(Ordering::Acquire) {
                    return;
                }
                core.work_cv.wait(&mut work);
            }
            *work -= 1;
        }
        if core.shutdown.load(Ordering::Acquire) {
            return;
        }

        // staged unregistrations win every wake
        let next_removal = core.staged_unregistrations.lock().pop();
        if let Some(id) = next_removal {
            core.commit_unregistration(id);
            continue;
        }

        // then all staged registrations in one pass
        let staged: Vec<(ProcessorId, Entry)> = {
            let mut staged = core.staged_registrations.lock();
            staged.drain(..).collect()
        };
        if !staged.is_empty() {
            let extra = staged.len() as i64 - 1;
            core.commit_registrations(staged);
            if extra > 0 {
                core.consume_extra_work(extra);
            }
            continue;
        }

        // otherwise dispatch one message, round-robin from this worker's
        // private cursor
        let found = {
            let table = core.table.read();
            let n = table.order.len();
            let mut found = None;
            for step in 1..=n {
                let idx = (cursor + step) % n;
                let id = table.order[idx];
                if let Some(entry) = table.entries.get(&id) {
                    if let Some(msg) = entry.queue.pop() {
                        cursor = idx;
                        found = Some((id, entry.processor.clone(), msg));
                        break;
                    }
                }
            }
            found
        };
        match found {
            Some((owner, processor, msg)) => core.dispatch(owner, processor, msg),
            // the counter overcounts when an unregistration drained a queue
            // or a staged registration was withdrawn; drop the unit
            None => trace!(scheduler = %core.name, worker, "wake found no dispatchable work"),
        }
    }
}

/// Builder for [`ConcurrentScheduler`].
pub struct ConcurrentSchedulerBuilder {
    name: String,
    workers: usize,
    registry: Arc<dyn SchedulerRegistry>,
    detect_loops: bool,
}

impl ConcurrentSchedulerBuilder {
    /// Worker-thread count. Zero is a valid degenerate configuration where
    /// nothing dispatches until workers exist; one gives fully serial
    /// dispatch.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Enables the loop-detection diagnostic: workers record every dispatch
    /// in the message's visited trace and warn on revisits.
    pub fn detect_loops(mut self, enabled: bool) -> Self {
        self.detect_loops = enabled;
        self
    }

    pub fn build(self) -> Arc<ConcurrentScheduler> {
        let core = Arc::new(SchedulerCore {
            name: self.name,
            registry: self.registry,
            detect_loops: self.detect_loops,
            running: Mutex::new(false),
            run_cv: Condvar::new(),
            work: Mutex::new(0),
            work_cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            table: RwLock::new(LiveTable::default()),
            staged_registrations: Mutex::new(Vec::new()),
            staged_unregistrations: Mutex::new(Vec::new()),
            dispatch_locks: Mutex::new(HashMap::new()),
            dest_cache: DashMap::new(),
            src_cache: DashMap::new(),
            dispatched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let (timer, timer_thread) = TimerService::start(Arc::downgrade(&core), &core.name);

        let mut workers = Vec::with_capacity(self.workers);
        for index in 0..self.workers {
            let worker_core = core.clone();
            workers.push(std::thread::spawn(move || worker_loop(worker_core, index)));
        }
        info!(
            scheduler = %core.name,
            workers = self.workers,
            "scheduler started"
        );

        Arc::new(ConcurrentScheduler {
            core,
            timer,
            workers: Mutex::new(workers),
            timer_thread: Mutex::new(Some(timer_thread)),
        })
    }
}

/// Worker-pool scheduler. See the module docs for the dispatch discipline.
pub struct ConcurrentScheduler {
    core: Arc<SchedulerCore>,
    timer: TimerService,
    workers: Mutex<Vec<JoinHandle<()>>>,
    timer_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ConcurrentScheduler {
    pub fn builder(name: impl Into<String>, registry: Arc<dyn SchedulerRegistry>) -> ConcurrentSchedulerBuilder {
        ConcurrentSchedulerBuilder {
            name: name.into(),
            workers: 2,
            registry,
            detect_loops: false,
        }
    }

    /// Shorthand for the common case.
    pub fn spawn(
        name: impl Into<String>,
        workers: usize,
        registry: Arc<dyn SchedulerRegistry>,
    ) -> Arc<Self> {
        Self::builder(name, registry).workers(workers).build()
    }

    /// Messages handed to `process_message` so far.
    pub fn dispatched_messages(&self) -> u64 {
        self.core.dispatched.load(Ordering::Relaxed)
    }

    /// Messages dropped because a dispatch hook reported an error.
    pub fn dropped_messages(&self) -> u64 {
        self.core.dropped.load(Ordering::Relaxed)
    }

    /// Signals every thread and joins them. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.core.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        // take each mutex once so no worker misses the flag between its
        // check and its wait
        drop(self.core.running.lock());
        self.core.run_cv.notify_all();
        drop(self.core.work.lock());
        self.core.work_cv.notify_all();
        self.timer.shutdown();

        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.timer_thread.lock().take() {
            let _ = handle.join();
        }
        info!(
            scheduler = %self.core.name,
            dispatched = self.dispatched_messages(),
            dropped = self.dropped_messages(),
            "scheduler shut down"
        );
    }
}

impl Drop for ConcurrentScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl MessageScheduler for ConcurrentScheduler {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn register_message_processor(
        &self,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), SchedulerError> {
        self.core.register(processor)
    }

    fn unregister_message_processor(&self, id: ProcessorId) -> Result<(), SchedulerError> {
        self.core.unregister(id)
    }

    fn send_message(&self, msg: Message) -> Result<(), SchedulerError> {
        self.core.send_message(msg)
    }

    fn set_timer(&self, delay: Duration, msg: Message) -> Result<TimerToken, SchedulerError> {
        assert!(
            msg.kind() == crate::message::MessageKind::Timer,
            "set_timer requires a Timer message, got {:?}",
            msg.kind()
        );
        self.timer.set(delay, msg)
    }

    fn cancel_timer(&self, token: TimerToken) {
        self.timer.cancel(token);
    }

    fn run(&self) {
        {
            let mut running = self.core.running.lock();
            *running = true;
        }
        self.core.run_cv.notify_all();
        debug!(scheduler = %self.core.name, "run gate opened");
    }

    fn stop(&self) {
        {
            let mut running = self.core.running.lock();
            *running = false;
        }
        debug!(scheduler = %self.core.name, "run gate closed");
    }

    fn has_message_processor(&self, id: ProcessorId) -> bool {
        self.core.has_message_processor(id)
    }

    fn pass_message(&self, msg: Message) -> Result<(), SchedulerError> {
        self.core.pass_message(msg)
    }
}
