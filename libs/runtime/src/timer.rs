//! One-shot timer service
//!
//! Each scheduler owns one timer thread. Arming a timer stores the pending
//! Timer message under a fresh token and pushes the deadline to the thread,
//! which sleeps on a select over its command channel and the earliest
//! deadline. On expiry the token→message mapping is removed and the message
//! re-injected through the normal `send_message` path, so timer delivery
//! observes the same ordering and concurrency rules as any other traffic.
//!
//! Cancellation removes the mapping only; a deadline whose token is no
//! longer mapped fires into nothing. That makes cancel-before-fire a
//! guaranteed non-delivery and cancel-after-fire a no-op.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{at, never, unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::concurrent::SchedulerCore;
use crate::message::Message;
use crate::scheduler::{SchedulerError, TimerToken};

enum TimerCmd {
    Schedule { token: TimerToken, deadline: Instant },
    Shutdown,
}

pub(crate) struct TimerService {
    tx: Sender<TimerCmd>,
    pending: Arc<Mutex<HashMap<TimerToken, Message>>>,
    next_token: AtomicU64,
}

impl TimerService {
    /// Starts the deadline thread. It holds only a weak core handle so a
    /// dropped scheduler tears the thread down on its next wake.
    pub(crate) fn start(core: Weak<SchedulerCore>, name: &str) -> (Self, JoinHandle<()>) {
        let (tx, rx) = unbounded::<TimerCmd>();
        let pending: Arc<Mutex<HashMap<TimerToken, Message>>> = Arc::new(Mutex::new(HashMap::new()));

        let thread_pending = pending.clone();
        let thread_name = name.to_owned();
        let handle = std::thread::spawn(move || {
            let mut deadlines: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();
            loop {
                let wakeup = match deadlines.peek() {
                    Some(Reverse((deadline, _))) => at(*deadline),
                    None => never(),
                };
                crossbeam_channel::select! {
                    recv(rx) -> cmd => match cmd {
                        Ok(TimerCmd::Schedule { token, deadline }) => {
                            deadlines.push(Reverse((deadline, token.raw())));
                        }
                        Ok(TimerCmd::Shutdown) | Err(_) => {
                            debug!(scheduler = %thread_name, "timer thread shutting down");
                            return;
                        }
                    },
                    recv(wakeup) -> _ => {
                        let now = Instant::now();
                        while let Some(Reverse((deadline, raw))) = deadlines.peek().copied() {
                            if deadline > now {
                                break;
                            }
                            deadlines.pop();
                            let token = TimerToken::new(raw);
                            let fired = thread_pending.lock().remove(&token);
                            let Some(msg) = fired else {
                                // canceled before the deadline
                                trace!(scheduler = %thread_name, ?token, "expired timer was canceled");
                                continue;
                            };
                            let Some(core) = core.upgrade() else {
                                return;
                            };
                            if let Err(err) = core.send_message(msg) {
                                warn!(
                                    scheduler = %thread_name,
                                    ?token,
                                    error = %err,
                                    "timer delivery failed"
                                );
                            }
                        }
                    },
                }
            }
        });

        (
            TimerService {
                tx,
                pending,
                next_token: AtomicU64::new(1),
            },
            handle,
        )
    }

    pub(crate) fn set(&self, delay: Duration, msg: Message) -> Result<TimerToken, SchedulerError> {
        let token = TimerToken::new(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().insert(token, msg);
        let cmd = TimerCmd::Schedule {
            token,
            deadline: Instant::now() + delay,
        };
        if self.tx.send(cmd).is_err() {
            self.pending.lock().remove(&token);
            return Err(SchedulerError::ShuttingDown);
        }
        Ok(token)
    }

    pub(crate) fn cancel(&self, token: TimerToken) {
        if self.pending.lock().remove(&token).is_some() {
            trace!(?token, "timer canceled before firing");
        }
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(TimerCmd::Shutdown);
    }
}
