//! Shared fixtures for end-to-end scenarios: a payload-collecting
//! application connector and an echoing network adapter, both running on
//! real schedulers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use runtime::{Message, MessageProcessor, MessageScheduler, ProcessorBase, ProcessorError};

/// Application endpoint that collects every payload delivered up the
/// incoming direction.
pub struct SinkConnector {
    base: ProcessorBase,
    delivered: Mutex<Vec<Vec<u8>>>,
}

impl SinkConnector {
    pub fn new(scheduler: &Arc<dyn MessageScheduler>) -> Arc<Self> {
        Arc::new(SinkConnector {
            base: ProcessorBase::with_component_uri(scheduler, "app://netweave/test-sink"),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.delivered.lock().clone()
    }

    /// Polls until `count` payloads arrived or the timeout elapses.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.delivered.lock().len() < count {
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl MessageProcessor for SinkConnector {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "SinkConnector"
    }

    fn process_incoming(&self, msg: Message) -> Result<(), ProcessorError> {
        debug!(len = msg.payload().len(), "sink received payload");
        self.delivered.lock().push(msg.payload().to_vec());
        Ok(())
    }
}

/// Network endpoint that reflects every outgoing message back up the
/// incoming direction, standing in for a remote peer with an identical
/// stack.
pub struct EchoAdapter {
    base: ProcessorBase,
}

impl EchoAdapter {
    pub fn new(scheduler: &Arc<dyn MessageScheduler>) -> Arc<Self> {
        Arc::new(EchoAdapter {
            base: ProcessorBase::with_component_uri(scheduler, "net://netweave/test-echo"),
        })
    }
}

impl MessageProcessor for EchoAdapter {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "EchoAdapter"
    }

    fn is_threadsafe(&self) -> bool {
        true
    }

    fn process_outgoing(&self, msg: Message) -> Result<(), ProcessorError> {
        let Some(prev) = self.base.prev() else {
            return Err(ProcessorError::Protocol {
                detail: "echo adapter has no upstream neighbor wired".to_owned(),
            });
        };
        let reply = Message::incoming(self.id(), prev, msg.into_payload());
        self.send_message(reply)?;
        Ok(())
    }
}
