//! Full crypt-test stacks on live schedulers: pad and CRC blocks between a
//! collecting connector and an echoing adapter, in one- and two-scheduler
//! arrangements.

use std::sync::Arc;
use std::time::Duration;

use codec::PayloadBuffer;
use netlets::blocks::{CrcBlock, FragBlock, HeaderBlock, PadBlock};
use netlets::Netlet;
use netweave_e2e_tests::{EchoAdapter, SinkConnector};
use runtime::{
    ConcurrentScheduler, LocalRegistry, Message, MessageProcessor, MessageScheduler,
    ProcessorBase, ProcessorError, SchedulerRegistry,
};

const WAIT: Duration = Duration::from_secs(5);

fn spawn_scheduler(
    name: &str,
    registry: &Arc<LocalRegistry>,
) -> (Arc<ConcurrentScheduler>, Arc<dyn MessageScheduler>) {
    let scheduler =
        ConcurrentScheduler::spawn(name, 2, registry.clone() as Arc<dyn SchedulerRegistry>);
    let dynamic: Arc<dyn MessageScheduler> = scheduler.clone();
    registry.add_scheduler(&dynamic);
    (scheduler, dynamic)
}

fn inject(connector: &SinkConnector, payload: &[u8]) {
    let first = connector.base().next().unwrap();
    let msg = Message::outgoing(connector.id(), first, PayloadBuffer::from_slice(payload));
    connector.send_message(msg).unwrap();
}

#[test]
fn crypt_test_stack_round_trips_byte_exactly() {
    let registry = Arc::new(LocalRegistry::new());
    let (scheduler, dynamic) = spawn_scheduler("stack", &registry);

    let connector = SinkConnector::new(&dynamic);
    let adapter = EchoAdapter::new(&dynamic);
    // the full crypt-test chain; the 1000-byte payload below spans several
    // fragments, so reassembly runs under real worker interleaving
    let netlet = Netlet::builder("netlet://netweave/crypt-test")
        .block("frag", FragBlock::new(&dynamic))
        .block("pad", PadBlock::new(&dynamic))
        .block("header", HeaderBlock::new(&dynamic))
        .block("crc", CrcBlock::new(&dynamic))
        .connector(connector.clone())
        .multiplexer(adapter.clone())
        .build()
        .unwrap();
    netlet.rewire().unwrap();

    dynamic.register_message_processor(connector.clone()).unwrap();
    dynamic.register_message_processor(adapter.clone()).unwrap();
    netlet.register_blocks(&dynamic).unwrap();
    dynamic.run();

    let payloads: Vec<Vec<u8>> = vec![
        b"hello".to_vec(),
        Vec::new(),
        (0u8..=255).collect(),
        vec![0x00; 16],
        b"a".repeat(1000),
    ];
    for payload in &payloads {
        inject(&connector, payload);
    }

    assert!(connector.wait_for(payloads.len(), WAIT));
    let mut delivered = connector.delivered();
    let mut expected = payloads.clone();
    delivered.sort();
    expected.sort();
    assert_eq!(delivered, expected);
    assert_eq!(scheduler.dropped_messages(), 0);

    scheduler.shutdown();
}

/// Flips one bit of everything it reflects. The CRC block on the incoming
/// path must reject every reflected payload.
struct CorruptingAdapter {
    base: ProcessorBase,
}

impl MessageProcessor for CorruptingAdapter {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn class_name(&self) -> &'static str {
        "CorruptingAdapter"
    }

    fn process_outgoing(&self, msg: Message) -> Result<(), ProcessorError> {
        let prev = self.base.prev().ok_or_else(|| ProcessorError::Protocol {
            detail: "corrupting adapter has no upstream neighbor wired".to_owned(),
        })?;
        let mut raw = msg.into_payload().to_vec();
        raw[0] ^= 0x80;
        let reply = Message::incoming(self.id(), prev, PayloadBuffer::from_slice(&raw));
        self.send_message(reply)?;
        Ok(())
    }
}

#[test]
fn corrupted_wire_bytes_never_reach_the_application() {
    let registry = Arc::new(LocalRegistry::new());
    let (scheduler, dynamic) = spawn_scheduler("corrupt", &registry);

    let connector = SinkConnector::new(&dynamic);
    let adapter = Arc::new(CorruptingAdapter {
        base: ProcessorBase::new(&dynamic),
    });
    let netlet = Netlet::builder("netlet://netweave/corrupt-test")
        .block("pad", PadBlock::new(&dynamic))
        .block("crc", CrcBlock::new(&dynamic))
        .connector(connector.clone())
        .multiplexer(adapter.clone())
        .build()
        .unwrap();
    netlet.rewire().unwrap();

    dynamic.register_message_processor(connector.clone()).unwrap();
    dynamic.register_message_processor(adapter.clone()).unwrap();
    netlet.register_blocks(&dynamic).unwrap();
    dynamic.run();

    inject(&connector, b"tamper with me");

    // the CRC block drops the reflected message; wait for the drop counter
    // rather than a delivery that must never happen
    let deadline = std::time::Instant::now() + WAIT;
    while scheduler.dropped_messages() == 0 {
        assert!(std::time::Instant::now() < deadline, "corrupt message was not dropped");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(connector.delivered().is_empty());

    scheduler.shutdown();
}

#[test]
fn stack_split_across_two_schedulers_still_round_trips() {
    let registry = Arc::new(LocalRegistry::new());
    let (sched_app, dyn_app) = spawn_scheduler("app-side", &registry);
    let (sched_net, dyn_net) = spawn_scheduler("net-side", &registry);

    let connector = SinkConnector::new(&dyn_app);
    let pad = PadBlock::new(&dyn_app);
    let crc = CrcBlock::new(&dyn_net);
    let adapter = EchoAdapter::new(&dyn_net);

    let netlet = Netlet::builder("netlet://netweave/split-test")
        .block("pad", pad.clone())
        .block("crc", crc.clone())
        .connector(connector.clone())
        .multiplexer(adapter.clone())
        .build()
        .unwrap();
    netlet.rewire().unwrap();

    // application half on one scheduler, network half on the other
    dyn_app.register_message_processor(connector.clone()).unwrap();
    dyn_app.register_message_processor(pad).unwrap();
    dyn_net.register_message_processor(crc).unwrap();
    dyn_net.register_message_processor(adapter).unwrap();
    dyn_app.run();
    dyn_net.run();

    for i in 0..20u8 {
        inject(&connector, &[i; 24]);
    }
    assert!(connector.wait_for(20, WAIT));

    let delivered = connector.delivered();
    assert_eq!(delivered.len(), 20);
    for payload in &delivered {
        assert_eq!(payload.len(), 24);
        assert!(payload.iter().all(|b| *b == payload[0]));
    }
    assert_eq!(sched_app.dropped_messages(), 0);
    assert_eq!(sched_net.dropped_messages(), 0);

    sched_app.shutdown();
    sched_net.shutdown();
}
