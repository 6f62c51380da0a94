//! S3: queued delivery preserves order under normal load and drops the
//! oldest entries, not the newest, once the ring overflows.

use crate::queue_sink::QueueSinkAdapter;
use crate::record::Record;
use crate::severity::Severity;
use crate::sink::Sink;
use crate::sinks::collecting::CollectingSink;
use std::sync::Arc;

fn record(seq: u64, body: &str) -> Record {
    let r = Record::new_heap();
    r.with_message_mut(|m| {
        m.set_body(body);
        m.set_severity(Severity::Info);
    });
    r.mark_emitted(seq);
    r
}

#[test]
fn s3_queued_delivery_preserves_order_and_flush_waits_for_it() {
    let target = Arc::new(CollectingSink::new("t"));
    let adapter = QueueSinkAdapter::new(target.clone(), 1024, 100);

    for i in 1..=50u64 {
        adapter.handle(record(i, &format!("msg-{i}")));
    }
    adapter.flush();

    let expected: Vec<String> = (1..=50).map(|i| format!("msg-{i}")).collect();
    assert_eq!(target.bodies(), expected);
    adapter.shutdown();
}

#[test]
fn s3_overflow_drops_oldest_not_newest() {
    let target = Arc::new(CollectingSink::new("t"));
    let adapter = QueueSinkAdapter::new(target.clone(), 4, 1_000_000);

    for i in 1..=10u64 {
        adapter.handle(record(i, &format!("msg-{i}")));
    }
    adapter.flush();

    let bodies = target.bodies();
    let delivered_indices: Vec<u64> = bodies
        .iter()
        .map(|b| b.strip_prefix("msg-").unwrap().parse().unwrap())
        .collect();

    assert_eq!(
        adapter.total_dropped(),
        10 - delivered_indices.len() as u64,
        "every record is either delivered or counted as dropped, with nothing double-counted"
    );
    assert_eq!(*delivered_indices.last().unwrap(), 10, "the newest record must never be the one dropped");
    for pair in delivered_indices.windows(2) {
        assert!(pair[0] < pair[1], "dropping the oldest entries must leave a strictly increasing subsequence, got {delivered_indices:?}");
    }
    adapter.shutdown();
}
