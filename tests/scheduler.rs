use async_trait::async_trait;
use chrono::{FixedOffset, TimeZone};
use leiriposti::config::SchedulerConfig;
use leiriposti::scheduler::QueueSnapshot;
use leiriposti::{
    DeviceError, DeviceGateway, JobHandle, MessageContent, MessageHandle, MessageStatus, MessageStore,
    RenderedDocument, Scheduler, SchedulerError, SchedulerEvent, SimulatedOutcome, SimulatedPrinter,
    StartOutcome, Transition,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn content(subject: &str, hour: u32) -> MessageContent {
    MessageContent {
        recipient: "Eero".to_string(),
        subject: subject.to_string(),
        body: "Terveisiä kotoa".to_string(),
        author: "Äiti".to_string(),
        timestamp: FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 6, 9, hour, 0, 0)
            .unwrap(),
    }
}

fn setup(printer: SimulatedPrinter) -> (MessageStore, Scheduler, Arc<SimulatedPrinter>) {
    let store = MessageStore::new();
    let scheduler = Scheduler::new(&SchedulerConfig::default());
    let printer = Arc::new(printer);
    scheduler.set_device(Some(printer.clone()));
    (store, scheduler, printer)
}

fn queue_letters(store: &MessageStore, scheduler: &Scheduler, subjects: &[&str]) -> Vec<MessageHandle> {
    subjects
        .iter()
        .enumerate()
        .map(|(i, subject)| {
            let record = store.insert(content(subject, 8 + i as u32));
            assert!(scheduler.enqueue(&record).is_applied());
            record
        })
        .collect()
}

/// Collect events until the worker run ends.
async fn until_terminal(events: &mut broadcast::Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            let done = event.is_terminal();
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .expect("worker did not finish");
    seen
}

async fn until_progress(events: &mut broadcast::Receiver<SchedulerEvent>, subject: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let SchedulerEvent::Progress { subject: s, .. } = events.recv().await.unwrap() {
                if s == subject {
                    break;
                }
            }
        }
    })
    .await
    .expect("no progress event");
}

fn drained_count(events: &[SchedulerEvent]) -> usize {
    events.iter().filter(|e| **e == SchedulerEvent::QueueDrained).count()
}

#[tokio::test]
async fn test_failure_does_not_stop_the_batch() {
    let (store, scheduler, printer) = setup(
        SimulatedPrinter::new("sim", Duration::from_millis(10)).with_script([
            SimulatedOutcome::Complete,
            SimulatedOutcome::Fail,
            SimulatedOutcome::Complete,
        ]),
    );
    let bystander = store.insert(content("Sunday letter", 20));
    let records = queue_letters(&store, &scheduler, &["Monday letter", "Tuesday letter", "Wednesday letter"]);
    let mut events = scheduler.subscribe();

    assert_eq!(scheduler.start().unwrap(), StartOutcome::Started);
    let seen = until_terminal(&mut events).await;
    scheduler.wait_until_idle().await;

    assert_eq!(records[0].status(), MessageStatus::Printed);
    assert_eq!(records[1].status(), MessageStatus::Error);
    assert_eq!(records[2].status(), MessageStatus::Printed);
    assert_eq!(bystander.status(), MessageStatus::NotPrinted);
    assert_eq!(scheduler.queue_len(), 0);
    assert_eq!(drained_count(&seen), 1);
    assert_eq!(printer.submitted_titles().len(), 3);
    assert!(!scheduler.is_active());
}

#[tokio::test]
async fn test_fifo_order_and_one_job_at_a_time() {
    let (store, scheduler, printer) = setup(SimulatedPrinter::new("sim", Duration::from_millis(5)));
    let subjects = ["a", "b", "c", "d", "e"];
    queue_letters(&store, &scheduler, &subjects);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    let seen = until_terminal(&mut events).await;

    assert_eq!(printer.submitted_titles(), subjects);
    assert_eq!(printer.max_outstanding(), 1);
    let last_progress = seen.iter().rev().find_map(|e| match e {
        SchedulerEvent::Progress { fraction, .. } => Some(*fraction),
        _ => None,
    });
    assert_eq!(last_progress, Some(1.0));
    assert_eq!(seen.first(), Some(&SchedulerEvent::Started { total: 5 }));
}

#[tokio::test]
async fn test_start_without_device_fails() {
    let store = MessageStore::new();
    let scheduler = Scheduler::new(&SchedulerConfig::default());
    queue_letters(&store, &scheduler, &["a"]);
    assert!(matches!(scheduler.start(), Err(SchedulerError::DeviceNotConfigured)));
    assert_eq!(scheduler.queue_len(), 1);
}

#[tokio::test]
async fn test_start_is_a_no_op_when_empty_or_running() {
    let (store, scheduler, printer) =
        setup(SimulatedPrinter::new("sim", Duration::ZERO).with_script([SimulatedOutcome::Hang]));
    assert_eq!(scheduler.start().unwrap(), StartOutcome::QueueEmpty);

    let records = queue_letters(&store, &scheduler, &["a", "b"]);
    let mut events = scheduler.subscribe();
    assert_eq!(scheduler.start().unwrap(), StartOutcome::Started);
    until_progress(&mut events, "a").await;
    assert_eq!(scheduler.start().unwrap(), StartOutcome::AlreadyRunning);
    assert!(scheduler.is_active());

    assert_eq!(printer.release_hung(), 1);
    let seen = until_terminal(&mut events).await;
    assert_eq!(drained_count(&seen), 1);
    assert!(records.iter().all(|r| r.status() == MessageStatus::Printed));
    assert_eq!(printer.max_outstanding(), 1);
}

#[tokio::test]
async fn test_pause_finishes_current_job_then_stops() {
    let (store, scheduler, _printer) = setup(SimulatedPrinter::new("sim", Duration::from_millis(50)));
    let records = queue_letters(&store, &scheduler, &["a", "b", "c"]);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    until_progress(&mut events, "a").await;
    scheduler.pause().await;

    assert!(!scheduler.is_active());
    assert!(scheduler.in_flight().is_none());
    assert_eq!(records[0].status(), MessageStatus::Printed);
    assert_eq!(records[1].status(), MessageStatus::Queued);
    assert_eq!(records[2].status(), MessageStatus::Queued);
    assert_eq!(scheduler.queue_len(), 2);
    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&SchedulerEvent::Paused));

    assert_eq!(scheduler.resume().unwrap(), StartOutcome::Started);
    let seen = until_terminal(&mut events).await;
    assert_eq!(drained_count(&seen), 1);
    assert!(records.iter().all(|r| r.status() == MessageStatus::Printed));
}

#[tokio::test]
async fn test_printing_record_is_immune_to_caller_changes() {
    let (store, scheduler, printer) =
        setup(SimulatedPrinter::new("sim", Duration::ZERO).with_script([SimulatedOutcome::Hang]));
    let records = queue_letters(&store, &scheduler, &["a"]);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    until_progress(&mut events, "a").await;
    let a = &records[0];
    assert_eq!(a.status(), MessageStatus::Printing);
    assert_eq!(scheduler.dequeue(a), Transition::Refused { current: MessageStatus::Printing });
    assert_eq!(
        scheduler.set_status(a, MessageStatus::Removed),
        Transition::Refused { current: MessageStatus::Printing }
    );
    assert!(!scheduler.remove(a));
    assert_eq!(a.status(), MessageStatus::Printing);

    printer.release_hung();
    until_terminal(&mut events).await;
    assert_eq!(a.status(), MessageStatus::Printed);
}

#[tokio::test]
async fn test_shutdown_interrupts_in_flight_job() {
    let (store, scheduler, _printer) =
        setup(SimulatedPrinter::new("sim", Duration::ZERO).with_script([SimulatedOutcome::Hang]));
    let records = queue_letters(&store, &scheduler, &["a", "b"]);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    until_progress(&mut events, "a").await;
    scheduler.shutdown().await;

    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&SchedulerEvent::Interrupted));
    assert_eq!(drained_count(&seen), 0);
    assert_eq!(records[0].status(), MessageStatus::Error);
    assert_eq!(records[1].status(), MessageStatus::Queued);
    assert!(!scheduler.is_active());
}

#[tokio::test]
async fn test_cancelled_job_stops_the_worker() {
    let (store, scheduler, _printer) =
        setup(SimulatedPrinter::new("sim", Duration::ZERO).with_script([SimulatedOutcome::Cancel]));
    let records = queue_letters(&store, &scheduler, &["a", "b"]);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&SchedulerEvent::Interrupted));
    assert_eq!(records[0].status(), MessageStatus::Error);
    assert_eq!(records[1].status(), MessageStatus::Queued);
}

#[tokio::test]
async fn test_unavailable_device_keeps_the_queue() {
    let (store, scheduler, printer) =
        setup(SimulatedPrinter::new("sim", Duration::ZERO).with_script([SimulatedOutcome::Unavailable]));
    let records = queue_letters(&store, &scheduler, &["a", "b"]);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    let seen = until_terminal(&mut events).await;
    assert!(matches!(seen.last(), Some(SchedulerEvent::DeviceUnavailable { .. })));
    assert_eq!(records[0].status(), MessageStatus::Queued);
    assert_eq!(scheduler.queued(), records);
    scheduler.wait_until_idle().await;

    scheduler.start().unwrap();
    until_terminal(&mut events).await;
    assert!(records.iter().all(|r| r.status() == MessageStatus::Printed));
    assert_eq!(printer.submitted_titles(), vec!["a", "a", "b"]);
}

#[tokio::test]
async fn test_rejected_submission_marks_error_and_continues() {
    let (store, scheduler, _printer) =
        setup(SimulatedPrinter::new("sim", Duration::ZERO).with_script([SimulatedOutcome::Reject]));
    let records = queue_letters(&store, &scheduler, &["a", "b"]);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    let seen = until_terminal(&mut events).await;
    assert_eq!(drained_count(&seen), 1);
    assert_eq!(records[0].status(), MessageStatus::Error);
    assert_eq!(records[1].status(), MessageStatus::Printed);
}

#[tokio::test]
async fn test_remove_only_applies_to_queued_records() {
    let (store, scheduler, _printer) = setup(SimulatedPrinter::new("sim", Duration::ZERO));
    let records = queue_letters(&store, &scheduler, &["a", "b"]);
    let loose = store.insert(content("c", 12));

    assert!(scheduler.remove(&records[0]));
    assert_eq!(records[0].status(), MessageStatus::NotPrinted);
    assert_eq!(scheduler.queue_len(), 1);
    assert!(!scheduler.remove(&loose));
    assert!(!scheduler.remove(&records[0]));
}

#[tokio::test]
async fn test_status_by_name() {
    let (store, scheduler, _printer) = setup(SimulatedPrinter::new("sim", Duration::ZERO));
    let record = store.insert(content("a", 8));
    assert!(matches!(
        scheduler.set_status_named(&record, "ALL"),
        Err(SchedulerError::InvalidArgument(_))
    ));
    assert!(matches!(
        scheduler.set_status_named(&record, "LOST"),
        Err(SchedulerError::InvalidArgument(_))
    ));
    assert_eq!(scheduler.set_status_named(&record, "queued").unwrap(), Transition::Applied);
    assert_eq!(scheduler.queue_len(), 1);
}

#[tokio::test]
async fn test_snapshot_restores_the_same_order() {
    let (store, scheduler, _printer) = setup(SimulatedPrinter::new("sim", Duration::ZERO));
    let records = queue_letters(&store, &scheduler, &["a", "b", "c", "d"]);
    let _ = scheduler.dequeue(&records[1]);
    let snapshot = scheduler.snapshot();
    assert_eq!(snapshot.len(), 3);

    let json = serde_json::to_string(&snapshot).unwrap();
    let snapshot: QueueSnapshot = serde_json::from_str(&json).unwrap();

    let fresh_store = MessageStore::new();
    let fresh = Scheduler::new(&SchedulerConfig::default());
    assert_eq!(fresh.restore(&snapshot, &fresh_store), 3);
    let subjects: Vec<String> = fresh.queued().iter().map(|r| r.subject().to_string()).collect();
    assert_eq!(subjects, vec!["a", "c", "d"]);
    assert!(fresh.queued().iter().all(|r| r.status() == MessageStatus::Queued));
    assert!(!fresh.is_active());
}

#[tokio::test]
async fn test_pause_during_last_job_still_drains() {
    let (store, scheduler, _printer) = setup(SimulatedPrinter::new("sim", Duration::from_millis(50)));
    let records = queue_letters(&store, &scheduler, &["a"]);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    until_progress(&mut events, "a").await;
    scheduler.pause().await;

    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&SchedulerEvent::QueueDrained));
    assert_eq!(records[0].status(), MessageStatus::Printed);
    assert_eq!(scheduler.queue_len(), 0);
    assert!(!scheduler.is_active());
    assert_eq!(scheduler.resume().unwrap(), StartOutcome::QueueEmpty);
}

#[tokio::test]
async fn test_queue_edits_while_printing() {
    let (store, scheduler, printer) =
        setup(SimulatedPrinter::new("sim", Duration::ZERO).with_script([SimulatedOutcome::Hang]));
    let records = queue_letters(&store, &scheduler, &["a", "b", "c"]);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    until_progress(&mut events, "a").await;

    let editor = {
        let scheduler = scheduler.clone();
        let store = store.clone();
        let b = records[1].clone();
        tokio::spawn(async move {
            assert!(scheduler.dequeue(&b).is_applied());
            let d = store.insert(content("d", 12));
            assert!(scheduler.enqueue(&d).is_applied());
            d
        })
    };
    let d = editor.await.unwrap();

    assert_eq!(printer.release_hung(), 1);
    let seen = until_terminal(&mut events).await;
    assert_eq!(drained_count(&seen), 1);
    assert_eq!(printer.submitted_titles(), vec!["a", "c", "d"]);
    assert_eq!(records[1].status(), MessageStatus::NotPrinted);
    assert_eq!(d.status(), MessageStatus::Printed);
    assert_eq!(printer.max_outstanding(), 1);
}

/// A device driver that panics on every submission.
struct BrokenPrinter;

#[async_trait]
impl DeviceGateway for BrokenPrinter {
    fn name(&self) -> &str {
        "broken"
    }

    async fn submit(&self, _document: RenderedDocument) -> Result<Box<dyn JobHandle>, DeviceError> {
        panic!("driver crashed");
    }
}

#[tokio::test]
async fn test_panicking_device_does_not_wedge_the_scheduler() {
    let store = MessageStore::new();
    let scheduler = Scheduler::new(&SchedulerConfig::default());
    scheduler.set_device(Some(Arc::new(BrokenPrinter)));
    let records = queue_letters(&store, &scheduler, &["a", "b"]);
    let mut events = scheduler.subscribe();

    scheduler.start().unwrap();
    let seen = until_terminal(&mut events).await;
    assert_eq!(seen.last(), Some(&SchedulerEvent::Interrupted));
    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_until_idle())
        .await
        .expect("scheduler stayed busy");

    assert_eq!(records[0].status(), MessageStatus::Error);
    assert_eq!(records[1].status(), MessageStatus::Queued);
    assert!(scheduler.in_flight().is_none());
    assert!(!scheduler.is_active());
    assert!(scheduler.set_status(&records[0], MessageStatus::NotPrinted).is_applied());
}
