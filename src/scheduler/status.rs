//! Status state machine for message records.
//!
//! Every status write goes through [`apply`], called with the scheduler lock held, so the
//! print queue and the record statuses always agree: a record is `QUEUED` exactly when it is
//! in the queue.

use crate::message::MessageHandle;
use crate::scheduler::queue::PrintQueue;
use leiriposti_shared::MessageStatus;

/// Result of a status change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Transition {
    Applied,
    /// The record is being printed and the change was not made.
    Refused { current: MessageStatus },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// Who is asking. The worker owns records while they print; callers do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Actor {
    Caller,
    Worker,
}

pub(crate) fn apply(
    queue: &mut PrintQueue,
    record: &MessageHandle,
    target: MessageStatus,
    actor: Actor,
    allow_override: bool,
) -> Transition {
    let current = record.status();

    if current == MessageStatus::Printing && actor == Actor::Caller && !allow_override {
        tracing::warn!(
            "Refusing {} -> {} for '{}': record is being printed",
            current,
            target,
            record.subject()
        );
        return Transition::Refused { current };
    }

    match target {
        MessageStatus::Queued => {
            if queue.enqueue(record.clone()) {
                tracing::debug!("Queued '{}' ({} in queue)", record.subject(), queue.len());
            }
        }
        _ => {
            // Leaving QUEUED by any route takes the record out of the queue.
            if queue.remove(record) {
                tracing::debug!("Dequeued '{}' ({} in queue)", record.subject(), queue.len());
            }
        }
    }

    record.set_status(target);
    Transition::Applied
}

/// Put a record whose submission could not be made back at the head of the queue.
pub(crate) fn requeue_front(queue: &mut PrintQueue, record: &MessageHandle) {
    queue.requeue_front(record.clone());
    record.set_status(MessageStatus::Queued);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use chrono::{FixedOffset, TimeZone};
    use leiriposti_shared::MessageContent;
    use std::sync::Arc;

    fn record(subject: &str) -> MessageHandle {
        Arc::new(Message::new(MessageContent {
            recipient: "Aino".to_string(),
            subject: subject.to_string(),
            body: String::new(),
            author: "Mummi".to_string(),
            timestamp: FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2025, 6, 9, 12, 0, 0).unwrap(),
        }))
    }

    #[test]
    fn test_every_target_applies_when_not_printing() {
        for from in MessageStatus::ALL.into_iter().filter(|s| *s != MessageStatus::Printing) {
            for to in MessageStatus::ALL {
                let mut queue = PrintQueue::new();
                let r = record("x");
                if from == MessageStatus::Queued {
                    assert!(apply(&mut queue, &r, MessageStatus::Queued, Actor::Caller, false).is_applied());
                } else {
                    r.set_status(from);
                }
                assert_eq!(apply(&mut queue, &r, to, Actor::Caller, false), Transition::Applied);
                assert_eq!(r.status(), to);
                assert_eq!(queue.contains(&r), to == MessageStatus::Queued, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_repeated_queue_is_idempotent() {
        let mut queue = PrintQueue::new();
        let r = record("x");
        for _ in 0..3 {
            assert!(apply(&mut queue, &r, MessageStatus::Queued, Actor::Caller, false).is_applied());
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unqueue_shrinks_queue_by_one() {
        let mut queue = PrintQueue::new();
        let a = record("a");
        let b = record("b");
        let _ = apply(&mut queue, &a, MessageStatus::Queued, Actor::Caller, false);
        let _ = apply(&mut queue, &b, MessageStatus::Queued, Actor::Caller, false);
        let _ = apply(&mut queue, &a, MessageStatus::NotPrinted, Actor::Caller, false);
        assert_eq!(queue.len(), 1);
        assert!(!queue.contains(&a));
        assert_eq!(a.status(), MessageStatus::NotPrinted);
    }

    #[test]
    fn test_printing_record_refuses_caller_changes() {
        let mut queue = PrintQueue::new();
        let r = record("x");
        r.set_status(MessageStatus::Printing);
        for to in MessageStatus::ALL {
            assert_eq!(
                apply(&mut queue, &r, to, Actor::Caller, false),
                Transition::Refused { current: MessageStatus::Printing }
            );
            assert_eq!(r.status(), MessageStatus::Printing);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_override_and_worker_bypass_guard() {
        let mut queue = PrintQueue::new();
        let r = record("x");
        r.set_status(MessageStatus::Printing);
        assert!(apply(&mut queue, &r, MessageStatus::NotPrinted, Actor::Caller, true).is_applied());

        r.set_status(MessageStatus::Printing);
        assert!(apply(&mut queue, &r, MessageStatus::Printed, Actor::Worker, false).is_applied());
        assert_eq!(r.status(), MessageStatus::Printed);
    }

    #[test]
    fn test_requeue_front() {
        let mut queue = PrintQueue::new();
        let a = record("a");
        let b = record("b");
        let _ = apply(&mut queue, &b, MessageStatus::Queued, Actor::Caller, false);
        a.set_status(MessageStatus::Printing);
        requeue_front(&mut queue, &a);
        assert_eq!(a.status(), MessageStatus::Queued);
        assert_eq!(queue.dequeue_next().unwrap().subject(), "a");
    }
}
