use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use analysis_core::{TaskEvent, TaskEventKind};
use tokio::sync::mpsc;

/// Per-subscriber queue depth. Task events are only dropped once a
/// subscriber has fallen this far behind.
const SUBSCRIBER_CAPACITY: usize = 256;
/// Heartbeats are expendable: skipped once a subscriber is at half depth.
const HEARTBEAT_HEADROOM: usize = SUBSCRIBER_CAPACITY / 2;

struct Slot {
    id: u64,
    sender: mpsc::Sender<TaskEvent>,
}

/// In-process pub/sub for task lifecycle events.
///
/// The subscriber list lock is released before any send so one slow
/// subscriber can never stall the publisher or its peers.
pub struct EventBus {
    subscribers: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
}

/// A live subscription; dropping it unsubscribes.
pub struct Subscription {
    pub receiver: mpsc::Receiver<TaskEvent>,
    id: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus { subscribers: Mutex::new(Vec::new()), next_id: AtomicU64::new(1) }
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().expect("bus lock poisoned").push(Slot { id, sender });
        Subscription { receiver, id }
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.subscribers
            .lock()
            .expect("bus lock poisoned")
            .retain(|s| s.id != subscription.id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("bus lock poisoned").len()
    }

    pub fn publish(&self, event: TaskEvent) {
        let senders: Vec<(u64, mpsc::Sender<TaskEvent>)> = {
            let subs = self.subscribers.lock().expect("bus lock poisoned");
            subs.iter().map(|s| (s.id, s.sender.clone())).collect()
        };

        let mut dead: Vec<u64> = Vec::new();
        for (id, sender) in senders {
            if event.kind == TaskEventKind::Heartbeat
                && sender.capacity() < HEARTBEAT_HEADROOM
            {
                // The next heartbeat carries the same information.
                continue;
            }
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("event subscriber {id} past high-water mark, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            self.subscribers
                .lock()
                .expect("bus lock poisoned")
                .retain(|s| !dead.contains(&s.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{ReportType, Task};

    fn event(kind: TaskEventKind) -> TaskEvent {
        TaskEvent::of(kind, Task::new("t1".into(), "AAPL".into(), ReportType::Detailed))
    }

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(event(TaskEventKind::TaskCreated));
        bus.publish(event(TaskEventKind::TaskStarted));
        bus.publish(event(TaskEventKind::TaskCompleted));

        assert_eq!(sub.receiver.recv().await.unwrap().kind, TaskEventKind::TaskCreated);
        assert_eq!(sub.receiver.recv().await.unwrap().kind, TaskEventKind::TaskStarted);
        assert_eq!(sub.receiver.recv().await.unwrap().kind, TaskEventKind::TaskCompleted);
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned_on_next_publish() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        // Client disconnect: the subscription is dropped, never
        // explicitly unsubscribed.
        drop(sub);
        bus.publish(event(TaskEventKind::TaskCreated));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_publisher() {
        let bus = EventBus::new();
        let _slow = bus.subscribe(); // never drained
        for _ in 0..SUBSCRIBER_CAPACITY + 50 {
            bus.publish(event(TaskEventKind::TaskCreated));
        }
        // Reaching here without deadlock is the assertion; a fast peer
        // still receives fresh events.
        let mut fast = bus.subscribe();
        bus.publish(event(TaskEventKind::TaskCompleted));
        assert_eq!(fast.receiver.recv().await.unwrap().kind, TaskEventKind::TaskCompleted);
    }

    #[tokio::test]
    async fn heartbeats_are_shed_before_task_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        // Fill past the heartbeat headroom.
        for _ in 0..(SUBSCRIBER_CAPACITY - HEARTBEAT_HEADROOM + 1) {
            bus.publish(event(TaskEventKind::TaskCreated));
        }
        bus.publish(TaskEvent::heartbeat());
        bus.publish(event(TaskEventKind::TaskFailed));

        let mut kinds = Vec::new();
        while let Ok(e) = sub.receiver.try_recv() {
            kinds.push(e.kind);
        }
        assert!(!kinds.contains(&TaskEventKind::Heartbeat));
        assert!(kinds.contains(&TaskEventKind::TaskFailed));
    }
}
