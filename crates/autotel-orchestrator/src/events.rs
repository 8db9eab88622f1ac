use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use autotel_domain::{AgentEvent, Severity};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const BROADCAST_CAPACITY: usize = 256;
const RING_CAPACITY: usize = 256;

/// Process-wide, append-only event channel. Writers never block: the
/// broadcast side drops the oldest entries for lagging readers and the
/// in-memory ring keeps the most recent events for the control API, with a
/// drop counter covering overflow.
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
    ring: Mutex<VecDeque<AgentEvent>>,
    dropped: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        EventBus {
            tx,
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn emit(&self, event: AgentEvent) {
        match event.severity {
            Severity::Info => info!(kind = %event.kind, component = %event.component, "{}", event.summary),
            Severity::Warning => warn!(kind = %event.kind, component = %event.component, "{}", event.summary),
            _ => error!(kind = %event.kind, component = %event.component, "{}", event.summary),
        }

        {
            let mut ring = self.ring.lock().expect("event ring lock");
            if ring.len() == RING_CAPACITY {
                ring.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            ring.push_back(event.clone());
        }
        let _ = self.tx.send(event);
    }

    /// Most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<AgentEvent> {
        let ring = self.ring.lock().expect("event ring lock");
        let skip = ring.len().saturating_sub(limit);
        ring.iter().skip(skip).cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotel_domain::EventKind;

    #[test]
    fn ring_keeps_most_recent_and_counts_drops() {
        let bus = EventBus::new();
        for i in 0..(RING_CAPACITY + 10) {
            bus.emit(AgentEvent::new(EventKind::Started, "test", format!("event {i}")));
        }
        let recent = bus.recent(RING_CAPACITY);
        assert_eq!(recent.len(), RING_CAPACITY);
        assert_eq!(recent.last().unwrap().summary, format!("event {}", RING_CAPACITY + 9));
        assert_eq!(bus.dropped_count(), 10);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(AgentEvent::new(EventKind::ConfigChanged, "test", "applied"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::ConfigChanged);
    }

    #[test]
    fn recent_respects_limit() {
        let bus = EventBus::new();
        for i in 0..5 {
            bus.emit(AgentEvent::new(EventKind::Started, "test", format!("event {i}")));
        }
        let recent = bus.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].summary, "event 3");
    }
}
