use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::LayoutMode;

/// Change notifications a rendering surface publishes to its subscribers.
///
/// Events carry no payload: handlers read the surface's current values, which
/// is what makes a notification from a replaced document detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceEvent {
    PageChanged,
    ScaleChanged,
    DisplayModeChanged,
    BoundsChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type EventQueue = Arc<Mutex<VecDeque<SurfaceEvent>>>;

/// Receiving end of a surface subscription.
///
/// Events are appended synchronously while the surface's setter runs, so a
/// caller that records [`len`](Self::len) before writing to the surface can
/// tell its own echoes apart from earlier notifications.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    queue: EventQueue,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pop(&self) -> Option<SurfaceEvent> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Removes and returns every event queued at or after `mark`.
    pub fn take_since(&self, mark: usize) -> Vec<SurfaceEvent> {
        let mut queue = self.queue.lock();
        if mark >= queue.len() {
            return Vec::new();
        }
        queue.split_off(mark).into_iter().collect()
    }

    pub fn push_back(&self, event: SurfaceEvent) {
        self.queue.lock().push_back(event);
    }

    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}

/// Subscriber bookkeeping for surface implementations.
#[derive(Debug, Default)]
pub struct NotificationHub {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, EventQueue)>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Subscription {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let queue: EventQueue = Arc::new(Mutex::new(VecDeque::new()));
        self.subscribers.push((id, Arc::clone(&queue)));
        Subscription { id, queue }
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        before != self.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn emit(&self, event: SurfaceEvent) {
        for (_, queue) in &self.subscribers {
            queue.lock().push_back(event);
        }
    }
}

/// Capability surface of the native page view.
///
/// Page indices are 0-based, scale factors are absolute. Setters publish the
/// matching [`SurfaceEvent`] to subscribers before returning, the same way a
/// user interaction does.
pub trait RenderingSurface {
    type Document;

    fn set_document(&mut self, document: Option<Self::Document>);

    /// Page count of the loaded document, `None` while empty.
    fn page_count(&self) -> Option<usize>;

    fn current_page_index(&self) -> Option<usize>;

    fn go_to(&mut self, page_index: usize);

    fn scale_factor(&self) -> f32;

    fn set_scale_factor(&mut self, scale: f32);

    /// Absolute scale at which the current page fits the viewport. Zero until
    /// layout has settled.
    fn fit_to_window_scale_factor(&self) -> f32;

    fn display_mode(&self) -> LayoutMode;

    fn set_display_mode(&mut self, mode: LayoutMode);

    fn subscribe(&mut self) -> Subscription;

    fn unsubscribe(&mut self, id: SubscriptionId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_fans_out_to_every_subscriber() {
        let mut hub = NotificationHub::new();
        let first = hub.subscribe();
        let second = hub.subscribe();
        hub.emit(SurfaceEvent::PageChanged);

        assert_eq!(first.pop(), Some(SurfaceEvent::PageChanged));
        assert_eq!(second.pop(), Some(SurfaceEvent::PageChanged));
        assert!(first.is_empty());
    }

    #[test]
    fn unsubscribed_queue_receives_nothing() {
        let mut hub = NotificationHub::new();
        let sub = hub.subscribe();
        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        hub.emit(SurfaceEvent::ScaleChanged);
        assert!(sub.is_empty());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn take_since_only_returns_the_tail() {
        let mut hub = NotificationHub::new();
        let sub = hub.subscribe();
        hub.emit(SurfaceEvent::PageChanged);
        let mark = sub.len();
        hub.emit(SurfaceEvent::ScaleChanged);
        hub.emit(SurfaceEvent::BoundsChanged);

        assert_eq!(
            sub.take_since(mark),
            vec![SurfaceEvent::ScaleChanged, SurfaceEvent::BoundsChanged]
        );
        assert_eq!(sub.pop(), Some(SurfaceEvent::PageChanged));
        assert!(sub.take_since(5).is_empty());
    }
}
