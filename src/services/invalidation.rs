//! Invalidation bus shared by UI surfaces.
//!
//! A mutation publishes its entity kind's topic once the write has completed.
//! Events carry no payload, only "something in this topic changed", so
//! subscribers re-read state instead of applying deltas.

use crate::models::EntityKind;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Event: issuesUpdated
pub const ISSUES_UPDATED_EVENT: &str = "issuesUpdated";

/// Event: projectsUpdated
pub const PROJECTS_UPDATED_EVENT: &str = "projectsUpdated";

/// Event: cyclesUpdated
pub const CYCLES_UPDATED_EVENT: &str = "cyclesUpdated";

/// Event: teamsUpdated
pub const TEAMS_UPDATED_EVENT: &str = "teamsUpdated";

/// Event: settingsUpdated
pub const SETTINGS_UPDATED_EVENT: &str = "settingsUpdated";

/// Invalidation topic, one per entity kind plus settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Issues,
    Projects,
    Cycles,
    Teams,
    Settings,
}

impl Topic {
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Issue => Self::Issues,
            EntityKind::Project => Self::Projects,
            EntityKind::Cycle => Self::Cycles,
            EntityKind::Team => Self::Teams,
        }
    }

    /// Event name used on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Issues => ISSUES_UPDATED_EVENT,
            Self::Projects => PROJECTS_UPDATED_EVENT,
            Self::Cycles => CYCLES_UPDATED_EVENT,
            Self::Teams => TEAMS_UPDATED_EVENT,
            Self::Settings => SETTINGS_UPDATED_EVENT,
        }
    }
}

impl From<EntityKind> for Topic {
    fn from(kind: EntityKind) -> Self {
        Self::for_kind(kind)
    }
}

type Handler = Arc<dyn Fn(Topic) + Send + Sync>;

struct Registration {
    id: u64,
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl BusInner {
    fn registrations(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: u64) -> bool {
        let mut registrations = self.registrations();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }
}

/// Publish/subscribe service. Cloning shares the same subscriber list.
#[derive(Clone, Default)]
pub struct InvalidationBus {
    inner: Arc<BusInner>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. Dropping the returned [`Subscription`] unsubscribes.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(Topic) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.registrations().push(Registration {
            id,
            topic,
            handler: Arc::new(handler),
        });
        log::debug!("[bus] Subscription {} on {}", id, topic.event_name());

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every handler currently subscribed to `topic`, synchronously and
    /// in subscription order. Returns how many handlers ran.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe while being invoked.
    pub fn publish(&self, topic: Topic) -> usize {
        let handlers: Vec<Handler> = self
            .inner
            .registrations()
            .iter()
            .filter(|r| r.topic == topic)
            .map(|r| r.handler.clone())
            .collect();

        log::debug!(
            "[bus] Publishing {} to {} subscriber(s)",
            topic.event_name(),
            handlers.len()
        );
        for handler in &handlers {
            handler(topic);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .registrations()
            .iter()
            .filter(|r| r.topic == topic)
            .count()
    }
}

/// Handle to a bus registration.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Stop receiving events. Returns `false` if already detached.
    pub fn unsubscribe(self) -> bool {
        // Drop runs next and finds nothing left to remove.
        self.detach()
    }

    fn detach(&self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.remove(self.id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = InvalidationBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<Subscription> = (0..3)
            .map(|i| {
                let log = log.clone();
                bus.subscribe(Topic::Issues, move |_| log.lock().unwrap().push(i))
            })
            .collect();

        assert_eq!(bus.publish(Topic::Issues), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn test_publish_only_reaches_matching_topic() {
        let bus = InvalidationBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = bus.subscribe(Topic::Teams, move |topic| {
            assert_eq!(topic, Topic::Teams);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(Topic::Issues), 0);
        assert_eq!(bus.publish(Topic::Teams), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_and_drop_detach() {
        let bus = InvalidationBus::new();
        let first = bus.subscribe(Topic::Issues, |_| {});
        let second = bus.subscribe(Topic::Issues, |_| {});
        assert_eq!(bus.subscriber_count(Topic::Issues), 2);

        assert!(first.unsubscribe());
        assert_eq!(bus.subscriber_count(Topic::Issues), 1);

        drop(second);
        assert_eq!(bus.publish(Topic::Issues), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself_during_publish() {
        let bus = InvalidationBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_in_handler = slot.clone();
        let sub = bus.subscribe(Topic::Settings, move |_| {
            slot_in_handler.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        assert_eq!(bus.publish(Topic::Settings), 1);
        assert_eq!(bus.subscriber_count(Topic::Settings), 0);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = InvalidationBus::new();
        let other = bus.clone();
        let _sub = other.subscribe(Topic::Projects, |_| {});
        assert_eq!(bus.publish(Topic::Projects), 1);
        assert_eq!(Topic::from(EntityKind::Project).event_name(), "projectsUpdated");
    }
}
