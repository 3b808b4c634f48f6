//! Live entity view: what one mounted UI surface holds.
//!
//! A view subscribes to its kind's topic. An invalidation only marks the view
//! stale and wakes anyone waiting in [`EntityView::changed`]; the surface
//! re-reads with [`EntityView::refresh`]. Once unmounted, results of reads
//! still in flight are discarded.

use crate::models::EntityKind;
use crate::services::invalidation::{InvalidationBus, Subscription, Topic};
use crate::services::reconciler::{ReconciledView, Reconciler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

struct ViewState {
    mounted: AtomicBool,
    stale: AtomicBool,
    changed: Notify,
}

pub struct EntityView {
    kind: EntityKind,
    reconciler: Arc<Reconciler>,
    state: Arc<ViewState>,
    current: Mutex<Option<ReconciledView>>,
    subscription: Mutex<Option<Subscription>>,
}

impl EntityView {
    /// Subscribe without loading. The view starts stale.
    pub fn new(kind: EntityKind, reconciler: Arc<Reconciler>, bus: &InvalidationBus) -> Arc<Self> {
        let state = Arc::new(ViewState {
            mounted: AtomicBool::new(true),
            stale: AtomicBool::new(true),
            changed: Notify::new(),
        });

        let handler_state = Arc::clone(&state);
        let subscription = bus.subscribe(Topic::for_kind(kind), move |_| {
            handler_state.stale.store(true, Ordering::SeqCst);
            handler_state.changed.notify_one();
        });

        Arc::new(Self {
            kind,
            reconciler,
            state,
            current: Mutex::new(None),
            subscription: Mutex::new(Some(subscription)),
        })
    }

    /// Subscribe and perform the initial load.
    pub async fn mount(
        kind: EntityKind,
        reconciler: Arc<Reconciler>,
        bus: &InvalidationBus,
    ) -> Arc<Self> {
        let view = Self::new(kind, reconciler, bus);
        view.refresh().await;
        view
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_mounted(&self) -> bool {
        self.state.mounted.load(Ordering::SeqCst)
    }

    /// Whether an invalidation arrived since the last refresh started.
    pub fn is_stale(&self) -> bool {
        self.state.stale.load(Ordering::SeqCst)
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<ReconciledView>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last loaded result, if any.
    pub fn current(&self) -> Option<ReconciledView> {
        self.current_slot().clone()
    }

    /// Re-read through the reconciler and keep the result.
    ///
    /// Returns `None` when the view was unmounted before or during the read.
    pub async fn refresh(&self) -> Option<ReconciledView> {
        if !self.is_mounted() {
            return None;
        }
        // Cleared before reading so an invalidation during the read re-marks it.
        self.state.stale.store(false, Ordering::SeqCst);

        let view = self.reconciler.read(self.kind).await;
        if !self.is_mounted() {
            log::debug!("[view] Discarding {} result read after unmount", self.kind);
            return None;
        }

        *self.current_slot() = Some(view.clone());
        Some(view)
    }

    /// Refresh only when stale; otherwise return the held result.
    pub async fn refresh_if_stale(&self) -> Option<ReconciledView> {
        if self.is_stale() {
            self.refresh().await
        } else {
            self.current()
        }
    }

    /// Wait until the next invalidation for this view's topic.
    pub async fn changed(&self) {
        self.state.changed.notified().await;
    }

    /// Detach from the bus and drop held data.
    pub fn unmount(&self) {
        self.state.mounted.store(false, Ordering::SeqCst);
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        self.current_slot().take();
    }
}

impl Drop for EntityView {
    fn drop(&mut self) {
        self.unmount();
    }
}
