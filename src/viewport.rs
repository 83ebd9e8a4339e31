use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::trace;

use crate::models::{ItemId, VisibilityEvent};

/// Receives visibility crossings in the order the platform reported them.
pub type VisibilityCallback = Box<dyn Fn(VisibilityEvent) + Send + Sync + 'static>;

/// Opaque reference to the rendered element that represents a feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

struct Registration {
    handle: ElementHandle,
    threshold: f64,
    above: bool,
}

/// Tracks which rendered items occupy a dominant share of the viewport.
///
/// The platform adapter feeds raw intersection ratios through [`report`] or
/// [`report_batch`]; the observer turns them into [`VisibilityEvent`]s only when
/// an item crosses its threshold. It never decides activation itself.
///
/// [`report`]: ViewportObserver::report
/// [`report_batch`]: ViewportObserver::report_batch
pub struct ViewportObserver {
    registrations: Arc<Mutex<HashMap<ItemId, Registration>>>,
    on_visibility_change: VisibilityCallback,
}

impl ViewportObserver {
    pub fn new(on_visibility_change: VisibilityCallback) -> Self {
        Self {
            registrations: Arc::new(Mutex::new(HashMap::new())),
            on_visibility_change,
        }
    }

    fn lock_registrations(&self) -> std::sync::MutexGuard<'_, HashMap<ItemId, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start tracking an item. Re-observing replaces the handle and threshold
    /// and resets the item to "not visible".
    pub fn observe(&self, item_id: &str, handle: ElementHandle, threshold: f64) {
        trace!(item_id, ?handle, threshold, "Observing item");
        self.lock_registrations().insert(
            item_id.to_string(),
            Registration {
                handle,
                threshold: threshold.clamp(0.0, 1.0),
                above: false,
            },
        );
    }

    /// Stop tracking an item that left the rendered window.
    pub fn unobserve(&self, item_id: &str) {
        trace!(item_id, "Unobserving item");
        self.lock_registrations().remove(item_id);
    }

    pub fn is_observing(&self, item_id: &str) -> bool {
        self.lock_registrations().contains_key(item_id)
    }

    pub fn handle_of(&self, item_id: &str) -> Option<ElementHandle> {
        self.lock_registrations().get(item_id).map(|r| r.handle)
    }

    /// Feed one intersection measurement. Returns the emitted event, if the
    /// measurement crossed the item's threshold.
    pub fn report(&self, item_id: &str, ratio_visible: f64) -> Option<VisibilityEvent> {
        let event = self.crossing(item_id, ratio_visible)?;
        (self.on_visibility_change)(event.clone());
        Some(event)
    }

    /// Feed a platform batch. Crossings are delivered in slice order, one event
    /// per crossing; nothing is coalesced.
    pub fn report_batch(&self, entries: &[(&str, f64)]) -> usize {
        let mut emitted = 0;
        for (item_id, ratio) in entries {
            if self.report(item_id, *ratio).is_some() {
                emitted += 1;
            }
        }
        emitted
    }

    fn crossing(&self, item_id: &str, ratio_visible: f64) -> Option<VisibilityEvent> {
        let mut registrations = self.lock_registrations();
        let Some(registration) = registrations.get_mut(item_id) else {
            trace!(item_id, "Ignoring report for unobserved item");
            return None;
        };
        let ratio = ratio_visible.clamp(0.0, 1.0);
        let above = ratio >= registration.threshold;
        if above == registration.above {
            return None;
        }
        registration.above = above;
        Some(VisibilityEvent::new(item_id, ratio))
    }
}
