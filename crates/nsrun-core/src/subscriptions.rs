use std::sync::{Arc, Mutex};
use tracing::debug;

/// Resource the host releases on teardown.
///
/// `dispose` must be safe to call any number of times.
pub trait Disposable: Send + Sync {
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

impl<T: Disposable + ?Sized> Disposable for Arc<T> {
    fn dispose(&self) {
        (**self).dispose();
    }

    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

/// Host subscription tracking: everything in here is disposed together
#[derive(Default)]
pub struct Subscriptions {
    items: Mutex<Vec<Box<dyn Disposable>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `item`, dropping entries that are already disposed
    pub fn push(&self, item: Box<dyn Disposable>) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.retain(|existing| !existing.is_disposed());
        items.push(item);
    }

    /// Number of tracked entries that are still live
    pub fn active(&self) -> usize {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.iter().filter(|item| !item.is_disposed()).count()
    }

    /// Dispose every tracked entry
    pub fn dispose_all(&self) {
        let drained: Vec<_> = {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            items.drain(..).collect()
        };
        debug!(count = drained.len(), "Disposing subscriptions");
        for item in drained {
            item.dispose();
        }
    }
}
