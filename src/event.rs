//! Load notifications.
//!
//! Callbacks run synchronously, after the transaction that caused them has
//! committed, in subscription order.

use crate::model::NodeId;

/// An instance finished loading (or was restored by undo/redo).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLoaded {
    pub instance: NodeId,
    pub boundary_plugs: Vec<String>,
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

pub type Callback = Box<dyn FnMut(&ReferenceLoaded)>;

struct Subscription {
    id: SubscriptionId,
    /// `None` listens to every instance.
    instance: Option<NodeId>,
    callback: Callback,
}

#[derive(Default)]
pub(crate) struct Subscribers {
    entries: Vec<Subscription>,
    next_id: u64,
}

impl Subscribers {
    pub(crate) fn subscribe(
        &mut self,
        instance: Option<NodeId>,
        callback: Callback,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push(Subscription { id, instance, callback });
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s.id != id);
        self.entries.len() != before
    }

    pub(crate) fn emit(&mut self, event: &ReferenceLoaded) {
        for sub in &mut self.entries {
            if sub.instance.is_none_or(|n| n == event.instance) {
                (sub.callback)(event);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers").field("count", &self.entries.len()).finish()
    }
}
