//! Synchronous notification lists for [`ParkourMovement`](crate::ParkourMovement).

use core::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{hanging::HangingState, movement::MovementState};

/// The movement state changed. Delivered after the new state's entry effects ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovementStateChange {
    pub previous: MovementState,
    pub new: MovementState,
}

/// The body started or stopped hanging.
///
/// Only fires when crossing [`HangingState::NotHanging`]; moves between the hanging
/// sub-states are silent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HangingToggle {
    pub hanging: bool,
    pub state: HangingState,
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub type Callback<E> = Box<dyn FnMut(&E) + Send + Sync>;

pub struct Observers<E> {
    subscribers: Vec<(SubscriptionId, Callback<E>)>,
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<E> Observers<E> {
    pub fn subscribe(&mut self, callback: impl FnMut(&E) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Returns whether `id` was subscribed here.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    /// Calls every subscriber in subscription order.
    pub fn emit(&mut self, event: &E) {
        for (_, callback) in &mut self.subscribers {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
