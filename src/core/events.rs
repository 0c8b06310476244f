//! Transform change notification
//!
//! A transform exposes a [`TransformChangedEvent`] that dependent systems
//! subscribe to, so they can refresh their own derived state (a world-space
//! bounding volume, a cached draw command) only when the transform actually
//! went stale instead of polling every frame.
//!
//! # Example
//!
//! ```ignore
//! let dirty = Rc::new(Cell::new(false));
//! let flag = Rc::clone(&dirty);
//! let connection = world
//!     .transforms_mut()
//!     .changed_event_mut(transform)
//!     .connect(move |_| flag.set(true));
//!
//! world.transforms_mut().set_position(transform, Vec3::X);
//! assert!(dirty.get());
//! ```
//!
//! Listeners run synchronously on the thread that mutated the transform and
//! receive the id of the transform whose event fired. Moving a transform
//! fires the events of its descendants too.

use std::fmt;

use crate::ecs::TransformId;

/// Handle identifying one subscription, used to disconnect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection(u64);

type Listener = Box<dyn FnMut(TransformId)>;

/// Event fired whenever a transform's cached state is invalidated, by its
/// own mutation or by one of its ancestors.
#[derive(Default)]
pub struct TransformChangedEvent {
    listeners: Vec<(Connection, Listener)>,
    next_connection: u64,
}

impl TransformChangedEvent {
    /// Create an event with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener. It stays connected until [`disconnect`] or
    /// until the owning transform is reset or destroyed.
    ///
    /// [`disconnect`]: Self::disconnect
    pub fn connect(&mut self, listener: impl FnMut(TransformId) + 'static) -> Connection {
        let connection = Connection(self.next_connection);
        self.next_connection += 1;
        self.listeners.push((connection, Box::new(listener)));
        connection
    }

    /// Remove a subscription. Returns `false` if it was not connected.
    pub fn disconnect(&mut self, connection: Connection) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(c, _)| *c != connection);
        self.listeners.len() != before
    }

    /// Drop every subscription.
    pub fn close_all(&mut self) {
        self.listeners.clear();
    }

    /// Number of connected listeners.
    #[must_use]
    #[inline]
    pub fn connection_count(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is connected.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Invoke every listener in subscription order.
    pub(crate) fn notify(&mut self, transform: TransformId) {
        for (_, listener) in &mut self.listeners {
            listener(transform);
        }
    }
}

impl fmt::Debug for TransformChangedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformChangedEvent")
            .field("connections", &self.listeners.len())
            .finish()
    }
}
