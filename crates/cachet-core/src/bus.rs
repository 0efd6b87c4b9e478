// ── Change bus ──
//
// Per-type, ordered, synchronous notification. Callbacks run on the
// publishing thread in registration order; the bus does not catch their
// panics.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::entity::Entity;
use crate::stream::EventStream;

/// A change to one entity, carrying its full new value.
#[derive(Debug)]
pub enum ChangeEvent<E> {
    None,
    Added(Arc<E>),
    Updated(Arc<E>),
}

impl<E> Clone for ChangeEvent<E> {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Added(e) => Self::Added(Arc::clone(e)),
            Self::Updated(e) => Self::Updated(Arc::clone(e)),
        }
    }
}

impl<E> Default for ChangeEvent<E> {
    fn default() -> Self {
        Self::None
    }
}

impl<E> ChangeEvent<E> {
    /// The affected entity, unless this is `None`.
    pub fn entity(&self) -> Option<&Arc<E>> {
        match self {
            Self::None => None,
            Self::Added(e) | Self::Updated(e) => Some(e),
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }
}

type ErasedCallback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Registry of change callbacks keyed by entity type name.
#[derive(Default)]
pub struct ChangeBus {
    listeners: DashMap<&'static str, Vec<ErasedCallback>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback for changes to `E`.
    pub fn register<E, F>(&self, callback: F)
    where
        E: Entity,
        F: Fn(&ChangeEvent<E>) + Send + Sync + 'static,
    {
        let erased: ErasedCallback = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<ChangeEvent<E>>() {
                callback(event);
            }
        });
        self.listeners
            .entry(E::type_name())
            .or_default()
            .push(erased);
    }

    /// Deliver `event` to every callback registered for `E`, in order.
    pub fn publish<E: Entity>(&self, event: &ChangeEvent<E>) {
        // Snapshot the list so callbacks may register further listeners.
        let callbacks: Vec<ErasedCallback> = self
            .listeners
            .get(E::type_name())
            .map(|list| list.value().clone())
            .unwrap_or_default();

        let event: &dyn Any = event;
        for callback in callbacks {
            callback(event);
        }
    }

    /// Stream every future event for `E`.
    ///
    /// Backed by a callback that forwards into an unbounded channel; the
    /// callback stays registered after the stream is dropped and simply
    /// stops delivering.
    pub fn subscribe<E: Entity>(&self) -> EventStream<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register::<E, _>(move |event: &ChangeEvent<E>| {
            let _ = tx.send(event.clone());
        });
        EventStream::new(rx)
    }

    pub fn listener_count<E: Entity>(&self) -> usize {
        self.listeners.get(E::type_name()).map_or(0, |l| l.len())
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("types", &self.listeners.len())
            .finish()
    }
}
