//! # Subscriber Registry
//!
//! The set of connected subscribers, each a sink paired with an
//! [`EventFilter`], and the filtered fan-out over them.
//!
//! ## Design:
//!
//! 1.  **Single lock**: the client list lives behind one mutex. Add, remove
//!     and broadcast all take it, so a connect or disconnect racing with a
//!     broadcast can never corrupt the iteration. Sinks are non-blocking, so
//!     the lock is only held for the duration of the in-memory writes.
//! 2.  **Serialize once**: each event of a broadcast is framed once and the
//!     same frame is written to every subscriber whose filter accepts it.
//! 3.  **Failure isolation**: a sink that fails a write is dropped from the
//!     list (the subscriber is considered gone) and delivery carries on with
//!     the others.
//! 4.  **Greeting under the lock**: [`SubscriberRegistry::add`] writes the
//!     greeting frames before the subscriber becomes visible to broadcasts,
//!     so the connection record always comes first.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::filter::EventFilter;
use crate::core::model::NormalizedEvent;
use crate::core::sink::{event_frame, EventSink, SinkError};

/// Opaque handle returned on subscribe and used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

struct ClientHandle {
    id: ClientId,
    filter: EventFilter,
    sink: Arc<dyn EventSink>,
}

pub struct SubscriberRegistry {
    clients: Mutex<Vec<ClientHandle>>,
    next_id: AtomicU64,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ClientHandle>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a subscriber after writing `greeting` to its sink.
    ///
    /// Returns the new id and the subscriber count. If a greeting frame cannot
    /// be written the subscriber is not registered.
    pub fn add(
        &self,
        filter: EventFilter,
        sink: Arc<dyn EventSink>,
        greeting: &[String],
    ) -> Result<(ClientId, usize), SinkError> {
        let mut clients = self.lock();

        for frame in greeting {
            sink.write_frame(frame)?;
        }

        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        clients.push(ClientHandle { id, filter, sink });
        log::info!("New client connected ({}). Total clients: {}", id, clients.len());
        Ok((id, clients.len()))
    }

    /// Removes a subscriber. Returns the remaining count, or `None` when the id
    /// was not registered (already removed or dropped by a failed write).
    pub fn remove(&self, id: ClientId) -> Option<usize> {
        let mut clients = self.lock();
        let pos = clients.iter().position(|c| c.id == id)?;
        clients.remove(pos);
        log::info!("Client disconnected ({}). Total clients: {}", id, clients.len());
        Some(clients.len())
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().iter().any(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every subscriber, closing their sinks.
    pub fn clear(&self) -> usize {
        let mut clients = self.lock();
        let dropped = clients.len();
        clients.clear();
        dropped
    }

    /// Delivers each event, in order, to every subscriber whose filter accepts it.
    ///
    /// Returns the number of frames written.
    pub fn broadcast(&self, events: &[NormalizedEvent]) -> usize {
        if events.is_empty() {
            return 0;
        }

        let framed: Vec<(&NormalizedEvent, String)> = events
            .iter()
            .filter_map(|event| match event_frame(event) {
                Ok(frame) => Some((event, frame)),
                Err(e) => {
                    log::error!("Failed to serialize event {}: {}", event.id, e);
                    None
                }
            })
            .collect();

        let mut clients = self.lock();
        if clients.is_empty() {
            return 0;
        }
        log::debug!("Broadcasting {} events to {} clients", framed.len(), clients.len());

        let mut written = 0;
        clients.retain(|client| {
            for (event, frame) in framed.iter().filter(|(e, _)| client.filter.matches(e)) {
                if let Err(e) = client.sink.write_frame(frame) {
                    log::info!(
                        "Dropping {} after failed write of {}: {}",
                        client.id,
                        event.id,
                        e
                    );
                    return false;
                }
                written += 1;
            }
            true
        });
        written
    }
}
