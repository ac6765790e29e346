//! # Events Poller
//!
//! Drives the periodic refresh of an [`EventSource`] and fans the new events
//! out to the connected subscribers.
//!
//! ## Lifecycle:
//! - **Stopped -> Running**: [`EventsPoller::start`], or the first subscriber
//!   connecting. The first poll cycle runs immediately, then one per
//!   `polling_interval`.
//! - **Running -> Stopped**: [`EventsPoller::stop`], the last subscriber
//!   leaving, or `max_consecutive_errors` failed cycles in a row. In the last
//!   case an error notice is published and a single restart is scheduled after
//!   twice the polling interval. The restart is skipped when nobody is
//!   connected by then.
//!
//! ## Poll cycle:
//! 1.  Fetch a batch from the source. `stop()` abandons an in-flight fetch.
//! 2.  Keep the newest `max_events` of the batch and compute the delta:
//!     those events whose id is not buffered yet.
//! 3.  Merge the batch into the buffer and record the newest id.
//! 4.  Broadcast the delta and publish it on the notice channel.
//!
//! Cycles run inline in the polling task, so they never overlap. Ticks missed
//! while a slow cycle is in flight are skipped.
//!
//! ## Locking:
//! Locks are taken in the order buffer, control, registry. The buffer lock is
//! held across a broadcast and across the greeting of a new subscriber, so a
//! subscriber sees every event exactly once: either in its initial slice or
//! in a later delta.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::configs::EngineConfig;
use crate::core::event_buffer::EventBuffer;
use crate::core::filter::{filter_events, EventFilter};
use crate::core::model::NormalizedEvent;
use crate::core::registry::{ClientId, SubscriberRegistry};
use crate::core::sink::{connection_frame, event_frame, EventSink, SinkError};
use crate::ingestors::feed::EventSource;
use crate::retrieve::ky_http::UpstreamError;

const NOTICE_CAPACITY: usize = 256;
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub polling_interval: Duration,
    pub max_events: usize,
    pub max_consecutive_errors: u32,
    /// Buffered events replayed to a new subscriber.
    pub initial_events: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for PollerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            polling_interval: config.polling_interval(),
            max_events: config.max_events,
            max_consecutive_errors: config.max_consecutive_errors,
            initial_events: config.initial_events,
        }
    }
}

/// Published to observers of the poller.
#[derive(Debug, Clone, PartialEq)]
pub enum PollerNotice {
    /// An event announced to subscribers.
    Event(NormalizedEvent),
    /// The poller stopped itself after too many failed cycles.
    Error {
        consecutive_errors: u32,
        message: String,
    },
}

/// Snapshot of the poller's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerState {
    pub is_running: bool,
    pub consecutive_errors: u32,
    pub last_event_id: Option<String>,
}

#[derive(Default)]
struct Control {
    state: PollerState,
    /// Cancels the running poll task.
    token: Option<CancellationToken>,
}

struct Shared<S> {
    source: S,
    settings: PollerSettings,
    buffer: Mutex<EventBuffer>,
    control: Mutex<Control>,
    registry: SubscriberRegistry,
    notices: broadcast::Sender<PollerNotice>,
    restart_pending: AtomicBool,
}

/// Cheaply cloneable handle to a poller.
pub struct EventsPoller<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for EventsPoller<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: EventSource> EventsPoller<S> {
    /// A zero `polling_interval` is raised to one millisecond.
    pub fn new(source: S, mut settings: PollerSettings) -> Self {
        settings.polling_interval = settings.polling_interval.max(MIN_INTERVAL);
        log::info!("EventsPoller initialized with {}", source.label());
        log::info!(
            "Polling interval: {}ms, Max events: {}",
            settings.polling_interval.as_millis(),
            settings.max_events
        );

        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                source,
                settings,
                buffer: Mutex::new(EventBuffer::new(settings.max_events)),
                control: Mutex::new(Control::default()),
                registry: SubscriberRegistry::new(),
                notices,
                restart_pending: AtomicBool::new(false),
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.shared.source
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.shared.settings
    }

    /// Starts polling. No-op when already running. Must be called within a
    /// Tokio runtime.
    pub fn start(&self) {
        Shared::start(&self.shared);
    }

    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_running(&self) -> bool {
        self.shared.control().state.is_running
    }

    pub fn state(&self) -> PollerState {
        self.shared.control().state.clone()
    }

    pub fn client_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Snapshot of the buffered events, newest first.
    pub fn buffered_events(&self) -> Vec<NormalizedEvent> {
        self.shared.buffer().iter().cloned().collect()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<PollerNotice> {
        self.shared.notices.subscribe()
    }

    /// # Add Client
    ///
    /// Registers a subscriber and starts the poller if it is stopped.
    ///
    /// The sink first receives the connection record, then the newest
    /// buffered events accepted by `filter` (at most `initial_events`). Must
    /// be called within a Tokio runtime.
    ///
    /// # Errors
    /// Fails when the greeting cannot be written; the subscriber is then not
    /// registered.
    pub fn add_client(
        &self,
        filter: EventFilter,
        sink: Arc<dyn EventSink>,
    ) -> Result<ClientId, SinkError> {
        let buffer = self.shared.buffer();

        let mut greeting = vec![connection_frame()];
        greeting.extend(
            filter_events(buffer.iter(), &filter)
                .into_iter()
                .take(self.shared.settings.initial_events)
                .filter_map(|event| event_frame(event).ok()),
        );

        let (id, _) = self.shared.registry.add(filter, sink, &greeting)?;
        drop(buffer);

        Shared::start(&self.shared);
        Ok(id)
    }

    /// Unregisters a subscriber and stops the poller when it was the last one.
    /// Returns `false` when the id was not registered.
    pub fn remove_client(&self, id: ClientId) -> bool {
        match self.shared.registry.remove(id) {
            Some(remaining) => {
                if remaining == 0 {
                    self.shared.stop_if_idle();
                }
                true
            }
            None => false,
        }
    }

    /// Stops polling and disconnects every subscriber.
    pub fn shutdown(&self) {
        self.shared.stop();
        let dropped = self.shared.registry.clear();
        log::info!("Poller shut down, {} clients disconnected", dropped);
    }
}

impl<S> Shared<S> {
    fn buffer(&self) -> MutexGuard<'_, EventBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn halt(ctl: &mut Control) {
        ctl.state.is_running = false;
        if let Some(token) = ctl.token.take() {
            token.cancel();
        }
    }

    fn stop(&self) {
        let mut ctl = self.control();
        if !ctl.state.is_running {
            return;
        }
        log::info!("Stopping events poller");
        Self::halt(&mut ctl);
    }

    /// Stops when no subscriber is left. The registry is checked under the
    /// control lock so a concurrent `add_client` either sees the poller
    /// stopped and restarts it, or keeps it running.
    fn stop_if_idle(&self) {
        let mut ctl = self.control();
        if ctl.state.is_running && self.registry.is_empty() {
            log::info!("No clients connected, stopping events poller");
            Self::halt(&mut ctl);
        }
    }
}

impl<S: EventSource> Shared<S> {
    fn start(self: &Arc<Self>) {
        let mut ctl = self.control();
        if ctl.state.is_running {
            log::debug!("Poller already running");
            return;
        }

        log::info!("Starting events poller");
        let token = CancellationToken::new();
        ctl.state.is_running = true;
        ctl.state.consecutive_errors = 0;
        ctl.token = Some(token.clone());
        drop(ctl);

        tokio::spawn(Arc::clone(self).run(token));
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = interval(self.settings.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.poll_cycle(&token).await,
            }
        }
        log::debug!("Poll task exited");
    }

    async fn poll_cycle(self: &Arc<Self>, token: &CancellationToken) {
        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = self.source.fetch() => result,
        };

        match fetched {
            Ok(batch) => self.apply_batch(token, batch),
            Err(e) => self.record_failure(token, e),
        }
    }

    fn apply_batch(&self, token: &CancellationToken, mut batch: Vec<NormalizedEvent>) {
        // Events past the buffer capacity would never be remembered.
        batch.truncate(self.settings.max_events);

        let mut buffer = self.buffer();
        let mut ctl = self.control();
        if token.is_cancelled() {
            return;
        }
        ctl.state.consecutive_errors = 0;

        if batch.is_empty() {
            log::debug!("No new events to process");
            return;
        }
        log::debug!("Processing {} new events", batch.len());

        let mut seen = HashSet::new();
        let delta: Vec<NormalizedEvent> = batch
            .iter()
            .filter(|e| !buffer.contains(&e.id) && seen.insert(e.id.as_str()))
            .cloned()
            .collect();

        ctl.state.last_event_id = batch.first().map(|e| e.id.clone());
        buffer.merge_batch(&batch);
        drop(ctl);

        let before = self.registry.len();
        self.registry.broadcast(&delta);
        drop(buffer);

        for event in delta {
            // No observers is fine.
            let _ = self.notices.send(PollerNotice::Event(event));
        }

        if before > 0 {
            self.stop_if_idle();
        }
    }

    fn record_failure(self: &Arc<Self>, token: &CancellationToken, err: UpstreamError) {
        let mut ctl = self.control();
        if token.is_cancelled() {
            return;
        }
        ctl.state.consecutive_errors += 1;
        let count = ctl.state.consecutive_errors;
        log::error!("Error polling for events (attempt {}): {}", count, err);

        if count < self.settings.max_consecutive_errors {
            return;
        }

        log::error!("Stopping poller after {} consecutive errors", count);
        Self::halt(&mut ctl);
        drop(ctl);

        let _ = self.notices.send(PollerNotice::Error {
            consecutive_errors: count,
            message: format!("Too many consecutive polling errors: {err}"),
        });
        self.schedule_restart();
    }

    fn schedule_restart(self: &Arc<Self>) {
        if self.restart_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let delay = self.settings.polling_interval.saturating_mul(2);
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            shared.restart_pending.store(false, Ordering::Release);

            if shared.registry.is_empty() {
                log::info!("Skipping poller restart, no clients connected");
                return;
            }
            log::info!("Attempting to restart poller after consecutive errors");
            Shared::start(&shared);
        });
    }
}
