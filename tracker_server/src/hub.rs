//! Broadcast hub: fan-out of stock updates and alerts to live subscribers.
//!
//! The hub thread is the only owner of the subscriber set. Every change to
//! that set, and every fan-out over it, arrives as a `HubEvent` on one bounded
//! channel and is applied in arrival order, so the set needs no lock:
//!
//! - `Register` inserts the subscriber's outbound queue.
//! - `Unregister` removes it and drops the queue's sender, which ends the
//!   subscriber's egress relay. Unknown ids are ignored.
//! - `Publish` offers the frame to every queue with `try_send`. A full queue
//!   marks a consumer that stopped draining: it is evicted on the spot instead
//!   of stalling the hub or silently losing this one message.
//! - `Shutdown` drops every queue and ends the loop.
//!
//! `HubHandle` is the cloneable front door. Register/unregister wait for room
//! on the event channel; publishing never waits and drops the message (with a
//! warning) when the channel is full.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, error, info, warn};
use tracker_common::{Alert, Message, Stock};

use crate::metrics::Metrics;

/// Identity of a live subscriber, unique within the process.
pub type SubscriberId = u64;

/// One serialized `Message`, shared by every queue it is delivered to.
pub type Frame = Arc<str>;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Hub-side half of a subscriber: its identity and the sending end of its
/// private outbound queue. The receiving end goes to the egress relay.
pub struct Subscriber {
    id: SubscriberId,
    outbound: Sender<Frame>,
}

impl Subscriber {
    /// New subscriber with a queue of `capacity` frames.
    pub fn new(capacity: usize) -> (Self, Receiver<Frame>) {
        let (outbound, inbox) = bounded(capacity.max(1));
        let id = NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, outbound }, inbox)
    }

    /// Identity the hub and both relays use for this subscriber.
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

enum HubEvent {
    Register(Subscriber),
    Unregister(SubscriberId),
    Publish(Frame),
    Shutdown,
}

/// Cloneable handle used by the tracker, the alert monitor and connections.
#[derive(Clone)]
pub struct HubHandle {
    events: Sender<HubEvent>,
    metrics: Arc<Metrics>,
}

impl HubHandle {
    /// Hand a new subscriber to the hub. Does not wait for it to be processed.
    pub fn register(&self, subscriber: Subscriber) {
        let id = subscriber.id;
        if self.events.send(HubEvent::Register(subscriber)).is_err() {
            warn!("Hub is closed, dropping subscriber {}", id);
        }
    }

    /// Ask the hub to forget `id` and close its queue.
    pub fn unregister(&self, id: SubscriberId) {
        if self.events.send(HubEvent::Unregister(id)).is_err() {
            debug!("Hub is closed, unregister of subscriber {} ignored", id);
        }
    }

    /// Offer a `stock_update` envelope to every subscriber. Never blocks.
    pub fn publish_stock_update(&self, stock: &Stock) {
        self.publish(Message::StockUpdate(stock.clone()));
    }

    /// Offer an `alert` envelope to every subscriber. Never blocks.
    pub fn publish_alert(&self, alert: &Alert) {
        self.publish(Message::Alert(alert.clone()));
    }

    fn publish(&self, message: Message) {
        let frame: Frame = match message.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!("Failed to encode broadcast message: {}", e);
                return;
            }
        };
        match self.events.try_send(HubEvent::Publish(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.record_broadcast_dropped();
                warn!("Broadcast channel full, dropping {} message", kind(&message));
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Hub is closed, dropping {} message", kind(&message));
            }
        }
    }

    /// Close every subscriber queue and stop the hub thread.
    pub fn shutdown(&self) {
        if self.events.send(HubEvent::Shutdown).is_err() {
            debug!("Hub already stopped");
        }
    }
}

fn kind(message: &Message) -> &'static str {
    match message {
        Message::StockUpdate(_) => "stock_update",
        Message::Alert(_) => "alert",
    }
}

/// Single consumer of the hub event stream.
pub struct Hub {
    events: Receiver<HubEvent>,
    subscribers: HashMap<SubscriberId, Sender<Frame>>,
    metrics: Arc<Metrics>,
}

impl Hub {
    /// Create a hub whose event channel holds `capacity` pending events.
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> (Self, HubHandle) {
        let (events_tx, events_rx) = bounded(capacity.max(1));
        let hub = Self {
            events: events_rx,
            subscribers: HashMap::new(),
            metrics: Arc::clone(&metrics),
        };
        let handle = HubHandle {
            events: events_tx,
            metrics,
        };
        (hub, handle)
    }

    /// Run the event loop on a dedicated thread.
    pub fn start(self) -> JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    /// Process events until `Shutdown` arrives or every handle is dropped.
    pub fn run(mut self) {
        info!("Broadcast hub started");
        while let Ok(event) = self.events.recv() {
            if !self.handle(event) {
                break;
            }
        }
        self.close_all();
        info!("Broadcast hub stopped");
    }

    /// Apply one event; returns `false` on shutdown.
    fn handle(&mut self, event: HubEvent) -> bool {
        match event {
            HubEvent::Register(subscriber) => {
                self.subscribers.insert(subscriber.id, subscriber.outbound);
                self.report();
                info!(
                    "Subscriber {} connected, total_subscribers={}",
                    subscriber.id,
                    self.subscribers.len()
                );
            }
            HubEvent::Unregister(id) => {
                if self.subscribers.remove(&id).is_some() {
                    self.report();
                    info!(
                        "Subscriber {} disconnected, total_subscribers={}",
                        id,
                        self.subscribers.len()
                    );
                }
            }
            HubEvent::Publish(frame) => self.fan_out(&frame),
            HubEvent::Shutdown => return false,
        }
        true
    }

    fn fan_out(&mut self, frame: &Frame) {
        let metrics = &self.metrics;
        let before = self.subscribers.len();
        self.subscribers
            .retain(|id, outbound| match outbound.try_send(Arc::clone(frame)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber {} is not draining its queue, evicting", id);
                    metrics.record_eviction();
                    false
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Subscriber {} relay already gone, removing", id);
                    false
                }
            });
        if self.subscribers.len() != before {
            self.report();
        }
    }

    fn close_all(&mut self) {
        let closed = self.subscribers.len();
        self.subscribers.clear();
        self.report();
        if closed > 0 {
            info!("Closed {} subscriber queues", closed);
        }
    }

    fn report(&self) {
        self.metrics.set_active_subscribers(self.subscribers.len());
    }

    /// Apply every event already queued; returns `false` if one was `Shutdown`.
    #[cfg(test)]
    pub(crate) fn process_pending(&mut self) -> bool {
        while let Ok(event) = self.events.try_recv() {
            if !self.handle(event) {
                self.close_all();
                return false;
            }
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
