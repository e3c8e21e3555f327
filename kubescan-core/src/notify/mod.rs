//! Live fan-out of completed scans.
//!
//! One dispatcher task owns the broadcast channel. [`NotificationHub::publish`]
//! returns only after the dispatcher has taken the message, and the
//! dispatcher then forwards it to each subscriber queue in registration
//! order, awaiting each queue in turn. A subscriber that stops draining its
//! queue therefore holds up delivery to every subscriber registered after it.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Outbound queue capacity per subscriber. One pending message keeps the
/// fan-out effectively unbuffered.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1;

/// Registry key. Ids increase in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving end of one subscription.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: SubscriberId,
    outbound: mpsc::Receiver<String>,
}

impl SubscriberHandle {
    /// Id to pass to [`NotificationHub::unsubscribe`].
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next published image id, or `None` once the subscriber was removed.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }
}

struct Envelope {
    image_id: String,
    accepted: oneshot::Sender<()>,
}

#[derive(Default)]
struct SubscriberRegistry {
    subscribers: Mutex<BTreeMap<SubscriberId, mpsc::Sender<String>>>,
}

impl SubscriberRegistry {
    fn insert(&self, id: SubscriberId, outbound: mpsc::Sender<String>) {
        self.subscribers.lock().insert(id, outbound);
    }

    fn remove(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    fn snapshot(&self) -> Vec<(SubscriberId, mpsc::Sender<String>)> {
        self.subscribers
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Subscriber registry plus the single dispatcher that fans messages out.
pub struct NotificationHub {
    registry: Arc<SubscriberRegistry>,
    dispatcher: OnceLock<mpsc::Sender<Envelope>>,
    next_id: AtomicU64,
    subscriber_buffer: usize,
}

impl fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscriber_count", &self.registry.len())
            .field("dispatcher_started", &self.dispatcher.get().is_some())
            .field("subscriber_buffer", &self.subscriber_buffer)
            .finish()
    }
}

impl NotificationHub {
    /// Hub with [`DEFAULT_SUBSCRIBER_BUFFER`].
    pub fn new() -> Self {
        Self::with_subscriber_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Hub whose subscriber queues hold `subscriber_buffer` messages (at
    /// least one).
    pub fn with_subscriber_buffer(subscriber_buffer: usize) -> Self {
        Self {
            registry: Arc::new(SubscriberRegistry::default()),
            dispatcher: OnceLock::new(),
            next_id: AtomicU64::new(0),
            subscriber_buffer: subscriber_buffer.max(1),
        }
    }

    /// Registers a subscriber. Must be called from within a Tokio runtime.
    pub fn subscribe(&self) -> SubscriberHandle {
        self.dispatcher();
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        self.registry.insert(id, tx);
        debug!(subscriber = %id, "subscriber registered");
        SubscriberHandle { id, outbound: rx }
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(subscriber = %id, "subscriber removed");
        }
        removed
    }

    /// Live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Hands `image_id` to the dispatcher and waits until it is accepted.
    pub async fn publish(&self, image_id: impl Into<String>) {
        let image_id = image_id.into();
        let (accepted, ack) = oneshot::channel();
        let envelope = Envelope {
            image_id: image_id.clone(),
            accepted,
        };

        if self.dispatcher().send(envelope).await.is_err() || ack.await.is_err() {
            warn!(image_id = %image_id, "notification dispatcher stopped; message dropped");
        }
    }

    fn dispatcher(&self) -> &mpsc::Sender<Envelope> {
        self.dispatcher.get_or_init(|| {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(dispatch_loop(self.registry.clone(), rx));
            tx
        })
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch_loop(registry: Arc<SubscriberRegistry>, mut inbox: mpsc::Receiver<Envelope>) {
    while let Some(Envelope { image_id, accepted }) = inbox.recv().await {
        let _ = accepted.send(());

        for (id, outbound) in registry.snapshot() {
            if outbound.send(image_id.clone()).await.is_err() {
                registry.remove(id);
                debug!(subscriber = %id, "pruned closed subscriber");
            }
        }
    }
    debug!("notification dispatcher exiting");
}
