use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use crate::events::{Event, EventKind};

/// A handler for player events.
///
/// Handlers are called from a dedicated delivery task, never from a node's
/// read loop. A handler that needs to do asynchronous work should spawn it.
///
/// Any `Fn(&Event) + Send + Sync` closure is a handler.
pub trait EventHandler: Send + Sync + 'static {
    /// Tymethod called with each event of the kinds the handler was
    /// registered for.
    fn handle(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    fn handle(&self, event: &Event) {
        self(event)
    }
}

type HandlerTable = HashMap<EventKind, Vec<Arc<dyn EventHandler>>>;

/// Registered handlers, keyed by event kind, and the queue feeding them.
///
/// Handlers registered for the same kind are called in registration order.
pub struct Listeners {
    handlers: Arc<RwLock<HandlerTable>>,
    queue: UnboundedSender<Event>,
}

impl Listeners {
    /// Creates the table and spawns its delivery task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let handlers = Arc::new(RwLock::new(HashMap::new()));
        let (queue, rx) = mpsc::unbounded_channel();

        tokio::spawn(deliver(Arc::clone(&handlers), rx));

        Self {
            handlers,
            queue,
        }
    }

    /// Registers a handler for a kind of event.
    pub fn register(&self, kind: EventKind, handler: impl EventHandler) {
        let mut handlers = match self.handlers.write() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };

        handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// The number of handlers registered for a kind of event.
    pub fn count(&self, kind: EventKind) -> usize {
        match self.handlers.read() {
            Ok(handlers) => handlers.get(&kind).map_or(0, Vec::len),
            Err(poisoned) => poisoned.into_inner().get(&kind).map_or(0, Vec::len),
        }
    }

    /// Queues an event for delivery. Never blocks.
    pub fn dispatch(&self, event: Event) {
        if self.queue.send(event).is_err() {
            warn!("Event delivery task is gone; dropping event");
        }
    }
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver(handlers: Arc<RwLock<HandlerTable>>, mut rx: UnboundedReceiver<Event>) {
    while let Some(event) = rx.recv().await {
        // Clone the handler list out so registration isn't blocked while
        // handlers run.
        let targets = {
            let handlers = match handlers.read() {
                Ok(handlers) => handlers,
                Err(poisoned) => poisoned.into_inner(),
            };

            handlers.get(&event.kind()).cloned().unwrap_or_default()
        };

        trace!("Delivering {:?} to {} handler(s)", event.kind(), targets.len());

        for handler in targets {
            let handled = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&event)));

            if handled.is_err() {
                error!("Handler for {:?} panicked", event.kind());
            }
        }
    }

    debug!("Event delivery task shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn start(guild_id: &str) -> Event {
        Event::TrackStart {
            guild_id: guild_id.to_owned(),
            track: "QAAA".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_insertion_order() {
        let listeners = Listeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for idx in 0..3 {
            let seen = Arc::clone(&seen);
            let done_tx = done_tx.clone();

            listeners.register(EventKind::TrackStart, move |_: &Event| {
                seen.lock().unwrap().push(idx);
                let _ = done_tx.send(());
            });
        }

        listeners.dispatch(start("1"));

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(2), done_rx.recv()).await.unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(listeners.count(EventKind::TrackStart), 3);
        assert_eq!(listeners.count(EventKind::TrackEnd), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_delivery() {
        let listeners = Listeners::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        listeners.register(EventKind::TrackStart, |_: &Event| panic!("handler failure"));
        listeners.register(EventKind::TrackStart, move |event: &Event| {
            let _ = tx.send(event.guild_id().to_owned());
        });

        listeners.dispatch(start("1"));
        listeners.dispatch(start("2"));

        for guild_id in ["1", "2"] {
            let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
            assert_eq!(seen.as_deref(), Some(guild_id));
        }
    }

    #[tokio::test]
    async fn test_only_matching_kind() {
        let listeners = Listeners::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        listeners.register(EventKind::TrackEnd, move |event: &Event| {
            let _ = tx.send(event.clone());
        });

        listeners.dispatch(start("1"));
        listeners.dispatch(Event::TrackEnd {
            guild_id: "1".to_owned(),
            track: "QAAA".to_owned(),
            reason: "FINISHED".into(),
        });

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.kind(), EventKind::TrackEnd);
        assert!(rx.try_recv().is_err());
    }
}
