use crate::types::{PresentImageCommand, RegisterImageCommand, RuntimeInfo};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::net::SocketAddr;
use std::sync::{Mutex, RwLock};

/// Notifications raised by the transport thread.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected { peer: SocketAddr },
    Disconnected,
    RuntimeInfo(RuntimeInfo),
    RegisterImage(RegisterImageCommand),
    PresentImage(PresentImageCommand),
}

type Observer = Box<dyn Fn(&TransportEvent) + Send + Sync>;

/// Ordered fan-out of transport events.
///
/// Observers registered with [`EventBus::subscribe`] run synchronously on the
/// emitting thread, in registration order. Consumers with their own thread
/// take a bounded channel from [`EventBus::channel`] instead; a channel that
/// is full when an event arrives misses that event.
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<Observer>>,
    channels: Mutex<Vec<Sender<TransportEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        match self.observers.write() {
            Ok(mut observers) => observers.push(Box::new(observer)),
            Err(poisoned) => poisoned.into_inner().push(Box::new(observer)),
        }
    }

    /// Deliver events into a bounded channel. Dropping the receiver
    /// unsubscribes it.
    pub fn channel(&self, capacity: usize) -> Receiver<TransportEvent> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        match self.channels.lock() {
            Ok(mut channels) => channels.push(sender),
            Err(poisoned) => poisoned.into_inner().push(sender),
        }
        receiver
    }

    pub fn emit(&self, event: TransportEvent) {
        {
            let observers = match self.observers.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for observer in observers.iter() {
                observer(&event);
            }
        }

        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("Event channel full, dropping {:?}", event);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let observers = self.observers.read().map(|o| o.len()).unwrap_or(0);
        let channels = self.channels.lock().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("EventBus")
            .field("observers", &observers)
            .field("channels", &channels)
            .finish()
    }
}
