//! Typed fan-out of inbound application messages.
//!
//! Each connection manager owns its own `Dispatcher` instance, so callbacks
//! registered by concurrent sessions can never leak into each other.
//! Connection-state changes are not routed through this map at all; they are
//! published on a dedicated watch channel by the connection manager.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::protocol::{MessageKind, ServerMessage};

/// Callback invoked for every inbound message of the kind it registered for.
pub type MessageCallback = Box<dyn FnMut(&ServerMessage) + Send + 'static>;

/// Registration token returned by [`Dispatcher::on`], used to remove exactly
/// that callback later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, kameo::Reply)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct Dispatcher {
    next_id: u64,
    listeners: HashMap<MessageKind, Vec<(ListenerId, MessageCallback)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback for `kind`; callbacks run in registration order.
    pub fn on(&mut self, kind: MessageKind, callback: MessageCallback) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.entry(kind).or_default().push((id, callback));
        id
    }

    /// Remove one callback. Returns false when the id is unknown for `kind`.
    pub fn off(&mut self, kind: MessageKind, id: ListenerId) -> bool {
        let Some(callbacks) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != id);
        callbacks.len() != before
    }

    /// Clear the callbacks for one kind, or everything.
    pub fn remove_all(&mut self, kind: Option<MessageKind>) {
        match kind {
            Some(kind) => {
                self.listeners.remove(&kind);
            }
            None => self.listeners.clear(),
        }
    }

    pub fn listener_count(&self, kind: MessageKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `message` to every callback registered for its kind.
    ///
    /// Each invocation is unwind-isolated: a panicking callback is logged and
    /// skipped without aborting delivery to the rest.
    pub fn dispatch(&mut self, message: &ServerMessage) -> usize {
        let Some(kind) = message.kind() else {
            return 0;
        };
        let Some(callbacks) = self.listeners.get_mut(&kind) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, callback) in callbacks.iter_mut() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(message)));
            match outcome {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    let detail = panic_detail(payload.as_ref());
                    error!(
                        kind = kind.as_str(),
                        listener = ?id,
                        panic = %detail,
                        "message callback panicked"
                    );
                }
            }
        }
        delivered
    }
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
