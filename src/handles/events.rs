//! GPIO event routing
//!
//! Async events are read off the socket by whichever thread holds the
//! session lock, then queued to a dedicated delivery thread that invokes
//! the registered callbacks.
//!
//! ## Unregistration
//! `unregister` clears the registration's `active` flag and then waits on
//! the registration's callback mutex. Delivery checks the flag while holding
//! that mutex, so once `unregister` returns no invocation is running and none
//! will start, even for events already queued.
//! Unregistering from inside a callback skips the wait (the delivery thread
//! is the caller).
//!
//! ## Ownership
//! The router owns every callback, and the session owns the router. A
//! callback that captures a strong handle (`Arc<Gpio>`, `Arc<BusContext>`,
//! ...) keeps its own session alive. `clear` drops all callbacks and is run
//! when the session disconnects.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;

use bytes::Buf;
use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};

use super::gpio::GpioState;
use crate::protocol::{hex_dump, AsyncEventFrame};

/// GPIO event data: timestamp (8) + state (1)
const GPIO_EVENT_SIZE: usize = 9;

/// A GPIO pin state change reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioEvent {
    pub pin: u32,
    pub state: GpioState,
    /// Emulation time of the change
    pub timestamp_us: u64,
}

/// Id of a registered state change callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(pub(crate) u32);

impl CallbackHandle {
    /// Id as sent to the server
    pub fn id(self) -> u32 {
        self.0
    }
}

type Callback = Box<dyn FnMut(GpioEvent) + Send>;

struct Registration {
    pin: u32,
    active: AtomicBool,
    callback: Mutex<Callback>,
}

/// Callback registry shared by a session and its delivery thread
pub struct EventRouter {
    registrations: RwLock<HashMap<u32, Arc<Registration>>>,
    delivery_thread: OnceLock<ThreadId>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            delivery_thread: OnceLock::new(),
        }
    }

    /// Register `callback` for `pin` under `handle`
    pub(crate) fn register(&self, handle: CallbackHandle, pin: u32, callback: Callback) {
        let registration = Arc::new(Registration {
            pin,
            active: AtomicBool::new(true),
            callback: Mutex::new(callback),
        });
        self.registrations.write().insert(handle.0, registration);
    }

    /// Remove `handle`. Returns the pin it was registered for.
    ///
    /// No invocation of the callback runs after this returns.
    pub(crate) fn unregister(&self, handle: CallbackHandle) -> Option<u32> {
        let registration = self.registrations.write().remove(&handle.0)?;
        registration.active.store(false, Ordering::Release);

        let on_delivery_thread =
            self.delivery_thread.get() == Some(&std::thread::current().id());
        if !on_delivery_thread {
            // Wait out an invocation that is already running
            drop(registration.callback.lock());
        }
        Some(registration.pin)
    }

    /// Drop every registration.
    ///
    /// Unlike `unregister` this does not wait for a running invocation, so it
    /// is safe to call with the session lock held. No new invocation starts
    /// once it returns.
    pub(crate) fn clear(&self) {
        let drained = std::mem::take(&mut *self.registrations.write());
        if drained.is_empty() {
            return;
        }
        tracing::debug!("Dropping {} event callback(s)", drained.len());
        for registration in drained.values() {
            registration.active.store(false, Ordering::Release);
        }
        // Captured handles are released here, outside the map lock
        drop(drained);
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke the callback registered for `event`, if any
    pub(crate) fn deliver(&self, event: &AsyncEventFrame) {
        let registration = self.registrations.read().get(&event.callback_id).cloned();
        let Some(registration) = registration else {
            tracing::debug!("No callback {} registered; dropping event", event.callback_id);
            return;
        };

        let Some((timestamp_us, state)) = decode_gpio_event(&event.data) else {
            tracing::warn!(
                "Malformed GPIO event for callback {}: {}",
                event.callback_id,
                hex_dump(&event.data)
            );
            return;
        };

        let gpio_event = GpioEvent {
            pin: registration.pin,
            state,
            timestamp_us,
        };

        let mut callback = registration.callback.lock();
        if !registration.active.load(Ordering::Acquire) {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| (*callback)(gpio_event))).is_err() {
            tracing::warn!("GPIO callback {} panicked", event.callback_id);
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_gpio_event(data: &[u8]) -> Option<(u64, GpioState)> {
    if data.len() != GPIO_EVENT_SIZE {
        return None;
    }
    let mut cursor = data;
    let timestamp_us = cursor.get_u64_le();
    let state = GpioState::try_from(cursor.get_u8()).ok()?;
    Some((timestamp_us, state))
}

/// Start the delivery thread; it exits when the returned sender is dropped
pub(crate) fn spawn_event_delivery(router: Arc<EventRouter>) -> std::io::Result<Sender<AsyncEventFrame>> {
    let (tx, rx) = channel::unbounded::<AsyncEventFrame>();
    std::thread::Builder::new()
        .name("renode-events".to_string())
        .spawn(move || {
            let _ = router.delivery_thread.set(std::thread::current().id());
            for event in rx {
                router.deliver(&event);
            }
        })?;
    Ok(tx)
}
