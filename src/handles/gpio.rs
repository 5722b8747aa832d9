//! GPIO handles
//!
//! Pin state access plus state change callbacks. Callbacks are registered
//! locally before the server is asked to report changes, so an event that
//! arrives right after the registration reply always finds its callback.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use super::events::{CallbackHandle, GpioEvent};
use super::peripheral::fixed_reply;
use crate::error::{Error, Result};
use crate::network::Session;
use crate::protocol::CommandId;

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GpioState {
    Low = 0,
    High = 1,
}

impl From<GpioState> for u8 {
    fn from(state: GpioState) -> Self {
        state as u8
    }
}

impl TryFrom<u8> for GpioState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(GpioState::Low),
            1 => Ok(GpioState::High),
            other => Err(Error::InvalidArgument(format!("invalid GPIO state {other}"))),
        }
    }
}

impl From<bool> for GpioState {
    fn from(high: bool) -> Self {
        if high {
            GpioState::High
        } else {
            GpioState::Low
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum GpioOp {
    GetState = 0,
    SetState = 1,
    RegisterEvent = 2,
    UnregisterEvent = 3,
}

/// Handle to a GPIO port
#[derive(Debug)]
pub struct Gpio {
    session: Arc<Session>,
    descriptor: i32,
    path: String,
}

impl Gpio {
    pub(crate) fn new(session: Arc<Session>, descriptor: i32, path: &str) -> Self {
        Self {
            session,
            descriptor,
            path: path.to_string(),
        }
    }

    pub fn descriptor(&self) -> i32 {
        self.descriptor
    }

    /// Peripheral path as looked up
    pub fn path(&self) -> &str {
        &self.path
    }

    fn request(&self, op: GpioOp, pin: u32, state: GpioState, callback_id: u32) -> Result<Vec<u8>> {
        let mut payload = BytesMut::with_capacity(14);
        payload.put_i32_le(self.descriptor);
        payload.put_u8(op as u8);
        payload.put_u32_le(pin);
        payload.put_u8(state.into());
        payload.put_u32_le(callback_id);
        Ok(self.session.dispatch(CommandId::Gpio, &payload)?)
    }

    /// Current level of `pin`
    pub fn get_state(&self, pin: u32) -> Result<GpioState> {
        let reply = self.request(GpioOp::GetState, pin, GpioState::Low, 0)?;
        let [state] = fixed_reply::<1>(CommandId::Gpio, &reply)?;
        GpioState::try_from(state)
    }

    /// Drive `pin` to `state`
    pub fn set_state(&self, pin: u32, state: GpioState) -> Result<()> {
        self.request(GpioOp::SetState, pin, state, 0)?;
        Ok(())
    }

    /// Call `callback` whenever `pin` changes state.
    ///
    /// Callbacks run on the session's event thread, never on the caller's.
    ///
    /// The session owns the callback until it is unregistered or the
    /// session disconnects. A callback that needs a handle should capture
    /// `Arc::downgrade(&gpio)` and upgrade it per event: capturing a strong
    /// `Arc` to any handle of the same session keeps the session, and its
    /// socket, alive after every other handle is gone.
    pub fn register_state_change_callback<F>(&self, pin: u32, callback: F) -> Result<CallbackHandle>
    where
        F: FnMut(GpioEvent) + Send + 'static,
    {
        let handle = CallbackHandle(self.session.next_callback_id());
        self.session.events().register(handle, pin, Box::new(callback));

        if let Err(e) = self.request(GpioOp::RegisterEvent, pin, GpioState::Low, handle.0) {
            self.session.events().unregister(handle);
            return Err(e);
        }
        tracing::debug!("GPIO '{}' pin {}: callback {} registered", self.path, pin, handle.0);
        Ok(handle)
    }

    /// Stop a callback. It is not invoked again once this returns,
    /// even if the server request fails.
    pub fn unregister(&self, handle: CallbackHandle) -> Result<()> {
        let pin = self.session.events().unregister(handle).ok_or_else(|| {
            Error::InvalidArgument(format!("callback {} is not registered", handle.0))
        })?;
        self.request(GpioOp::UnregisterEvent, pin, GpioState::Low, handle.0)?;
        tracing::debug!("GPIO '{}' pin {}: callback {} removed", self.path, pin, handle.0);
        Ok(())
    }
}
