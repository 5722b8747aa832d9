//! Time control
//!
//! `RunFor` and `GetTime` on a session. Durations and timestamps travel as
//! u64 microseconds; `TimeUnit` is only a multiplier.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use super::pending::Pending;
use crate::error::{Error, Result};
use crate::network::Session;
use crate::protocol::CommandId;

/// Scale of a duration or timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum TimeUnit {
    Microseconds = 1,
    Milliseconds = 1_000,
    Seconds = 1_000_000,
}

impl TimeUnit {
    /// Microseconds per unit
    pub fn scale(self) -> u64 {
        self as u64
    }

    /// Convert to microseconds; `None` on overflow
    pub fn to_micros(self, value: u64) -> Option<u64> {
        value.checked_mul(self.scale())
    }

    /// Convert from microseconds, truncating any remainder
    pub fn from_micros(self, micros: u64) -> u64 {
        micros / self.scale()
    }
}

fn encode_run_for(duration: u64, unit: TimeUnit) -> Result<Vec<u8>> {
    let micros = unit.to_micros(duration).ok_or_else(|| {
        Error::InvalidArgument(format!("duration {duration} {unit:?} overflows u64 microseconds"))
    })?;
    let mut payload = BytesMut::with_capacity(8);
    payload.put_u64_le(micros);
    Ok(payload.to_vec())
}

fn decode_time(reply: &[u8], unit: TimeUnit) -> Result<u64> {
    if reply.len() != 8 {
        return Err(Error::MalformedReply {
            command: CommandId::GetTime.name(),
            expected: 8,
            actual: reply.len(),
        });
    }
    let mut cursor = reply;
    Ok(unit.from_micros(cursor.get_u64_le()))
}

impl Session {
    /// Advance emulation by `duration` in `unit`
    pub fn run_for(&self, duration: u64, unit: TimeUnit) -> Result<()> {
        let payload = encode_run_for(duration, unit)?;
        self.dispatch(CommandId::RunFor, &payload)?;
        Ok(())
    }

    /// `run_for` on a background thread. Still one request in flight.
    pub fn run_for_async(self: &Arc<Self>, duration: u64, unit: TimeUnit) -> Pending<()> {
        let session = Arc::clone(self);
        Pending::spawn(move || session.run_for(duration, unit))
    }

    /// Current emulation time in `unit`.
    ///
    /// Integer division: a partial unit is truncated.
    pub fn get_time(&self, unit: TimeUnit) -> Result<u64> {
        let reply = self.dispatch(CommandId::GetTime, &[])?;
        decode_time(&reply, unit)
    }

    /// `get_time` on a background thread
    pub fn get_time_async(self: &Arc<Self>, unit: TimeUnit) -> Pending<u64> {
        let session = Arc::clone(self);
        Pending::spawn(move || session.get_time(unit))
    }
}
