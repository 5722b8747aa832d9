//! Peripheral lookup
//!
//! Peripherals are addressed by a closed set of kinds. Each kind maps to the
//! command family that serves it; lookups share one payload layout.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use super::adc::Adc;
use super::gpio::Gpio;
use super::sysbus::SysBus;
use crate::error::{Error, Result};
use crate::protocol::CommandId;

/// Instance field value that marks a descriptor lookup
const LOOKUP_INSTANCE: i32 = -1;

/// Kind of peripheral to look up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralKind {
    Adc,
    Gpio,
    SysBus,
}

impl PeripheralKind {
    /// Command family serving this kind
    pub fn command(self) -> CommandId {
        match self {
            PeripheralKind::Adc => CommandId::Adc,
            PeripheralKind::Gpio => CommandId::Gpio,
            PeripheralKind::SysBus => CommandId::SystemBus,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PeripheralKind::Adc => "ADC",
            PeripheralKind::Gpio => "GPIO",
            PeripheralKind::SysBus => "system bus",
        }
    }
}

/// A peripheral handle of any kind
#[derive(Debug, Clone)]
pub enum Peripheral {
    Adc(Arc<Adc>),
    Gpio(Arc<Gpio>),
    SysBus(Arc<SysBus>),
}

impl Peripheral {
    pub fn kind(&self) -> PeripheralKind {
        match self {
            Peripheral::Adc(_) => PeripheralKind::Adc,
            Peripheral::Gpio(_) => PeripheralKind::Gpio,
            Peripheral::SysBus(_) => PeripheralKind::SysBus,
        }
    }

    /// Server-side descriptor
    pub fn descriptor(&self) -> i32 {
        match self {
            Peripheral::Adc(adc) => adc.descriptor(),
            Peripheral::Gpio(gpio) => gpio.descriptor(),
            Peripheral::SysBus(bus) => bus.descriptor(),
        }
    }

    pub fn into_adc(self) -> Option<Arc<Adc>> {
        match self {
            Peripheral::Adc(adc) => Some(adc),
            _ => None,
        }
    }

    pub fn into_gpio(self) -> Option<Arc<Gpio>> {
        match self {
            Peripheral::Gpio(gpio) => Some(gpio),
            _ => None,
        }
    }

    pub fn into_sys_bus(self) -> Option<Arc<SysBus>> {
        match self {
            Peripheral::SysBus(bus) => Some(bus),
            _ => None,
        }
    }
}

// =============================================================================
// Payload helpers shared by the handle modules
// =============================================================================

/// Append a u32 length prefix and the UTF-8 bytes of `name`
pub(crate) fn put_name(buf: &mut BytesMut, name: &str) -> Result<()> {
    let len = u32::try_from(name.len())
        .map_err(|_| Error::InvalidArgument(format!("name of {} bytes is too long", name.len())))?;
    buf.put_u32_le(len);
    buf.put_slice(name.as_bytes());
    Ok(())
}

/// Lookup payload: instance (-1) + machine descriptor + name
pub(crate) fn encode_lookup(machine: i32, path: &str) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(12 + path.len());
    buf.put_i32_le(LOOKUP_INSTANCE);
    buf.put_i32_le(machine);
    put_name(&mut buf, path)?;
    Ok(buf.to_vec())
}

/// Decode a 4-byte signed descriptor reply; negative means not found
pub(crate) fn decode_descriptor(command: CommandId, reply: &[u8]) -> Result<Option<i32>> {
    if reply.len() != 4 {
        return Err(Error::MalformedReply {
            command: command.name(),
            expected: 4,
            actual: reply.len(),
        });
    }
    let mut cursor = reply;
    let descriptor = cursor.get_i32_le();
    Ok((descriptor >= 0).then_some(descriptor))
}

/// Decode a reply that must be exactly `N` bytes
pub(crate) fn fixed_reply<const N: usize>(command: CommandId, reply: &[u8]) -> Result<[u8; N]> {
    reply.try_into().map_err(|_| Error::MalformedReply {
        command: command.name(),
        expected: N,
        actual: reply.len(),
    })
}
