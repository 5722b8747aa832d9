//! System bus access
//!
//! A `SysBus` hands out `BusContext`s, each bound to one initiator node.
//! Accesses go through a context.
//!
//! ## Widths
//! Scalar accesses use `Byte`..`QWord`; the value must fit the width.
//! `MultiByte` moves a byte buffer and is only valid for `read_bytes` and
//! `write_bytes`. Everything is checked before anything is sent.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use super::peripheral::{decode_descriptor, put_name};
use crate::error::{Error, Result};
use crate::network::Session;
use crate::protocol::CommandId;

/// Width of a bus access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AccessWidth {
    MultiByte = 0,
    Byte = 1,
    Word = 2,
    DWord = 4,
    QWord = 8,
}

impl AccessWidth {
    /// Bytes per scalar access; 0 for `MultiByte`
    pub fn bytes(self) -> usize {
        self as usize
    }

    /// Largest value a scalar access of this width can carry
    pub fn max_value(self) -> u64 {
        match self {
            AccessWidth::MultiByte => 0,
            AccessWidth::Byte => u8::MAX as u64,
            AccessWidth::Word => u16::MAX as u64,
            AccessWidth::DWord => u32::MAX as u64,
            AccessWidth::QWord => u64::MAX,
        }
    }
}

impl TryFrom<u8> for AccessWidth {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(AccessWidth::MultiByte),
            1 => Ok(AccessWidth::Byte),
            2 => Ok(AccessWidth::Word),
            4 => Ok(AccessWidth::DWord),
            8 => Ok(AccessWidth::QWord),
            other => Err(Error::InvalidArgument(format!("invalid access width {other}"))),
        }
    }
}

/// Unsigned integer that maps onto one scalar access width
pub trait BusValue: Copy {
    const WIDTH: AccessWidth;

    fn to_u64(self) -> u64;

    fn from_u64(value: u64) -> Self;
}

macro_rules! impl_bus_value {
    ($($ty:ty => $width:ident),* $(,)?) => {
        $(
            impl BusValue for $ty {
                const WIDTH: AccessWidth = AccessWidth::$width;

                fn to_u64(self) -> u64 {
                    self as u64
                }

                fn from_u64(value: u64) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

impl_bus_value!(u8 => Byte, u16 => Word, u32 => DWord, u64 => QWord);

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum BusOp {
    GetContext = 0,
    Read = 1,
    Write = 2,
}

/// Handle to a machine's system bus
#[derive(Debug)]
pub struct SysBus {
    session: Arc<Session>,
    descriptor: i32,
    path: String,
}

impl SysBus {
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

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Context for accesses initiated by the node at `node_path`
    pub fn bus_context(&self, node_path: &str) -> Result<Arc<BusContext>> {
        let mut payload = BytesMut::with_capacity(9 + node_path.len());
        payload.put_i32_le(self.descriptor);
        payload.put_u8(BusOp::GetContext as u8);
        put_name(&mut payload, node_path)?;

        let reply = self.session.dispatch(CommandId::SystemBus, &payload)?;
        let descriptor = decode_descriptor(CommandId::SystemBus, &reply)?.ok_or_else(|| {
            Error::NotFound {
                kind: "bus context",
                name: node_path.to_string(),
            }
        })?;
        Ok(Arc::new(BusContext {
            session: Arc::clone(&self.session),
            descriptor,
            node_path: node_path.to_string(),
        }))
    }
}

/// Bus access from one initiator
#[derive(Debug)]
pub struct BusContext {
    session: Arc<Session>,
    descriptor: i32,
    node_path: String,
}

impl BusContext {
    pub fn descriptor(&self) -> i32 {
        self.descriptor
    }

    pub fn node_path(&self) -> &str {
        &self.node_path
    }

    fn header(&self, op: BusOp, width: AccessWidth, address: u64, count: u32, extra: usize) -> BytesMut {
        let mut payload = BytesMut::with_capacity(18 + extra);
        payload.put_i32_le(self.descriptor);
        payload.put_u8(op as u8);
        payload.put_u8(width as u8);
        payload.put_u64_le(address);
        payload.put_u32_le(count);
        payload
    }

    /// Read one scalar of `width` at `address`
    pub fn read(&self, address: u64, width: AccessWidth) -> Result<u64> {
        if width == AccessWidth::MultiByte {
            return Err(Error::InvalidArgument(
                "scalar read needs a fixed access width".to_string(),
            ));
        }
        let payload = self.header(BusOp::Read, width, address, 1, 0);
        let reply = self.session.dispatch(CommandId::SystemBus, &payload)?;
        if reply.len() != width.bytes() {
            return Err(Error::MalformedReply {
                command: CommandId::SystemBus.name(),
                expected: width.bytes(),
                actual: reply.len(),
            });
        }
        let mut raw = [0u8; 8];
        raw[..reply.len()].copy_from_slice(&reply);
        Ok(u64::from_le_bytes(raw))
    }

    /// Write one scalar of `width` at `address`
    pub fn write(&self, address: u64, width: AccessWidth, value: u64) -> Result<()> {
        if width == AccessWidth::MultiByte {
            return Err(Error::InvalidArgument(
                "scalar write needs a fixed access width".to_string(),
            ));
        }
        if value > width.max_value() {
            return Err(Error::InvalidArgument(format!(
                "value {value:#x} does not fit {width:?}"
            )));
        }
        let mut payload = self.header(BusOp::Write, width, address, 1, width.bytes());
        payload.put_slice(&value.to_le_bytes()[..width.bytes()]);
        self.session.dispatch(CommandId::SystemBus, &payload)?;
        Ok(())
    }

    /// Typed scalar read
    pub fn read_value<T: BusValue>(&self, address: u64) -> Result<T> {
        self.read(address, T::WIDTH).map(T::from_u64)
    }

    /// Typed scalar write
    pub fn write_value<T: BusValue>(&self, address: u64, value: T) -> Result<()> {
        self.write(address, T::WIDTH, value.to_u64())
    }

    /// Read `count` bytes starting at `address`
    pub fn read_bytes(&self, address: u64, count: u32) -> Result<Vec<u8>> {
        if count == 0 {
            return Err(Error::InvalidArgument("read of zero bytes".to_string()));
        }
        let payload = self.header(BusOp::Read, AccessWidth::MultiByte, address, count, 0);
        let reply = self.session.dispatch(CommandId::SystemBus, &payload)?;
        if reply.len() != count as usize {
            return Err(Error::MalformedReply {
                command: CommandId::SystemBus.name(),
                expected: count as usize,
                actual: reply.len(),
            });
        }
        Ok(reply)
    }

    /// Write `data` starting at `address`
    pub fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("write of zero bytes".to_string()));
        }
        let count = u32::try_from(data.len()).map_err(|_| {
            Error::InvalidArgument(format!("write of {} bytes is too large", data.len()))
        })?;
        let mut payload = self.header(BusOp::Write, AccessWidth::MultiByte, address, count, data.len());
        payload.put_slice(data);
        self.session.dispatch(CommandId::SystemBus, &payload)?;
        Ok(())
    }
}
