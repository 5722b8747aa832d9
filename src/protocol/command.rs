//! Command definitions
//!
//! Command identifiers and handshake activation entries.

use crate::error::ProtocolError;

/// Command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    RunFor = 0x01,
    GetTime = 0x02,
    GetMachine = 0x03,
    Adc = 0x04,
    Gpio = 0x05,
    SystemBus = 0x06,
}

impl CommandId {
    /// Human readable name, used in errors and logs
    pub fn name(self) -> &'static str {
        match self {
            CommandId::RunFor => "RunFor",
            CommandId::GetTime => "GetTime",
            CommandId::GetMachine => "GetMachine",
            CommandId::Adc => "Adc",
            CommandId::Gpio => "Gpio",
            CommandId::SystemBus => "SystemBus",
        }
    }
}

impl From<CommandId> for u8 {
    fn from(command: CommandId) -> Self {
        command as u8
    }
}

impl TryFrom<u8> for CommandId {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(CommandId::RunFor),
            0x02 => Ok(CommandId::GetTime),
            0x03 => Ok(CommandId::GetMachine),
            0x04 => Ok(CommandId::Adc),
            0x05 => Ok(CommandId::Gpio),
            0x06 => Ok(CommandId::SystemBus),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// A (command id, version) pair declared during the handshake
///
/// Uniqueness is not enforced; the server may reject duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub command: u8,
    pub version: u8,
}

impl Activation {
    pub const fn new(command: CommandId, version: u8) -> Self {
        Self {
            command: command as u8,
            version,
        }
    }

    /// Entry with a raw command byte, for ids this client has no enum for
    pub const fn raw(command: u8, version: u8) -> Self {
        Self { command, version }
    }
}

/// Activation list understood by current servers
pub const DEFAULT_ACTIVATIONS: [Activation; 6] = [
    Activation::new(CommandId::RunFor, 0),
    Activation::new(CommandId::GetTime, 0),
    Activation::new(CommandId::GetMachine, 0),
    Activation::new(CommandId::Adc, 0),
    Activation::new(CommandId::Gpio, 1),
    Activation::new(CommandId::SystemBus, 0),
];
