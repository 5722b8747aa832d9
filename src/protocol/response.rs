//! Response definitions
//!
//! Return codes, their numeric mapping, and decoded response frames.

use crate::error::{DispatchError, ProtocolError};

/// Response return codes
///
/// The numeric value of each code is not fixed by this enum; it comes from
/// the session's `ReturnCodeTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    CommandFailed,
    FatalError,
    InvalidCommand,
    SuccessWithData,
    SuccessWithoutData,
    OkHandshake,
    AsyncEvent,
}

impl ReturnCode {
    /// Whether the echoed command byte follows the return code
    pub fn has_echoed_command(self) -> bool {
        matches!(
            self,
            ReturnCode::CommandFailed
                | ReturnCode::InvalidCommand
                | ReturnCode::SuccessWithData
                | ReturnCode::SuccessWithoutData
        )
    }

    /// Whether a 4-byte length and payload follow
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            ReturnCode::CommandFailed | ReturnCode::FatalError | ReturnCode::SuccessWithData
        )
    }
}

/// Numeric mapping between wire bytes and return codes
///
/// Server builds have disagreed on the numbering, so the table is part of
/// the client configuration and can be checked with `validate()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnCodeTable {
    pub command_failed: u8,
    pub fatal_error: u8,
    pub invalid_command: u8,
    pub success_with_data: u8,
    pub success_without_data: u8,
    pub async_event: u8,
    /// Only ever read as the single handshake reply byte
    pub ok_handshake: u8,
}

impl Default for ReturnCodeTable {
    fn default() -> Self {
        Self {
            command_failed: 0x00,
            fatal_error: 0x01,
            invalid_command: 0x02,
            success_with_data: 0x03,
            success_without_data: 0x04,
            ok_handshake: 0x05,
            async_event: 0x06,
        }
    }
}

impl ReturnCodeTable {
    /// Numbering starting CommandFailed at 1, with FatalError and
    /// AsyncEvent moved past SuccessWithoutData
    pub fn one_based() -> Self {
        Self {
            command_failed: 0x01,
            invalid_command: 0x02,
            success_with_data: 0x03,
            success_without_data: 0x05,
            fatal_error: 0x06,
            async_event: 0x07,
            ok_handshake: 0x05,
        }
    }

    fn command_path(&self) -> [(ReturnCode, u8); 6] {
        [
            (ReturnCode::CommandFailed, self.command_failed),
            (ReturnCode::FatalError, self.fatal_error),
            (ReturnCode::InvalidCommand, self.invalid_command),
            (ReturnCode::SuccessWithData, self.success_with_data),
            (ReturnCode::SuccessWithoutData, self.success_without_data),
            (ReturnCode::AsyncEvent, self.async_event),
        ]
    }

    /// Reject tables where two command-path codes share a byte.
    ///
    /// `ok_handshake` is excluded: it is only read during the handshake.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let codes = self.command_path();
        for (i, (a, byte_a)) in codes.iter().enumerate() {
            if let Some((b, _)) = codes[i + 1..].iter().find(|(_, byte_b)| byte_b == byte_a) {
                return Err(ProtocolError::InvalidReturnCodeTable(format!(
                    "{a:?} and {b:?} both map to 0x{byte_a:02x}"
                )));
            }
        }
        Ok(())
    }

    /// Map a command-path byte to its return code
    pub fn decode(&self, byte: u8) -> Result<ReturnCode, ProtocolError> {
        self.command_path()
            .into_iter()
            .find(|(_, value)| *value == byte)
            .map(|(code, _)| code)
            .ok_or(ProtocolError::UnknownReturnCode(byte))
    }

    /// Byte that represents `code` on the wire
    pub fn encode(&self, code: ReturnCode) -> u8 {
        match code {
            ReturnCode::CommandFailed => self.command_failed,
            ReturnCode::FatalError => self.fatal_error,
            ReturnCode::InvalidCommand => self.invalid_command,
            ReturnCode::SuccessWithData => self.success_with_data,
            ReturnCode::SuccessWithoutData => self.success_without_data,
            ReturnCode::OkHandshake => self.ok_handshake,
            ReturnCode::AsyncEvent => self.async_event,
        }
    }
}

/// A fully read command response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Return code
    pub code: ReturnCode,

    /// Echoed command byte, present only for codes that carry one
    pub echoed: Option<u8>,

    /// Payload (empty for codes without data)
    pub payload: Vec<u8>,
}

impl ResponseFrame {
    /// Check the echo and map the return code to a payload or an error
    pub fn into_result(self, expected: Option<u8>) -> Result<Vec<u8>, DispatchError> {
        if let (Some(expected), Some(echoed)) = (expected, self.echoed) {
            if expected != echoed {
                return Err(DispatchError::CommandMismatch { expected, echoed });
            }
        }

        match self.code {
            ReturnCode::SuccessWithData | ReturnCode::SuccessWithoutData => Ok(self.payload),
            ReturnCode::CommandFailed | ReturnCode::FatalError => Err(DispatchError::ServerReported {
                code: self.code,
                payload: self.payload,
            }),
            ReturnCode::InvalidCommand => Err(DispatchError::InvalidCommand),
            ReturnCode::AsyncEvent => Err(DispatchError::UnexpectedAsyncEvent {
                command: self.echoed.unwrap_or(0),
            }),
            ReturnCode::OkHandshake => Err(ProtocolError::UnexpectedReturnCode(self.code).into()),
        }
    }
}

/// An unsolicited event frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncEventFrame {
    /// Command family that produced the event
    pub command: u8,

    /// Server-side callback id, as registered by the client
    pub callback_id: u32,

    /// Event data
    pub data: Vec<u8>,
}

/// Anything that can arrive on the response path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Response(ResponseFrame),
    Event(AsyncEventFrame),
}
