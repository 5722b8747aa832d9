//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format (all integers little-endian)
//!
//! ### Handshake
//! ```text
//! ┌──────────┬───────────────────────────────┐       ┌──────────┐
//! │ Count(2) │ count × (Cmd (1), Version (1))│  ──▶  │ Code (1) │
//! └──────────┴───────────────────────────────┘       └──────────┘
//! ```
//!
//! ### Request Format
//! ```text
//! ┌─────────────┬──────────┬──────────┬─────────────────────────────┐
//! │ 'R' 'E' (2) │ Cmd (1)  │ Len (4)  │         Payload             │
//! └─────────────┴──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Response Format
//! ```text
//! ┌──────────┬────────────┬──────────┬─────────────────────────────┐
//! │ Code (1) │ [Echo (1)] │ [Len (4) │         Payload]            │
//! └──────────┴────────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! | code                 | echo | len + payload |
//! |----------------------|------|---------------|
//! | CommandFailed        | yes  | yes           |
//! | FatalError           | no   | yes           |
//! | InvalidCommand       | yes  | no            |
//! | SuccessWithData      | yes  | yes           |
//! | SuccessWithoutData   | yes  | no            |
//!
//! ### Async Event Format
//! ```text
//! ┌──────────┬─────────┬──────────────┬──────────┬──────────────┐
//! │ Code (1) │ Cmd (1) │ Callback (4) │ Len (4)  │     Data     │
//! └──────────┴─────────┴──────────────┴──────────┴──────────────┘
//! ```

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use super::{Activation, AsyncEventFrame, Frame, ResponseFrame, ReturnCode, ReturnCodeTable};
use crate::error::{DispatchError, HandshakeError, ProtocolError};

/// Request frame magic
pub const MAGIC: [u8; 2] = *b"RE";

/// Request header size: magic (2) + command (1) + length (4)
pub const REQUEST_HEADER_SIZE: usize = 7;

/// Largest activation list the 2-byte count can describe
pub const MAX_ACTIVATIONS: usize = u16::MAX as usize;

/// Largest request payload the 4-byte length can describe
pub const MAX_REQUEST_PAYLOAD: usize = u32::MAX as usize;

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// A decoded request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub command: u8,
    pub payload: Vec<u8>,
}

/// Encode a request frame
///
/// Produces exactly `7 + payload.len()` bytes. Payloads the length field
/// cannot describe are rejected with `PayloadTooLarge`.
pub fn encode_request(command: impl Into<u8>, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = request_payload_len(payload.len())?;
    let mut frame = BytesMut::with_capacity(REQUEST_HEADER_SIZE + payload.len());
    frame.put_slice(&MAGIC);
    frame.put_u8(command.into());
    frame.put_u32_le(len);
    frame.put_slice(payload);
    Ok(frame.to_vec())
}

fn request_payload_len(len: usize) -> Result<u32, ProtocolError> {
    u32::try_from(len).map_err(|_| ProtocolError::PayloadTooLarge {
        len,
        max: MAX_REQUEST_PAYLOAD,
    })
}

/// Decode a request frame from a complete buffer
pub fn decode_request(bytes: &[u8]) -> Result<RequestFrame, ProtocolError> {
    if bytes.len() < REQUEST_HEADER_SIZE {
        return Err(ProtocolError::IncompleteFrame {
            expected: REQUEST_HEADER_SIZE,
            actual: bytes.len(),
        });
    }

    let mut header = &bytes[..REQUEST_HEADER_SIZE];
    let magic = [header.get_u8(), header.get_u8()];
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }
    let command = header.get_u8();
    let payload_len = header.get_u32_le() as usize;

    let total_len = REQUEST_HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(ProtocolError::IncompleteFrame {
            expected: total_len,
            actual: bytes.len(),
        });
    }

    Ok(RequestFrame {
        command,
        payload: bytes[REQUEST_HEADER_SIZE..total_len].to_vec(),
    })
}

// =============================================================================
// Handshake Encoding
// =============================================================================

/// Encode the handshake activation list
///
/// Entries are written in the given order, without reordering or dedup.
pub fn encode_handshake(activations: &[Activation]) -> Result<Vec<u8>, HandshakeError> {
    if activations.len() > MAX_ACTIVATIONS {
        return Err(HandshakeError::TooManyActivations(activations.len()));
    }

    let mut buf = BytesMut::with_capacity(2 + activations.len() * 2);
    buf.put_u16_le(activations.len() as u16);
    for activation in activations {
        buf.put_u8(activation.command);
        buf.put_u8(activation.version);
    }
    Ok(buf.to_vec())
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Map the first response byte to a return code
pub fn decode_response_header(byte: u8, table: &ReturnCodeTable) -> Result<ReturnCode, ProtocolError> {
    table.decode(byte)
}

/// Encode a response frame
///
/// The echo and payload fields are emitted only where the return code
/// defines them, whatever the frame holds.
pub fn encode_response(table: &ReturnCodeTable, response: &ResponseFrame) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(6 + response.payload.len());
    buf.put_u8(table.encode(response.code));
    if response.code.has_echoed_command() {
        buf.put_u8(response.echoed.unwrap_or(0));
    }
    if response.code.has_payload() {
        buf.put_u32_le(response.payload.len() as u32);
        buf.put_slice(&response.payload);
    }
    buf.to_vec()
}

/// Encode an async event frame
pub fn encode_async_event(table: &ReturnCodeTable, event: &AsyncEventFrame) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(10 + event.data.len());
    buf.put_u8(table.async_event);
    buf.put_u8(event.command);
    buf.put_u32_le(event.callback_id);
    buf.put_u32_le(event.data.len() as u32);
    buf.put_slice(&event.data);
    buf.to_vec()
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read until `buf` is full or the stream reports end of file.
///
/// Returns the number of bytes read; less than `buf.len()` only on EOF.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read exactly `len` bytes of an already started frame
fn read_section<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, DispatchError> {
    let mut buf = vec![0u8; len];
    let received = read_full(reader, &mut buf)?;
    if received < len {
        return Err(DispatchError::TruncatedFrame {
            expected: len,
            received,
        });
    }
    Ok(buf)
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, DispatchError> {
    Ok(read_section(reader, 1)?[0])
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, DispatchError> {
    let bytes = read_section(reader, 4)?;
    let mut cursor = &bytes[..];
    Ok(cursor.get_u32_le())
}

fn read_payload<R: Read>(reader: &mut R, max_payload: usize) -> Result<Vec<u8>, DispatchError> {
    let len = read_u32(reader)? as usize;
    if len > max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            len,
            max: max_payload,
        }
        .into());
    }
    read_section(reader, len)
}

/// Read one complete frame from the response path.
///
/// The shape of everything after the first byte depends on the return
/// code. A stream that closes before the first byte yields
/// `ConnectionClosed`; one that closes mid-frame yields `TruncatedFrame`.
/// Nothing past the end of the frame is consumed.
pub fn read_frame<R: Read>(
    reader: &mut R,
    table: &ReturnCodeTable,
    max_payload: usize,
) -> Result<Frame, DispatchError> {
    let mut first = [0u8; 1];
    if read_full(reader, &mut first)? == 0 {
        return Err(DispatchError::ConnectionClosed);
    }
    let code = decode_response_header(first[0], table)?;

    if code == ReturnCode::AsyncEvent {
        let command = read_u8(reader)?;
        let callback_id = read_u32(reader)?;
        let data = read_payload(reader, max_payload)?;
        return Ok(Frame::Event(AsyncEventFrame {
            command,
            callback_id,
            data,
        }));
    }

    let echoed = if code.has_echoed_command() {
        Some(read_u8(reader)?)
    } else {
        None
    };

    let payload = if code.has_payload() {
        read_payload(reader, max_payload)?
    } else {
        Vec::new()
    };

    Ok(Frame::Response(ResponseFrame {
        code,
        echoed,
        payload,
    }))
}

/// Read a complete request frame from a stream
pub fn read_request<R: Read>(reader: &mut R, max_payload: usize) -> Result<RequestFrame, DispatchError> {
    let mut header = [0u8; REQUEST_HEADER_SIZE];
    let received = read_full(reader, &mut header)?;
    if received == 0 {
        return Err(DispatchError::ConnectionClosed);
    }
    if received < REQUEST_HEADER_SIZE {
        return Err(DispatchError::TruncatedFrame {
            expected: REQUEST_HEADER_SIZE,
            received,
        });
    }

    let mut cursor = &header[..];
    let magic = [cursor.get_u8(), cursor.get_u8()];
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic(magic).into());
    }
    let command = cursor.get_u8();
    let payload_len = cursor.get_u32_le() as usize;
    if payload_len > max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload_len,
            max: max_payload,
        }
        .into());
    }

    let payload = read_section(reader, payload_len)?;
    Ok(RequestFrame { command, payload })
}

/// Write a request frame to a stream in one piece
///
/// An oversized payload fails with `InvalidInput` before anything is written.
pub fn write_request<W: Write>(writer: &mut W, command: impl Into<u8>, payload: &[u8]) -> io::Result<()> {
    let frame = encode_request(command, payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    writer.write_all(&frame)?;
    writer.flush()
}

/// Lowercase hex rendering of a byte slice, for diagnostics
pub fn hex_dump(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
