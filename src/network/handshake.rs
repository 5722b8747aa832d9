//! Handshake
//!
//! Sends the activation list once per session and checks the single-byte
//! acknowledgement.

use std::io::{self, Read, Write};

use crate::error::HandshakeError;
use crate::protocol::{encode_handshake, hex_dump, read_full, Activation, ReturnCodeTable};

/// Negotiate the activation list over `stream`.
///
/// The count is checked before any byte is written. Succeeds only if the
/// server answers with the table's `ok_handshake` byte.
pub fn handshake<S: Read + Write>(
    stream: &mut S,
    activations: &[Activation],
    table: &ReturnCodeTable,
) -> Result<(), HandshakeError> {
    let request = encode_handshake(activations)?;
    tracing::trace!("Handshake request: {}", hex_dump(&request));

    stream
        .write_all(&request)
        .and_then(|_| stream.flush())
        .map_err(closed_or_io)?;

    let mut response = [0u8; 1];
    if read_full(stream, &mut response).map_err(closed_or_io)? == 0 {
        return Err(HandshakeError::ConnectionClosed);
    }

    if response[0] != table.ok_handshake {
        return Err(HandshakeError::Rejected { code: response[0] });
    }

    tracing::debug!("Handshake accepted ({} activation(s))", activations.len());
    Ok(())
}

fn closed_or_io(err: io::Error) -> HandshakeError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => HandshakeError::ConnectionClosed,
        io::ErrorKind::NotConnected => HandshakeError::NotConnected,
        _ => HandshakeError::Io(err),
    }
}
