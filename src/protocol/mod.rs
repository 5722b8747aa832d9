//! Protocol Module
//!
//! Defines the External Control wire protocol. Pure transformations only;
//! nothing here owns a socket.
//!
//! ## Session Phases
//! 1. Handshake: activation list out, one status byte back
//! 2. Commands: strictly one request in flight, answered by one response,
//!    with unsolicited async events allowed in between
//!
//! ### Commands
//! - 0x01: RunFor     - Payload: u64 microseconds
//! - 0x02: GetTime    - Payload: empty, reply u64 microseconds
//! - 0x03: GetMachine - Payload: name_len (4) + name, reply i32 descriptor
//! - 0x04: Adc        - Payload: peripheral operation
//! - 0x05: Gpio       - Payload: peripheral operation
//! - 0x06: SystemBus  - Payload: bus operation
//!
//! ### Return Codes (default numbering)
//! - 0x00: COMMAND_FAILED
//! - 0x01: FATAL_ERROR
//! - 0x02: INVALID_COMMAND
//! - 0x03: SUCCESS_WITH_DATA
//! - 0x04: SUCCESS_WITHOUT_DATA
//! - 0x05: OK_HANDSHAKE
//! - 0x06: ASYNC_EVENT

mod command;
mod response;
mod codec;

pub use command::{Activation, CommandId, DEFAULT_ACTIVATIONS};
pub use response::{AsyncEventFrame, Frame, ResponseFrame, ReturnCode, ReturnCodeTable};
pub use codec::{
    decode_request, decode_response_header, encode_async_event, encode_handshake, encode_request,
    encode_response, hex_dump, read_frame, read_full, read_request, write_request, RequestFrame,
    MAGIC, MAX_ACTIVATIONS, MAX_REQUEST_PAYLOAD, REQUEST_HEADER_SIZE,
};
