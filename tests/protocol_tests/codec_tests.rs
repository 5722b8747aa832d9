//! Codec Tests
//!
//! Tests for request framing, handshake encoding and response decoding.

use std::io::Cursor;

use renode_extctl::protocol::{
    decode_request, encode_async_event, encode_handshake, encode_request, encode_response,
    read_frame, read_request, write_request, Activation, AsyncEventFrame, CommandId, Frame,
    ResponseFrame, ReturnCode, ReturnCodeTable, DEFAULT_ACTIVATIONS, MAX_ACTIVATIONS,
};
use renode_extctl::{DispatchError, HandshakeError, ProtocolError};

const MAX: usize = 1024 * 1024;

fn table() -> ReturnCodeTable {
    ReturnCodeTable::default()
}

// =============================================================================
// Request Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_request_layout() {
    let encoded = encode_request(CommandId::GetTime, &[0xAA, 0xBB, 0xCC]).unwrap();
    assert_eq!(
        encoded,
        vec![b'R', b'E', 0x02, 0x03, 0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC]
    );
}

#[test]
fn test_empty_payload_request() {
    let encoded = encode_request(CommandId::GetTime, &[]).unwrap();
    assert_eq!(encoded, vec![b'R', b'E', 0x02, 0, 0, 0, 0]);
}

#[test]
fn test_request_roundtrip() {
    let payload: Vec<u8> = (0..=255u8).collect();
    let encoded = encode_request(CommandId::SystemBus, &payload).unwrap();
    let decoded = decode_request(&encoded).unwrap();
    assert_eq!(decoded.command, 0x06);
    assert_eq!(decoded.payload, payload);
}

#[test]
fn test_decode_request_bad_magic() {
    let mut encoded = encode_request(CommandId::RunFor, &[1]).unwrap();
    encoded[0] = b'X';
    assert!(matches!(
        decode_request(&encoded),
        Err(ProtocolError::BadMagic([b'X', b'E']))
    ));
}

#[test]
fn test_decode_request_truncated() {
    let encoded = encode_request(CommandId::RunFor, &[1, 2, 3, 4]).unwrap();
    assert!(decode_request(&encoded[..encoded.len() - 1]).is_err());
    assert!(decode_request(&encoded[..3]).is_err());
}

#[test]
fn test_stream_request_roundtrip() {
    let mut wire = Vec::new();
    write_request(&mut wire, CommandId::Adc, b"abc").unwrap();
    write_request(&mut wire, CommandId::Gpio, b"").unwrap();

    let mut cursor = Cursor::new(wire);
    let first = read_request(&mut cursor, MAX).unwrap();
    let second = read_request(&mut cursor, MAX).unwrap();
    assert_eq!((first.command, first.payload.as_slice()), (0x04, &b"abc"[..]));
    assert_eq!((second.command, second.payload.len()), (0x05, 0));
    assert!(matches!(
        read_request(&mut cursor, MAX),
        Err(DispatchError::ConnectionClosed)
    ));
}

// =============================================================================
// Handshake Encoding Tests
// =============================================================================

#[test]
fn test_handshake_layout() {
    let activations = [
        Activation::raw(1, 0),
        Activation::raw(2, 0),
        Activation::raw(3, 0),
    ];
    let encoded = encode_handshake(&activations).unwrap();
    assert_eq!(encoded, vec![0x03, 0x00, 1, 0, 2, 0, 3, 0]);
}

#[test]
fn test_handshake_default_list() {
    let encoded = encode_handshake(&DEFAULT_ACTIVATIONS).unwrap();
    assert_eq!(encoded.len(), 2 + 2 * DEFAULT_ACTIVATIONS.len());
    assert_eq!(&encoded[..2], &(DEFAULT_ACTIVATIONS.len() as u16).to_le_bytes());
}

#[test]
fn test_handshake_empty_list() {
    assert_eq!(encode_handshake(&[]).unwrap(), vec![0, 0]);
}

#[test]
fn test_handshake_too_many() {
    let activations = vec![Activation::raw(1, 0); MAX_ACTIVATIONS + 1];
    assert!(matches!(
        encode_handshake(&activations),
        Err(HandshakeError::TooManyActivations(n)) if n == MAX_ACTIVATIONS + 1
    ));
}

// =============================================================================
// Response Decoding Tests
// =============================================================================

/// Decode `bytes` followed by a sentinel and check nothing past the frame was read
fn decode_exact(bytes: &[u8]) -> Frame {
    let mut wire = bytes.to_vec();
    wire.push(0xEE);
    let mut cursor = Cursor::new(wire);
    let frame = read_frame(&mut cursor, &table(), MAX).unwrap();
    assert_eq!(cursor.position() as usize, bytes.len(), "frame over- or under-read");
    frame
}

#[test]
fn test_success_with_data_shape() {
    let frame = decode_exact(&[0x03, 0x02, 0x08, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(
        frame,
        Frame::Response(ResponseFrame {
            code: ReturnCode::SuccessWithData,
            echoed: Some(0x02),
            payload: vec![1, 2, 3, 4, 5, 6, 7, 8],
        })
    );
}

#[test]
fn test_success_without_data_shape() {
    let frame = decode_exact(&[0x04, 0x01]);
    assert_eq!(
        frame,
        Frame::Response(ResponseFrame {
            code: ReturnCode::SuccessWithoutData,
            echoed: Some(0x01),
            payload: vec![],
        })
    );
}

#[test]
fn test_invalid_command_shape() {
    let frame = decode_exact(&[0x02, 0x06]);
    match frame {
        Frame::Response(r) => {
            assert_eq!(r.code, ReturnCode::InvalidCommand);
            assert_eq!(r.echoed, Some(0x06));
            assert!(r.payload.is_empty());
        }
        other => panic!("Expected response, got {:?}", other),
    }
}

#[test]
fn test_command_failed_shape() {
    let frame = decode_exact(&[0x00, 0x04, 0x03, 0, 0, 0, b'b', b'a', b'd']);
    match frame {
        Frame::Response(r) => {
            assert_eq!(r.code, ReturnCode::CommandFailed);
            assert_eq!(r.echoed, Some(0x04));
            assert_eq!(r.payload, b"bad");
        }
        other => panic!("Expected response, got {:?}", other),
    }
}

#[test]
fn test_fatal_error_has_no_echo() {
    let frame = decode_exact(&[0x01, 0x02, 0, 0, 0, b'n', b'o']);
    match frame {
        Frame::Response(r) => {
            assert_eq!(r.code, ReturnCode::FatalError);
            assert_eq!(r.echoed, None);
            assert_eq!(r.payload, b"no");
        }
        other => panic!("Expected response, got {:?}", other),
    }
}

#[test]
fn test_async_event_shape() {
    let event = AsyncEventFrame {
        command: 0x05,
        callback_id: 42,
        data: vec![9; 9],
    };
    let bytes = encode_async_event(&table(), &event);
    assert_eq!(bytes[0], 0x06);
    assert_eq!(decode_exact(&bytes), Frame::Event(event));
}

#[test]
fn test_encode_response_matches_decoder() {
    let response = ResponseFrame {
        code: ReturnCode::SuccessWithData,
        echoed: Some(0x03),
        payload: 7i32.to_le_bytes().to_vec(),
    };
    let bytes = encode_response(&table(), &response);
    assert_eq!(decode_exact(&bytes), Frame::Response(response));
}

#[test]
fn test_unknown_return_code() {
    let mut cursor = Cursor::new(vec![0x7F, 0x00]);
    assert!(matches!(
        read_frame(&mut cursor, &table(), MAX),
        Err(DispatchError::Protocol(ProtocolError::UnknownReturnCode(0x7F)))
    ));
}

#[test]
fn test_handshake_code_is_not_a_response() {
    // 0x05 is only meaningful as the handshake reply
    let mut cursor = Cursor::new(vec![0x05]);
    assert!(matches!(
        read_frame(&mut cursor, &table(), MAX),
        Err(DispatchError::Protocol(ProtocolError::UnknownReturnCode(0x05)))
    ));
}

#[test]
fn test_truncated_payload() {
    let mut cursor = Cursor::new(vec![0x03, 0x02, 10, 0, 0, 0, 1, 2, 3, 4]);
    assert!(matches!(
        read_frame(&mut cursor, &table(), MAX),
        Err(DispatchError::TruncatedFrame {
            expected: 10,
            received: 4
        })
    ));
}

#[test]
fn test_truncated_length_field() {
    let mut cursor = Cursor::new(vec![0x03, 0x02, 10, 0]);
    assert!(matches!(
        read_frame(&mut cursor, &table(), MAX),
        Err(DispatchError::TruncatedFrame {
            expected: 4,
            received: 2
        })
    ));
}

#[test]
fn test_empty_stream_is_closed() {
    let mut cursor = Cursor::new(Vec::new());
    assert!(matches!(
        read_frame(&mut cursor, &table(), MAX),
        Err(DispatchError::ConnectionClosed)
    ));
}

#[test]
fn test_payload_limit() {
    let mut cursor = Cursor::new(vec![0x03, 0x02, 0xFF, 0xFF, 0xFF, 0x7F]);
    assert!(matches!(
        read_frame(&mut cursor, &table(), 16),
        Err(DispatchError::Protocol(ProtocolError::PayloadTooLarge { max: 16, .. }))
    ));
}

// =============================================================================
// Return Code Table Tests
// =============================================================================

#[test]
fn test_one_based_table() {
    let table = ReturnCodeTable::one_based();
    table.validate().unwrap();
    let mut cursor = Cursor::new(vec![0x05, 0x01, 0x06, 1, 0, 0, 0, b'x']);
    match read_frame(&mut cursor, &table, MAX).unwrap() {
        Frame::Response(r) => assert_eq!(r.code, ReturnCode::SuccessWithoutData),
        other => panic!("Expected response, got {:?}", other),
    }
    match read_frame(&mut cursor, &table, MAX).unwrap() {
        Frame::Response(r) => {
            assert_eq!(r.code, ReturnCode::FatalError);
            assert_eq!(r.payload, b"x");
        }
        other => panic!("Expected response, got {:?}", other),
    }
}

#[test]
fn test_table_rejects_duplicates() {
    let table = ReturnCodeTable {
        fatal_error: 0x03,
        ..ReturnCodeTable::default()
    };
    assert!(matches!(
        table.validate(),
        Err(ProtocolError::InvalidReturnCodeTable(_))
    ));
}

#[test]
fn test_table_encode_decode() {
    let table = table();
    for code in [
        ReturnCode::CommandFailed,
        ReturnCode::FatalError,
        ReturnCode::InvalidCommand,
        ReturnCode::SuccessWithData,
        ReturnCode::SuccessWithoutData,
        ReturnCode::AsyncEvent,
    ] {
        assert_eq!(table.decode(table.encode(code)).unwrap(), code);
    }
}
