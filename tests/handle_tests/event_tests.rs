//! Event Tests
//!
//! GPIO state change callbacks and async event routing.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use crossbeam::channel;
use renode_extctl::protocol::{encode_async_event, AsyncEventFrame, CommandId, ReturnCodeTable};
use renode_extctl::{
    ClientConfig, ConnectionState, DispatchError, Error, GpioEvent, GpioState, ProtocolError,
    Session, TimeUnit,
};

const WAIT: Duration = Duration::from_secs(2);

/// Handshake, machine 0, GPIO descriptor 1, then `extra`
fn gpio_script(extra: Vec<Step>) -> Vec<Step> {
    let mut script = vec![
        handshake_ok(),
        Step::Reply(descriptor(CommandId::GetMachine, 0)),
        Step::Reply(descriptor(CommandId::Gpio, 1)),
    ];
    script.extend(extra);
    script
}

#[test]
fn test_register_payload() {
    let server = TestServer::start(gpio_script(vec![Step::Reply(ok_empty(CommandId::Gpio))]));
    let session = connect_negotiated(&server);
    let gpio = session.get_machine("m").unwrap().get_gpio("gpio").unwrap();

    let handle = gpio.register_state_change_callback(3, |_| {}).unwrap();

    let request = &server.recorded().requests[2];
    let mut expected = 1i32.to_le_bytes().to_vec();
    expected.push(2);
    expected.extend_from_slice(&3u32.to_le_bytes());
    expected.push(0);
    expected.extend_from_slice(&handle.id().to_le_bytes());
    assert_eq!(request.payload, expected);
}

#[test]
fn test_event_during_dispatch_is_routed() {
    let server = TestServer::start(gpio_script(vec![
        Step::Reply(ok_empty(CommandId::Gpio)),
        // Event interleaved ahead of the reply to the next command
        Step::Reply(frames(&[gpio_event(1, 777, 1), ok_data(CommandId::Gpio, &[1])])),
    ]));
    let session = connect_negotiated(&server);
    let gpio = session.get_machine("m").unwrap().get_gpio("gpio").unwrap();

    let (tx, rx) = channel::unbounded::<GpioEvent>();
    let handle = gpio
        .register_state_change_callback(5, move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
    assert_eq!(handle.id(), 1);

    assert_eq!(gpio.get_state(5).unwrap(), GpioState::High);
    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(
        event,
        GpioEvent {
            pin: 5,
            state: GpioState::High,
            timestamp_us: 777
        }
    );
}

#[test]
fn test_idle_event_via_poll() {
    let server = TestServer::start(gpio_script(vec![
        Step::Reply(ok_empty(CommandId::Gpio)),
        Step::Write(gpio_event(1, 10, 0)),
        Step::Write(gpio_event(1, 20, 1)),
    ]));
    let session = connect_negotiated(&server);
    let gpio = session.get_machine("m").unwrap().get_gpio("gpio").unwrap();

    let (tx, rx) = channel::unbounded::<GpioEvent>();
    gpio.register_state_change_callback(0, move |event| {
        let _ = tx.send(event);
    })
    .unwrap();

    let mut routed = 0;
    while routed < 2 {
        routed += session.poll_events(WAIT).unwrap();
    }
    assert_eq!(rx.recv_timeout(WAIT).unwrap().timestamp_us, 10);
    assert_eq!(rx.recv_timeout(WAIT).unwrap().timestamp_us, 20);
}

#[test]
fn test_poll_without_events_times_out() {
    let server = TestServer::start(vec![handshake_ok()]);
    let session = connect_negotiated(&server);
    assert_eq!(session.poll_events(Duration::from_millis(50)).unwrap(), 0);
    assert_eq!(session.drain_events().unwrap(), 0);
    assert!(session.is_negotiated());
}

#[test]
fn test_background_poller_delivers() {
    let server = TestServer::start(gpio_script(vec![
        Step::Reply(ok_empty(CommandId::Gpio)),
        Step::Pause(Duration::from_millis(50)),
        Step::Write(gpio_event(1, 99, 1)),
    ]));
    let config = ClientConfig::builder()
        .host("127.0.0.1")
        .port(server.port())
        .event_poll_interval_ms(10)
        .build();
    let session = Session::connect_with(config).unwrap();
    session.negotiate().unwrap();
    let gpio = session.get_machine("m").unwrap().get_gpio("gpio").unwrap();

    let (tx, rx) = channel::unbounded::<GpioEvent>();
    gpio.register_state_change_callback(2, move |event| {
        let _ = tx.send(event);
    })
    .unwrap();

    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!((event.pin, event.timestamp_us), (2, 99));
}

#[test]
fn test_unregister_stops_delivery() {
    let server = TestServer::start(gpio_script(vec![
        Step::Reply(ok_empty(CommandId::Gpio)),
        Step::Reply(ok_empty(CommandId::Gpio)),
        Step::Write(gpio_event(1, 5, 1)),
    ]));
    let session = connect_negotiated(&server);
    let gpio = session.get_machine("m").unwrap().get_gpio("gpio").unwrap();

    let (tx, rx) = channel::unbounded::<GpioEvent>();
    let handle = gpio
        .register_state_change_callback(1, move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
    gpio.unregister(handle).unwrap();

    let request = &server.recorded().requests[3];
    assert_eq!(request.payload[4], 3, "unregister op");
    assert_eq!(&request.payload[10..14], &handle.id().to_le_bytes());

    // The late event is read but finds no callback
    let mut routed = 0;
    while routed < 1 {
        routed += session.poll_events(WAIT).unwrap();
    }
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    assert!(matches!(gpio.unregister(handle), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_failed_registration_is_rolled_back() {
    let server = TestServer::start(gpio_script(vec![
        Step::Reply(failed(CommandId::Gpio, "no such pin")),
        Step::Write(gpio_event(1, 5, 1)),
    ]));
    let session = connect_negotiated(&server);
    let gpio = session.get_machine("m").unwrap().get_gpio("gpio").unwrap();

    let (tx, rx) = channel::unbounded::<GpioEvent>();
    let result = gpio.register_state_change_callback(64, move |event| {
        let _ = tx.send(event);
    });
    assert!(matches!(result, Err(Error::Dispatch(DispatchError::ServerReported { .. }))));

    let mut routed = 0;
    while routed < 1 {
        routed += session.poll_events(WAIT).unwrap();
    }
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_non_gpio_event_is_dropped() {
    let other = encode_async_event(
        &ReturnCodeTable::default(),
        &AsyncEventFrame {
            command: CommandId::Adc.into(),
            callback_id: 1,
            data: vec![1, 2, 3],
        },
    );
    let server = TestServer::start(vec![
        handshake_ok(),
        Step::Reply(frames(&[other, ok_empty(CommandId::RunFor)])),
    ]);
    let session = connect_negotiated(&server);

    session.dispatch(CommandId::RunFor, &0u64.to_le_bytes()).unwrap();
    assert!(session.is_negotiated());
}

#[test]
fn test_event_without_routing_is_fatal() {
    let server = TestServer::start(vec![
        handshake_ok(),
        Step::Reply(frames(&[gpio_event(1, 0, 0), ok_empty(CommandId::RunFor)])),
    ]);
    let config = ClientConfig::builder()
        .host("127.0.0.1")
        .port(server.port())
        .route_async_events(false)
        .build();
    let session = Session::connect_with(config).unwrap();
    session.negotiate().unwrap();

    match session.dispatch(CommandId::RunFor, &0u64.to_le_bytes()) {
        Err(DispatchError::UnexpectedAsyncEvent { command }) => assert_eq!(command, 0x05),
        other => panic!("Expected UnexpectedAsyncEvent, got {:?}", other),
    }
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[test]
fn test_unsolicited_response_closes_session() {
    let server = TestServer::start(vec![
        handshake_ok(),
        Step::Write(ok_empty(CommandId::RunFor)),
    ]);
    let session = connect_negotiated(&server);

    match session.poll_events(WAIT) {
        Err(DispatchError::Protocol(ProtocolError::UnsolicitedResponse(code))) => {
            assert_eq!(code, 0x04)
        }
        other => panic!("Expected UnsolicitedResponse, got {:?}", other),
    }
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[test]
fn test_panicking_callback_does_not_stop_delivery() {
    let server = TestServer::start(gpio_script(vec![
        Step::Reply(ok_empty(CommandId::Gpio)),
        Step::Reply(ok_empty(CommandId::Gpio)),
        Step::Write(frames(&[gpio_event(1, 1, 1), gpio_event(2, 2, 1)])),
    ]));
    let session = connect_negotiated(&server);
    let gpio = session.get_machine("m").unwrap().get_gpio("gpio").unwrap();

    gpio.register_state_change_callback(0, |_| panic!("callback failure"))
        .unwrap();
    let (tx, rx) = channel::unbounded::<GpioEvent>();
    gpio.register_state_change_callback(1, move |event| {
        let _ = tx.send(event);
    })
    .unwrap();

    let mut routed = 0;
    while routed < 2 {
        routed += session.poll_events(WAIT).unwrap();
    }
    assert_eq!(rx.recv_timeout(WAIT).unwrap().timestamp_us, 2);
}

#[test]
fn test_idle_event_without_routing_is_dropped() {
    let server = TestServer::start(vec![
        handshake_ok(),
        Step::Write(gpio_event(1, 0, 1)),
        Step::Reply(ok_data(CommandId::GetTime, &7u64.to_le_bytes())),
    ]);
    let config = ClientConfig::builder()
        .host("127.0.0.1")
        .port(server.port())
        .route_async_events(false)
        .build();
    let session = Session::connect_with(config).unwrap();
    session.negotiate().unwrap();

    assert_eq!(session.poll_events(WAIT).unwrap(), 0);
    assert!(session.is_negotiated());
    assert_eq!(session.get_time(TimeUnit::Microseconds).unwrap(), 7);
}

// =============================================================================
// Callback Ownership
// =============================================================================

/// Wait for the server to see the client hang up
fn server_saw_eof(server: TestServer) -> bool {
    let (tx, rx) = channel::bounded(1);
    std::thread::spawn(move || {
        server.join();
        let _ = tx.send(());
    });
    rx.recv_timeout(WAIT).is_ok()
}

#[test]
fn test_weak_handle_in_callback_lets_session_close() {
    let server = TestServer::start(gpio_script(vec![Step::Reply(ok_empty(CommandId::Gpio))]));
    let session = connect_negotiated(&server);
    let machine = session.get_machine("m").unwrap();
    let gpio = machine.get_gpio("gpio").unwrap();

    let weak_gpio = Arc::downgrade(&gpio);
    gpio.register_state_change_callback(0, move |_| {
        if let Some(gpio) = weak_gpio.upgrade() {
            let _ = gpio.descriptor();
        }
    })
    .unwrap();

    let weak_session = Arc::downgrade(&session);
    drop(gpio);
    drop(machine);
    drop(session);

    assert!(weak_session.upgrade().is_none());
    assert!(server_saw_eof(server));
}

#[test]
fn test_disconnect_releases_callback_handles() {
    let server = TestServer::start(gpio_script(vec![Step::Reply(ok_empty(CommandId::Gpio))]));
    let session = connect_negotiated(&server);
    let machine = session.get_machine("m").unwrap();
    let gpio = machine.get_gpio("gpio").unwrap();

    // Strong capture: the session is kept alive until it disconnects
    let captured = Arc::clone(&gpio);
    gpio.register_state_change_callback(0, move |_| {
        let _ = captured.descriptor();
    })
    .unwrap();

    let weak_session = Arc::downgrade(&session);
    session.disconnect();
    drop(gpio);
    drop(machine);
    drop(session);

    assert!(weak_session.upgrade().is_none());
    assert!(server_saw_eof(server));
}

#[test]
fn test_fatal_error_releases_callback_handles() {
    let server = TestServer::start(gpio_script(vec![
        Step::Reply(ok_empty(CommandId::Gpio)),
        Step::Reply(vec![0x7F]),
    ]));
    let session = connect_negotiated(&server);
    let machine = session.get_machine("m").unwrap();
    let gpio = machine.get_gpio("gpio").unwrap();

    let captured = Arc::clone(&gpio);
    gpio.register_state_change_callback(0, move |_| {
        let _ = captured.descriptor();
    })
    .unwrap();

    assert!(gpio.get_state(0).is_err());
    assert_eq!(session.state(), ConnectionState::Disconnected);

    let weak_session = Arc::downgrade(&session);
    drop(gpio);
    drop(machine);
    drop(session);
    assert!(weak_session.upgrade().is_none());
}
