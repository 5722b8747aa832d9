//! Session
//!
//! One connection to an External Control server, shared by every handle
//! created from it.
//!
//! ## Concurrency Model: One Request In Flight
//!
//! - All socket I/O happens under `link` (a single mutex). A command holds
//!   it from the first request byte until its response is fully read, so
//!   requests from different threads never interleave on the wire.
//! - Async events that arrive while a response is pending are read under
//!   the same lock and queued to the event delivery thread; callbacks never
//!   run while the lock is held.
//! - Any failure that leaves the stream at an unknown position closes the
//!   session. Later commands fail with `NotConnected`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::Sender;
use parking_lot::Mutex;

use super::transport::Transport;
use crate::config::ClientConfig;
use crate::error::{ConnectError, DispatchError, HandshakeError, ProtocolError};
use crate::handles::{spawn_event_delivery, EventRouter, Machine};
use crate::protocol::{
    encode_request, hex_dump, read_frame, Activation, AsyncEventFrame, CommandId, Frame,
};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    HandshakeDone,
}

/// Socket plus the state it is in; only touched under the session lock
struct Link {
    transport: Transport,
    state: ConnectionState,
}

/// A client session with one External Control server
pub struct Session {
    /// Session configuration
    config: ClientConfig,

    /// Peer address for logging
    peer_addr: String,

    /// Serializes every exchange on the socket
    link: Mutex<Link>,

    /// Live machine handles by name (non-owning)
    machines: Mutex<HashMap<String, Weak<Machine>>>,

    /// Registered event callbacks
    events: Arc<EventRouter>,

    /// Queue to the event delivery thread
    event_tx: Sender<AsyncEventFrame>,

    /// Source of client-allocated callback ids
    next_callback_id: AtomicU32,
}

impl Session {
    /// Connect with the default configuration
    pub fn connect(host: &str, port: u16) -> Result<Arc<Self>, ConnectError> {
        Self::connect_with(ClientConfig::builder().host(host).port(port).build())
    }

    /// Connect using `config`. The handshake is not performed yet.
    pub fn connect_with(config: ClientConfig) -> Result<Arc<Self>, ConnectError> {
        config
            .return_codes
            .validate()
            .map_err(|e| ConnectError::InvalidConfig(e.to_string()))?;

        let mut transport = Transport::connect(&config.host, config.port, config.connect_timeout())?;
        transport
            .set_timeouts(config.read_timeout(), config.write_timeout())
            .map_err(ConnectError::Worker)?;

        let events = Arc::new(EventRouter::new());
        let event_tx = spawn_event_delivery(Arc::clone(&events)).map_err(ConnectError::Worker)?;

        let session = Arc::new(Self {
            peer_addr: transport.peer_addr().to_string(),
            link: Mutex::new(Link {
                transport,
                state: ConnectionState::Connected,
            }),
            machines: Mutex::new(HashMap::new()),
            events,
            event_tx,
            next_callback_id: AtomicU32::new(1),
            config,
        });

        if let Some(ms) = session.config.event_poll_interval_ms {
            spawn_event_poller(Arc::downgrade(&session), Duration::from_millis(ms.max(1)))
                .map_err(ConnectError::Worker)?;
        }

        Ok(session)
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    /// Send `activations` and wait for the acknowledgement.
    ///
    /// Allowed once, before any command. A failed handshake after bytes were
    /// written closes the session.
    pub fn handshake(&self, activations: &[Activation]) -> Result<(), HandshakeError> {
        let mut link = self.link.lock();
        match link.state {
            ConnectionState::Disconnected => return Err(HandshakeError::NotConnected),
            ConnectionState::HandshakeDone => return Err(HandshakeError::AlreadyNegotiated),
            ConnectionState::Connected => {}
        }

        match super::handshake::handshake(&mut link.transport, activations, &self.config.return_codes) {
            Ok(()) => {
                link.state = ConnectionState::HandshakeDone;
                Ok(())
            }
            Err(e @ HandshakeError::TooManyActivations(_)) => Err(e),
            Err(e) => {
                tracing::warn!("Handshake with {} failed: {}", self.peer_addr, e);
                link.transport.disconnect();
                link.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Handshake with the configured activation list
    pub fn negotiate(&self) -> Result<(), HandshakeError> {
        let activations = self.config.activations.clone();
        self.handshake(&activations)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Send `payload` as `command` and return the success payload.
    ///
    /// The echoed command must match `command`.
    pub fn dispatch(&self, command: CommandId, payload: &[u8]) -> Result<Vec<u8>, DispatchError> {
        self.dispatch_raw(command.into(), payload, Some(command.into()))
    }

    /// Dispatch with a raw command byte; `expected = None` skips the echo check
    ///
    /// A payload too large for the length field fails without touching the
    /// connection.
    pub fn dispatch_raw(
        &self,
        command: u8,
        payload: &[u8],
        expected: Option<u8>,
    ) -> Result<Vec<u8>, DispatchError> {
        let request = encode_request(command, payload)?;

        let mut link = self.link.lock();
        match link.state {
            ConnectionState::Disconnected => return Err(DispatchError::NotConnected),
            ConnectionState::Connected => return Err(DispatchError::NotNegotiated),
            ConnectionState::HandshakeDone => {}
        }

        let result = self.exchange(&mut link, command, payload, &request, expected);
        if let Err(ref e) = result {
            if e.is_fatal() {
                self.close_link(&mut link, e);
            }
        }
        result
    }

    fn exchange(
        &self,
        link: &mut Link,
        command: u8,
        payload: &[u8],
        request: &[u8],
        expected: Option<u8>,
    ) -> Result<Vec<u8>, DispatchError> {
        tracing::trace!(
            "-> {} cmd=0x{:02x} len={} {}",
            self.peer_addr,
            command,
            payload.len(),
            hex_dump(payload)
        );
        link.transport.send_exact(request)?;

        loop {
            match self.read_frame(link)? {
                Frame::Event(event) => self.route_event(event)?,
                Frame::Response(response) => {
                    tracing::trace!(
                        "<- {} {:?} echo={:?} len={}",
                        self.peer_addr,
                        response.code,
                        response.echoed,
                        response.payload.len()
                    );
                    return response.into_result(expected);
                }
            }
        }
    }

    fn read_frame(&self, link: &mut Link) -> Result<Frame, DispatchError> {
        read_frame(
            &mut link.transport,
            &self.config.return_codes,
            self.config.max_payload_size,
        )
    }

    /// Hand an async event to the delivery thread
    fn route_event(&self, event: AsyncEventFrame) -> Result<(), DispatchError> {
        if !self.config.route_async_events {
            return Err(DispatchError::UnexpectedAsyncEvent {
                command: event.command,
            });
        }
        if event.command != u8::from(CommandId::Gpio) {
            tracing::warn!(
                "Dropping async event for unsupported command 0x{:02x} ({})",
                event.command,
                hex_dump(&event.data)
            );
            return Ok(());
        }
        if self.event_tx.send(event).is_err() {
            tracing::warn!("Event delivery thread is gone; dropping event");
        }
        Ok(())
    }

    /// Close after a fatal error. Registrations are dropped with the link.
    fn close_link(&self, link: &mut Link, cause: &DispatchError) {
        tracing::warn!("Closing session with {}: {}", self.peer_addr, cause);
        link.transport.disconnect();
        link.state = ConnectionState::Disconnected;
        self.events.clear();
    }

    // =========================================================================
    // Idle-time Events
    // =========================================================================

    /// Wait up to `timeout` for async events while no command is in flight.
    ///
    /// Commands from other threads are blocked for the duration. Returns the
    /// number of events routed.
    pub fn poll_events(&self, timeout: Duration) -> Result<usize, DispatchError> {
        let mut link = self.link.lock();
        self.require_negotiated(&link)?;

        let ready = link.transport.wait_readable(timeout).map_err(DispatchError::from);
        match ready {
            Ok(true) => {}
            Ok(false) => return Ok(0),
            Err(e) => {
                self.close_link(&mut link, &e);
                return Err(e);
            }
        }
        self.drain_locked(&mut link)
    }

    /// Route every event already buffered on the socket, without waiting
    pub fn drain_events(&self) -> Result<usize, DispatchError> {
        let mut link = self.link.lock();
        self.require_negotiated(&link)?;
        self.drain_locked(&mut link)
    }

    fn drain_locked(&self, link: &mut Link) -> Result<usize, DispatchError> {
        let mut routed = 0;
        let result = loop {
            match link.transport.has_pending() {
                Ok(true) => {}
                Ok(false) => break Ok(routed),
                Err(e) => break Err(DispatchError::from(e)),
            }
            match self.read_frame(link) {
                // The frame was read whole and nothing is in flight, so the
                // stream is still in sync
                Ok(Frame::Event(event)) if !self.config.route_async_events => {
                    tracing::warn!(
                        "Event routing disabled; dropping idle event for command 0x{:02x}",
                        event.command
                    );
                }
                Ok(Frame::Event(event)) => match self.route_event(event) {
                    Ok(()) => routed += 1,
                    Err(e) => break Err(e),
                },
                Ok(Frame::Response(response)) => {
                    let code = self.config.return_codes.encode(response.code);
                    break Err(ProtocolError::UnsolicitedResponse(code).into());
                }
                Err(e) => break Err(e),
            }
        };

        if let Err(ref e) = result {
            self.close_link(link, e);
        }
        result
    }

    fn require_negotiated(&self, link: &Link) -> Result<(), DispatchError> {
        match link.state {
            ConnectionState::Disconnected => Err(DispatchError::NotConnected),
            ConnectionState::Connected => Err(DispatchError::NotNegotiated),
            ConnectionState::HandshakeDone => Ok(()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the connection and drop every registered callback.
    /// Calling it again is a no-op.
    ///
    /// Dropping the callbacks releases any handles they captured, which
    /// breaks callback-to-session reference cycles.
    pub fn disconnect(&self) {
        {
            let mut link = self.link.lock();
            link.transport.disconnect();
            link.state = ConnectionState::Disconnected;
        }
        self.events.clear();
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    /// Whether commands may be sent
    pub fn is_negotiated(&self) -> bool {
        self.state() == ConnectionState::HandshakeDone
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Session configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn machines(&self) -> &Mutex<HashMap<String, Weak<Machine>>> {
        &self.machines
    }

    pub(crate) fn events(&self) -> &EventRouter {
        &self.events
    }

    pub(crate) fn next_callback_id(&self) -> u32 {
        self.next_callback_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Transport closes its own socket on drop
        tracing::debug!("Session with {} dropped", self.peer_addr);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.link.try_lock().map(|link| link.state))
            .finish()
    }
}

/// Periodically drain idle-time events until the session goes away
fn spawn_event_poller(weak: Weak<Session>, interval: Duration) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("renode-event-poll".to_string())
        .spawn(move || loop {
            std::thread::sleep(interval);
            let Some(session) = weak.upgrade() else {
                break;
            };
            match session.state() {
                ConnectionState::Disconnected => break,
                ConnectionState::Connected => continue,
                ConnectionState::HandshakeDone => {}
            }
            if let Err(e) = session.drain_events() {
                tracing::warn!("Event poller stopping: {}", e);
                break;
            }
        })?;
    Ok(())
}
