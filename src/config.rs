//! Configuration for renode-extctl
//!
//! Centralized client configuration with sensible defaults.

use std::time::Duration;

use crate::error::ConnectError;
use crate::protocol::{Activation, ReturnCodeTable, DEFAULT_ACTIVATIONS};

/// Default External Control server port
pub const DEFAULT_PORT: u16 = 5555;

/// Default upper bound on a response payload (16 MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Client configuration for one session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Server host, numeric (IPv4/IPv6) or symbolic
    pub host: String,

    /// Server port
    pub port: u16,

    /// Per-candidate connect timeout (milliseconds, 0 = OS default)
    pub connect_timeout_ms: u64,

    /// Socket read timeout (milliseconds, 0 = block forever)
    ///
    /// A read that times out mid-response leaves the stream desynchronized,
    /// so the session is force-closed when it fires.
    pub read_timeout_ms: u64,

    /// Socket write timeout (milliseconds, 0 = block forever)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Activation list sent during the handshake, in order
    pub activations: Vec<Activation>,

    /// Numeric mapping of return codes
    pub return_codes: ReturnCodeTable,

    /// Upper bound on a response payload length (bytes)
    pub max_payload_size: usize,

    // -------------------------------------------------------------------------
    // Event Configuration
    // -------------------------------------------------------------------------
    /// Route AsyncEvent frames to registered callbacks.
    /// When false an event fails the in-flight command with
    /// `UnexpectedAsyncEvent`; idle events read by polling are dropped.
    pub route_async_events: bool,

    /// Interval of the background event poller (None = no poller)
    pub event_poll_interval_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 0,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            activations: DEFAULT_ACTIVATIONS.to_vec(),
            return_codes: ReturnCodeTable::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            route_async_events: true,
            event_poll_interval_ms: None,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Build a default config from an address string.
    ///
    /// Accepts `tcp://host:port`, `host:port` and `[v6addr]:port`.
    pub fn from_address(address: &str) -> std::result::Result<Self, ConnectError> {
        let (host, port) = parse_address(address)?;
        Ok(Self::builder().host(host).port(port).build())
    }

    pub(crate) fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub(crate) fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Split `[tcp://]host:port` into its parts
fn parse_address(address: &str) -> std::result::Result<(String, u16), ConnectError> {
    let invalid = || ConnectError::InvalidAddress(address.to_string());
    let addr = address.strip_prefix("tcp://").unwrap_or(address);

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        // [v6]:port
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        (host, tail.strip_prefix(':').ok_or_else(invalid)?)
    } else {
        addr.rsplit_once(':').ok_or_else(invalid)?
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Replace the handshake activation list
    pub fn activations(mut self, activations: Vec<Activation>) -> Self {
        self.config.activations = activations;
        self
    }

    /// Set the return code numbering
    pub fn return_codes(mut self, table: ReturnCodeTable) -> Self {
        self.config.return_codes = table;
        self
    }

    /// Set the maximum accepted response payload size (in bytes)
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Enable or disable routing of async events to callbacks
    pub fn route_async_events(mut self, enabled: bool) -> Self {
        self.config.route_async_events = enabled;
        self
    }

    /// Run a background event poller at the given interval (in milliseconds)
    pub fn event_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.event_poll_interval_ms = Some(ms);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
