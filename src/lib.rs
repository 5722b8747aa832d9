//! # renode-extctl
//!
//! Client for the Renode external control protocol:
//! - Length-prefixed binary framing over TCP
//! - Command activation handshake
//! - One request in flight per session, async events routed while waiting
//! - Typed handles for machines, ADCs, GPIO ports and the system bus
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Resource Handles                         │
//! │        (Machine, Adc, Gpio, SysBus, BusContext)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Session                                │
//! │          (Handshake, Dispatch, Machine Cache)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Transport  │          │ EventRouter │
//!   │    (TCP)    │          │ (callbacks) │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │    Codec    │
//!   │  (frames)   │
//!   └─────────────┘
//! ```
//!
//! ## Example
//! ```no_run
//! use renode_extctl::{GpioState, TimeUnit};
//!
//! let session = renode_extctl::connect("127.0.0.1", 5555)?;
//! session.negotiate()?;
//! let machine = session.get_machine("stm32")?;
//! let gpio = machine.get_gpio("sysbus.gpioPortA")?;
//! gpio.set_state(3, GpioState::High)?;
//! machine.run_for(10, TimeUnit::Milliseconds)?;
//! # Ok::<(), renode_extctl::Error>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;
pub mod handles;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ConnectError, DispatchError, Error, HandshakeError, ProtocolError, Result};
pub use config::{ClientConfig, DEFAULT_PORT};
pub use network::{ConnectionState, Session};
pub use handles::{
    AccessWidth, Adc, BusContext, BusValue, CallbackHandle, Gpio, GpioEvent, GpioState, Machine,
    Pending, Peripheral, PeripheralKind, SysBus, TimeUnit,
};

use std::sync::Arc;

/// Connect to a server with default settings
pub fn connect(host: &str, port: u16) -> std::result::Result<Arc<Session>, ConnectError> {
    Session::connect(host, port)
}

// =============================================================================
// Version Info
// =============================================================================

/// Current version of renode-extctl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
