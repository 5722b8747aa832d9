//! Resource handles
//!
//! Typed wrappers over the command families. Every handle method builds a
//! payload, calls `Session::dispatch`, and decodes the reply.
//!
//! ## Ownership
//! ```text
//! Session ──weak──▶ Machine cache
//!    ▲                  │
//!    │weak              │ get_adc / get_gpio / get_sys_bus
//! Machine               ▼
//!            Adc, Gpio, SysBus ──strong──▶ Session
//!                          │
//!                          ▼
//!                      BusContext ──strong──▶ Session
//! ```
//!
//! GPIO callbacks are owned by the session, so they should hold handles
//! weakly. `Session::disconnect` drops them all.

mod adc;
mod events;
mod gpio;
mod machine;
mod pending;
mod peripheral;
mod sysbus;
mod time;

pub use adc::Adc;
pub use events::{CallbackHandle, EventRouter, GpioEvent};
pub use gpio::{Gpio, GpioState};
pub use machine::Machine;
pub use pending::Pending;
pub use peripheral::{Peripheral, PeripheralKind};
pub use sysbus::{AccessWidth, BusContext, BusValue, SysBus};
pub use time::TimeUnit;

pub(crate) use events::spawn_event_delivery;
