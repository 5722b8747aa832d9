//! Machine handles
//!
//! A `Machine` names one emulated machine on the server. Handles are cached
//! per session by name without ownership: looking up a name whose handle is
//! still alive somewhere returns that same handle.
//!
//! A machine holds its session weakly. Peripherals obtained from it hold
//! the session strongly, so they stay usable after the machine is dropped.

use std::sync::{Arc, Weak};

use bytes::BytesMut;

use super::adc::Adc;
use super::gpio::Gpio;
use super::peripheral::{decode_descriptor, encode_lookup, put_name, Peripheral, PeripheralKind};
use super::pending::Pending;
use super::sysbus::SysBus;
use super::time::TimeUnit;
use crate::error::{Error, Result};
use crate::network::Session;
use crate::protocol::CommandId;

/// Handle to an emulated machine
#[derive(Debug)]
pub struct Machine {
    session: Weak<Session>,
    name: String,
    descriptor: i32,
}

impl Machine {
    /// Machine name as looked up
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-side descriptor
    pub fn descriptor(&self) -> i32 {
        self.descriptor
    }

    fn session(&self) -> Result<Arc<Session>> {
        self.session.upgrade().ok_or(Error::SessionClosed)
    }

    // =========================================================================
    // Peripherals
    // =========================================================================

    /// Look up a peripheral of `kind` at `path`
    pub fn get_peripheral(&self, kind: PeripheralKind, path: &str) -> Result<Peripheral> {
        let session = self.session()?;
        let payload = encode_lookup(self.descriptor, path)?;
        let reply = session.dispatch(kind.command(), &payload)?;
        let descriptor = decode_descriptor(kind.command(), &reply)?.ok_or_else(|| Error::NotFound {
            kind: kind.name(),
            name: path.to_string(),
        })?;

        tracing::debug!("{} '{}' on '{}' -> descriptor {}", kind.name(), path, self.name, descriptor);
        let peripheral = match kind {
            PeripheralKind::Adc => Peripheral::Adc(Arc::new(Adc::new(session, descriptor, path))),
            PeripheralKind::Gpio => Peripheral::Gpio(Arc::new(Gpio::new(session, descriptor, path))),
            PeripheralKind::SysBus => {
                Peripheral::SysBus(Arc::new(SysBus::new(session, descriptor, path)))
            }
        };
        Ok(peripheral)
    }

    /// Look up an ADC
    pub fn get_adc(&self, path: &str) -> Result<Arc<Adc>> {
        match self.get_peripheral(PeripheralKind::Adc, path)? {
            Peripheral::Adc(adc) => Ok(adc),
            other => Err(wrong_kind(PeripheralKind::Adc, &other)),
        }
    }

    /// Look up a GPIO port
    pub fn get_gpio(&self, path: &str) -> Result<Arc<Gpio>> {
        match self.get_peripheral(PeripheralKind::Gpio, path)? {
            Peripheral::Gpio(gpio) => Ok(gpio),
            other => Err(wrong_kind(PeripheralKind::Gpio, &other)),
        }
    }

    /// Look up the system bus
    pub fn get_sys_bus(&self, path: &str) -> Result<Arc<SysBus>> {
        match self.get_peripheral(PeripheralKind::SysBus, path)? {
            Peripheral::SysBus(bus) => Ok(bus),
            other => Err(wrong_kind(PeripheralKind::SysBus, &other)),
        }
    }

    // =========================================================================
    // Time Control
    // =========================================================================

    /// Advance emulation by `duration` in `unit`
    pub fn run_for(&self, duration: u64, unit: TimeUnit) -> Result<()> {
        self.session()?.run_for(duration, unit)
    }

    /// `run_for` on a background thread
    pub fn run_for_async(&self, duration: u64, unit: TimeUnit) -> Result<Pending<()>> {
        Ok(self.session()?.run_for_async(duration, unit))
    }

    /// Current emulation time in `unit`
    pub fn get_time(&self, unit: TimeUnit) -> Result<u64> {
        self.session()?.get_time(unit)
    }
}

fn wrong_kind(wanted: PeripheralKind, got: &Peripheral) -> Error {
    Error::InvalidArgument(format!(
        "expected {} handle, lookup produced {}",
        wanted.name(),
        got.kind().name()
    ))
}

impl Session {
    /// Look up a machine by name.
    ///
    /// Returns the cached handle when one for the same name and descriptor
    /// is still alive. The cache lock is held across the exchange so two
    /// threads cannot create duplicate handles for one name.
    pub fn get_machine(self: &Arc<Self>, name: &str) -> Result<Arc<Machine>> {
        let mut payload = BytesMut::with_capacity(4 + name.len());
        put_name(&mut payload, name)?;

        let mut machines = self.machines().lock();
        let reply = self.dispatch(CommandId::GetMachine, &payload)?;
        let descriptor = decode_descriptor(CommandId::GetMachine, &reply)?.ok_or_else(|| {
            Error::NotFound {
                kind: "machine",
                name: name.to_string(),
            }
        })?;

        if let Some(existing) = machines.get(name).and_then(Weak::upgrade) {
            if existing.descriptor == descriptor {
                return Ok(existing);
            }
        }

        let machine = Arc::new(Machine {
            session: Arc::downgrade(self),
            name: name.to_string(),
            descriptor,
        });
        machines.retain(|_, handle| handle.strong_count() > 0);
        machines.insert(name.to_string(), Arc::downgrade(&machine));
        tracing::debug!("Machine '{}' -> descriptor {}", name, descriptor);
        Ok(machine)
    }
}
