//! Shared I2C bus gateway for the ENS210 and ENS16x sensors.
//!
//! The bus itself lives in a `critical_section::Mutex` owned by the board
//! setup. The gateway keeps a small cache of [`CriticalSectionDevice`]s, one
//! per 7-bit address, created lazily on the first transaction to an address
//! and dropped by [`I2cGateway::deinit`].

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embedded_hal::i2c::{ErrorKind, I2c};
use embedded_hal_bus::i2c::CriticalSectionDevice;
use heapless::Vec;

/// Bus shared between the gateway's devices.
pub type SharedBus<I2C> = critical_section::Mutex<RefCell<I2C>>;

/// Maximum number of device handles the gateway will hold.
pub const MAX_CACHED_DEVICES: usize = 4;

/// Errors reported by bus transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// `init` has not run (or `deinit` already released the bus).
    NotInitialized,
    /// Every handle slot is taken by another address.
    DeviceCacheFull,
    /// The transaction did not complete within the HAL timeout.
    Timeout,
    /// The device did not acknowledge its address or data.
    Nack,
}

impl core::fmt::Display for BusError {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "I2C bus not initialized"),
            Self::DeviceCacheFull => write!(f, "device handle cache full"),
            Self::Timeout => write!(f, "I2C transaction timed out"),
            Self::Nack => write!(f, "I2C device did not acknowledge"),
        }
    }
}

impl core::error::Error for BusError {}

impl BusError {
    fn from_hal<E: embedded_hal::i2c::Error>(err: E) -> Self {
        match err.kind() {
            ErrorKind::NoAcknowledge(_) => Self::Nack,
            // Arbitration loss and bus faults surface once the HAL gives up
            // waiting on the transfer.
            _ => Self::Timeout,
        }
    }
}

struct GatewayState<I2C: 'static> {
    bus: Option<&'static SharedBus<I2C>>,
    devices: Vec<(u8, CriticalSectionDevice<'static, I2C>), MAX_CACHED_DEVICES>,
}

impl<I2C: 'static> GatewayState<I2C> {
    fn device_for(
        &mut self,
        addr: u8,
    ) -> Result<&mut CriticalSectionDevice<'static, I2C>, BusError> {
        let bus = self.bus.ok_or_else(|| {
            tracing::error!("I2C driver not initialized");
            BusError::NotInitialized
        })?;
        let slot = match self.devices.iter().position(|(a, _)| *a == addr) {
            Some(slot) => slot,
            None => {
                self.devices
                    .push((addr, CriticalSectionDevice::new(bus)))
                    .map_err(|_| {
                        tracing::error!("Device cache full, cannot add device 0x{:02X}", addr);
                        BusError::DeviceCacheFull
                    })?;
                tracing::debug!("I2C device 0x{:02X} cached", addr);
                self.devices.len() - 1
            }
        };
        Ok(&mut self.devices[slot].1)
    }
}

/// Blocking gateway to the sensor bus.
///
/// `init` and `deinit` need external exclusion (they run from the startup
/// path); `read` and `write` are safe from any task once initialized.
pub struct I2cGateway<I2C: 'static> {
    state: Mutex<CriticalSectionRawMutex, RefCell<GatewayState<I2C>>>,
}

impl<I2C: 'static> Default for I2cGateway<I2C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I2C: 'static> I2cGateway<I2C> {
    /// Create an uninitialized gateway. Every transaction fails with
    /// [`BusError::NotInitialized`] until [`init`](Self::init) runs.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(GatewayState {
                bus: None,
                devices: Vec::new(),
            })),
        }
    }

    /// Attach the shared bus. A second call keeps the existing bus.
    pub fn init(
        &self,
        bus: &'static SharedBus<I2C>,
    ) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.bus.is_some() {
                tracing::warn!("I2C driver already initialized");
                return;
            }
            state.bus = Some(bus);
            tracing::info!("I2C driver initialized successfully");
        });
    }

    /// Drop every cached device and detach the bus, returning it.
    pub fn deinit(&self) -> Option<&'static SharedBus<I2C>> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.devices.clear();
            let bus = state.bus.take();
            if bus.is_some() {
                tracing::info!("I2C driver deinitialized");
            }
            bus
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock(|state| state.borrow().bus.is_some())
    }

    /// Number of devices currently cached.
    pub fn cached_devices(&self) -> usize {
        self.state.lock(|state| state.borrow().devices.len())
    }
}

impl<I2C> I2cGateway<I2C>
where
    I2C: I2c + 'static,
{
    /// Write `bytes` (register address first, then data) to `addr`.
    pub fn write(
        &self,
        addr: u8,
        bytes: &[u8],
    ) -> Result<(), BusError> {
        self.state.lock(|state| {
            state
                .borrow_mut()
                .device_for(addr)?
                .write(addr, bytes)
                .map_err(BusError::from_hal)
        })
    }

    /// Send `reg` to `addr` and read `out.len()` bytes back.
    pub fn read(
        &self,
        addr: u8,
        reg: &[u8],
        out: &mut [u8],
    ) -> Result<(), BusError> {
        self.state.lock(|state| {
            state
                .borrow_mut()
                .device_for(addr)?
                .write_read(addr, reg, out)
                .map_err(BusError::from_hal)
        })
    }
}
