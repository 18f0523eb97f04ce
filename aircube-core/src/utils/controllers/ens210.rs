//! ENS210 temperature and relative humidity sensor.
//!
//! Measurements are 3-byte replies `[LSB, MSB, VALID|CRC]`. A reading whose
//! valid bit is clear leaves the previous value in place.

use embedded_hal::i2c::I2c;

use super::i2c::{BusError, I2cGateway};

pub const ENS210_ADDRESS: u8 = 0x43;

const REG_PART_ID: u8 = 0x00;
const REG_SYS_CTRL: u8 = 0x10;
const REG_SYS_STAT: u8 = 0x11;
const REG_SENS_RUN: u8 = 0x21;
const REG_SENS_START: u8 = 0x22;
const REG_T_VAL: u8 = 0x30;
const REG_H_VAL: u8 = 0x33;

const SYS_CTRL_ACTIVE: u8 = 0x00;
const SYS_CTRL_LOW_POWER: u8 = 0x01;
/// Temperature and humidity together.
const SENS_BOTH: u8 = 0b11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempUnit {
    Kelvin,
    Celsius,
    Fahrenheit,
}

/// Raw little-endian measurement bytes fed to the gas sensor for
/// environmental compensation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationData {
    pub t: [u8; 2],
    pub h: [u8; 2],
}

/// Temperature word to kelvin (1/64 K steps).
pub fn kelvin_from_raw(raw: u16) -> f32 {
    raw as f32 / 64.0
}

/// Humidity word to %RH (1/512 % steps).
pub fn humidity_from_raw(raw: u16) -> f32 {
    raw as f32 / 512.0
}

/// Split a measurement reply into its data word and valid flag.
fn decode(reply: [u8; 3]) -> (u16, bool) {
    (u16::from_le_bytes([reply[0], reply[1]]), reply[2] & 0x01 != 0)
}

pub struct Ens210<'a, I2C: 'static> {
    bus: &'a I2cGateway<I2C>,
    comp: CompensationData,
    temperature_k: f32,
    humidity: f32,
}

impl<'a, I2C> Ens210<'a, I2C>
where
    I2C: I2c + 'static,
{
    /// Driver with zeroed caches.
    pub fn new(bus: &'a I2cGateway<I2C>) -> Self {
        Self {
            bus,
            comp: CompensationData::default(),
            temperature_k: 0.0,
            humidity: 0.0,
        }
    }

    /// Leave low-power mode and start continuous T+H conversion.
    ///
    /// The first measurement is ready roughly 250 ms later.
    pub fn init(&mut self) -> Result<(), BusError> {
        self.bus.write(ENS210_ADDRESS, &[REG_SYS_CTRL, SYS_CTRL_ACTIVE])?;
        self.bus.write(ENS210_ADDRESS, &[REG_SENS_RUN, SENS_BOTH])?;
        self.bus.write(ENS210_ADDRESS, &[REG_SENS_START, SENS_BOTH])?;
        tracing::info!("ENS210 started in continuous mode");
        Ok(())
    }

    /// Put the sensor back into low-power mode.
    pub fn deinit(&mut self) -> Result<(), BusError> {
        self.bus.write(ENS210_ADDRESS, &[REG_SYS_CTRL, SYS_CTRL_LOW_POWER])
    }

    /// PART_ID register, 0x0210 for a genuine part.
    pub fn part_id(&mut self) -> Result<u16, BusError> {
        let mut buf = [0u8; 2];
        self.bus.read(ENS210_ADDRESS, &[REG_PART_ID], &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Raw SYS_STAT byte.
    pub fn status(&mut self) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.bus.read(ENS210_ADDRESS, &[REG_SYS_STAT], &mut buf)?;
        Ok(buf[0])
    }

    /// Read temperature then humidity, updating the cache for valid replies.
    pub fn read_envir(&mut self) -> Result<(), BusError> {
        let mut reply = [0u8; 3];
        self.bus.read(ENS210_ADDRESS, &[REG_T_VAL], &mut reply)?;
        let (raw, valid) = decode(reply);
        if valid {
            self.comp.t = [reply[0], reply[1]];
            self.temperature_k = kelvin_from_raw(raw);
            tracing::debug!(
                "ENS210 {:.1}K {:.1}C {:.1}F",
                self.temperature(TempUnit::Kelvin),
                self.temperature(TempUnit::Celsius),
                self.temperature(TempUnit::Fahrenheit)
            );
        } else {
            tracing::warn!("ENS210 temperature data not valid");
        }

        let mut reply = [0u8; 3];
        self.bus.read(ENS210_ADDRESS, &[REG_H_VAL], &mut reply)?;
        let (raw, valid) = decode(reply);
        if valid {
            self.comp.h = [reply[0], reply[1]];
            self.humidity = humidity_from_raw(raw);
            tracing::debug!("ENS210 humidity {:.0}%", self.humidity);
        } else {
            tracing::warn!("ENS210 humidity data not valid");
        }
        Ok(())
    }

    /// Last valid temperature in `unit`.
    pub fn temperature(
        &self,
        unit: TempUnit,
    ) -> f32 {
        let c = self.temperature_k - 273.15;
        match unit {
            TempUnit::Kelvin => self.temperature_k,
            TempUnit::Celsius => c,
            TempUnit::Fahrenheit => c * 9.0 / 5.0 + 32.0,
        }
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> f32 {
        self.humidity
    }

    /// Last valid raw bytes.
    pub fn compensation(&self) -> CompensationData {
        self.comp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        // 298.15 K = 19081.6 LSB
        let k = kelvin_from_raw(19082);
        assert!((k - 298.156).abs() < 0.01);
        assert_eq!(humidity_from_raw(512 * 45), 45.0);
    }

    #[test]
    fn decode_splits_valid_bit() {
        assert_eq!(decode([0x34, 0x12, 0x01]), (0x1234, true));
        assert_eq!(decode([0x34, 0x12, 0xFE]), (0x1234, false));
    }
}
