//! ENS160/ENS161 gas sensor.
//!
//! The DEVICE_STATUS byte is decoded here into [`DeviceStatus`] so that
//! nothing above the driver sees raw bits.

use embedded_hal::i2c::I2c;
use serde::Serialize;

use super::{
    ens210::{humidity_from_raw, kelvin_from_raw, CompensationData},
    i2c::{BusError, I2cGateway},
};

pub const ENS16X_ADDRESS: u8 = 0x52;

const REG_PART_ID: u8 = 0x00;
const REG_OPMODE: u8 = 0x10;
const REG_TEMP_IN: u8 = 0x13;
const REG_DEVICE_STATUS: u8 = 0x20;
const REG_DATA_AQI_UBA: u8 = 0x21;
const REG_DATA_ETVOC: u8 = 0x22;
const REG_DATA_ECO2: u8 = 0x24;
const REG_DATA_AQI_S: u8 = 0x26;
const REG_DATA_T: u8 = 0x30;
const REG_DATA_RH: u8 = 0x32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpMode {
    DeepSleep = 0x00,
    Idle = 0x01,
    Standard = 0x02,
    LowPower = 0x03,
    UltraLowPower = 0x04,
    Reset = 0xF0,
}

impl OpMode {
    /// Decode an OPMODE register value.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Self::DeepSleep),
            0x01 => Some(Self::Idle),
            0x02 => Some(Self::Standard),
            0x03 => Some(Self::LowPower),
            0x04 => Some(Self::UltraLowPower),
            0xF0 => Some(Self::Reset),
            _ => None,
        }
    }
}

/// Validity of the gas sensor output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum AirStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Warming Up")]
    WarmingUp,
    #[serde(rename = "No Valid Output")]
    NoValidOutput,
    Reserved,
    /// No status has been read yet.
    #[default]
    Unknown,
}

impl AirStatus {
    /// Name used in telemetry.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::WarmingUp => "Warming Up",
            Self::NoValidOutput => "No Valid Output",
            Self::Reserved => "Reserved",
            Self::Unknown => "Unknown",
        }
    }
}

/// Decoded DEVICE_STATUS register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub new_gpr: bool,
    pub new_data: bool,
    pub validity: AirStatus,
}

impl DeviceStatus {
    /// Split a DEVICE_STATUS byte into its flags.
    pub fn decode(raw: u8) -> Self {
        let validity = match (raw >> 2) & 0b11 {
            0 => AirStatus::Ok,
            1 => AirStatus::WarmingUp,
            2 => AirStatus::Reserved,
            _ => AirStatus::NoValidOutput,
        };
        Self {
            new_gpr: raw & 0x01 != 0,
            new_data: raw & 0x02 != 0,
            validity,
        }
    }
}

pub struct Ens16x<'a, I2C: 'static> {
    bus: &'a I2cGateway<I2C>,
    mode: Option<OpMode>,
    status: AirStatus,
    etvoc: u16,
    eco2: u16,
    aqi: u16,
}

impl<'a, I2C> Ens16x<'a, I2C>
where
    I2C: I2c + 'static,
{
    /// Driver with empty caches; call `init` before use.
    pub fn new(bus: &'a I2cGateway<I2C>) -> Self {
        Self {
            bus,
            mode: None,
            status: AirStatus::Unknown,
            etvoc: 0,
            eco2: 0,
            aqi: 0,
        }
    }

    /// Check the part id, make sure it runs in standard mode and prime the
    /// cached readings.
    pub fn init(&mut self) -> Result<(), BusError> {
        let mut id = [0u8; 2];
        self.bus.read(ENS16X_ADDRESS, &[REG_PART_ID], &mut id)?;
        tracing::debug!("ENS16x part id 0x{:04X}", u16::from_le_bytes(id));

        let status = self.device_status()?;
        match status.validity {
            AirStatus::Ok => tracing::info!("ENS16x ready"),
            AirStatus::WarmingUp => tracing::info!("ENS16x warming up"),
            AirStatus::NoValidOutput => tracing::info!("ENS16x has no valid output"),
            other => tracing::info!("ENS16x operational status: {}", other.as_str()),
        }
        tracing::info!(
            "ENS16x new data: {}, new gpr: {}",
            status.new_data,
            status.new_gpr
        );

        self.mode = self.opmode()?;
        if self.mode != Some(OpMode::Standard) {
            tracing::info!("Setting ENS16x mode to STANDARD");
            self.set_opmode(OpMode::Standard)?;
        } else {
            tracing::info!("ENS16x already in STANDARD mode");
        }

        self.read_etvoc()?;
        self.read_aqi()?;
        let uba = self.read_aqi_uba()?;
        tracing::info!("ENS16x AQI-UBA index (1 to 5): {}", uba);
        Ok(())
    }

    /// Read the OPMODE register.
    pub fn opmode(&mut self) -> Result<Option<OpMode>, BusError> {
        let mut buf = [0u8; 1];
        self.bus.read(ENS16X_ADDRESS, &[REG_OPMODE], &mut buf)?;
        Ok(OpMode::from_raw(buf[0]))
    }

    /// Switch modes through Idle and confirm by reading back.
    ///
    /// Returns the mode the driver now assumes; on a mismatch that is the
    /// previous one.
    pub fn set_opmode(
        &mut self,
        mode: OpMode,
    ) -> Result<Option<OpMode>, BusError> {
        self.bus.write(ENS16X_ADDRESS, &[REG_OPMODE, OpMode::Idle as u8])?;
        self.bus.write(ENS16X_ADDRESS, &[REG_OPMODE, mode as u8])?;
        let confirmed = self.opmode()?;
        if confirmed == Some(mode) {
            tracing::info!("ENS16x mode change to {:?} succeeded", mode);
            self.mode = Some(mode);
        } else {
            tracing::error!(
                "ENS16x mode change to {:?} failed, device reports {:?}",
                mode,
                confirmed
            );
        }
        Ok(self.mode)
    }

    /// Mode the driver believes the sensor is in.
    pub fn mode(&self) -> Option<OpMode> {
        self.mode
    }

    /// Read and cache DEVICE_STATUS.
    pub fn device_status(&mut self) -> Result<DeviceStatus, BusError> {
        let mut buf = [0u8; 1];
        self.bus.read(ENS16X_ADDRESS, &[REG_DEVICE_STATUS], &mut buf)?;
        let status = DeviceStatus::decode(buf[0]);
        self.status = status.validity;
        Ok(status)
    }

    fn read_word(
        &mut self,
        reg: u8,
    ) -> Result<u16, BusError> {
        let mut buf = [0u8; 2];
        self.bus.read(ENS16X_ADDRESS, &[reg], &mut buf)?;
        tracing::debug!("ENS16x reg 0x{:02X}: {:02X} {:02X}", reg, buf[0], buf[1]);
        Ok(u16::from_le_bytes(buf))
    }

    /// Equivalent total VOC in ppb.
    pub fn read_etvoc(&mut self) -> Result<u16, BusError> {
        self.etvoc = self.read_word(REG_DATA_ETVOC)?;
        Ok(self.etvoc)
    }

    /// Equivalent CO2 in ppm.
    pub fn read_eco2(&mut self) -> Result<u16, BusError> {
        self.eco2 = self.read_word(REG_DATA_ECO2)?;
        Ok(self.eco2)
    }

    /// ScioSense relative air-quality index.
    pub fn read_aqi(&mut self) -> Result<u16, BusError> {
        self.aqi = self.read_word(REG_DATA_AQI_S)?;
        Ok(self.aqi)
    }

    /// UBA air-quality rating, 1 (excellent) to 5 (unhealthy).
    pub fn read_aqi_uba(&mut self) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.bus.read(ENS16X_ADDRESS, &[REG_DATA_AQI_UBA], &mut buf)?;
        Ok(buf[0] & 0x07)
    }

    /// Feed ambient temperature and humidity to the gas sensor.
    ///
    /// The sensor's own view of those values is read back for the debug log;
    /// failures there are not reported.
    pub fn write_compensation(
        &mut self,
        comp: CompensationData,
    ) -> Result<(), BusError> {
        self.bus.write(
            ENS16X_ADDRESS,
            &[REG_TEMP_IN, comp.t[0], comp.t[1], comp.h[0], comp.h[1]],
        )?;

        match self.read_word(REG_DATA_T) {
            Ok(raw) => tracing::debug!("ENS16x sees {:.1}C", kelvin_from_raw(raw) - 273.15),
            Err(e) => tracing::debug!("ENS16x temperature read-back failed: {}", e),
        }
        match self.read_word(REG_DATA_RH) {
            Ok(raw) => tracing::debug!("ENS16x sees {:.0}%RH", humidity_from_raw(raw)),
            Err(e) => tracing::debug!("ENS16x humidity read-back failed: {}", e),
        }
        Ok(())
    }

    /// Last decoded validity flag.
    pub fn status(&self) -> AirStatus {
        self.status
    }

    /// Last eTVOC in ppb.
    pub fn etvoc(&self) -> u16 {
        self.etvoc
    }

    /// Last eCO2 in ppm.
    pub fn eco2(&self) -> u16 {
        self.eco2
    }

    /// Last relative AQI.
    pub fn aqi(&self) -> u16 {
        self.aqi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bits() {
        let s = DeviceStatus::decode(0b0000_0011);
        assert!(s.new_gpr && s.new_data);
        assert_eq!(s.validity, AirStatus::Ok);
        assert_eq!(DeviceStatus::decode(0b0100).validity, AirStatus::WarmingUp);
        assert_eq!(DeviceStatus::decode(0b1000).validity, AirStatus::Reserved);
        assert_eq!(DeviceStatus::decode(0b1100).validity, AirStatus::NoValidOutput);
        // STATAS and STATER bits do not leak into validity
        assert_eq!(DeviceStatus::decode(0b1100_0000).validity, AirStatus::Ok);
    }

    #[test]
    fn status_strings() {
        assert_eq!(AirStatus::WarmingUp.as_str(), "Warming Up");
        assert_eq!(
            serde_json::to_string(&AirStatus::NoValidOutput).unwrap(),
            "\"No Valid Output\""
        );
        assert_eq!(AirStatus::default(), AirStatus::Unknown);
    }

    #[test]
    fn opmode_raw() {
        assert_eq!(OpMode::from_raw(0xF0), Some(OpMode::Reset));
        assert_eq!(OpMode::from_raw(0x07), None);
        assert_eq!(OpMode::Standard as u8, 0x02);
    }
}
