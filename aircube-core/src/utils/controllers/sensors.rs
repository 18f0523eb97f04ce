//! Sensor poll cycle.
//!
//! One cycle reads the ENS210, forwards its raw values to the ENS16x for
//! compensation, then reads the gas sensor status and outputs. A bus error in
//! any step is logged and that step's cached value is reused, so a cycle
//! always yields a complete [`SensorReading`].

use embassy_time::{Duration, Instant, Timer};
use embedded_hal::i2c::I2c;

use super::{
    ens16x::{AirStatus, Ens16x},
    ens210::{Ens210, TempUnit},
    i2c::{BusError, I2cGateway},
    DeviceContext,
};
use crate::utils::connection::telemetry;

/// Snapshot produced by one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub ens210_status: u8,
    pub temperature_c: f32,
    pub temperature_f: f32,
    pub humidity: f32,
    pub status: AirStatus,
    pub etvoc_ppb: u16,
    pub eco2_ppm: u16,
    pub aqi: u16,
    pub timestamp_ms: u64,
}

pub struct SensorHub<'a, I2C: 'static> {
    ens210: Ens210<'a, I2C>,
    ens16x: Ens16x<'a, I2C>,
    ens210_status: u8,
}

impl<'a, I2C> SensorHub<'a, I2C>
where
    I2C: I2c + 'static,
{
    /// Drivers for both sensors on `bus`; nothing is sent until `start`.
    pub fn new(bus: &'a I2cGateway<I2C>) -> Self {
        Self {
            ens210: Ens210::new(bus),
            ens16x: Ens16x::new(bus),
            ens210_status: 0,
        }
    }

    /// Start both sensors. The ENS210 needs `settle` before its first read.
    pub async fn start(
        &mut self,
        settle: Duration,
    ) -> Result<(), BusError> {
        self.ens210.init()?;
        Timer::after(settle).await;
        self.ens210_status = self.ens210.status()?;
        tracing::info!("ENS210 initialized, SYS_STAT: 0x{:02X}", self.ens210_status);

        self.ens16x.init()?;
        tracing::info!("ENS16x initialized");
        Ok(())
    }

    /// Run one poll cycle stamped with `now_ms`.
    pub fn poll(
        &mut self,
        now_ms: u64,
    ) -> SensorReading {
        if let Err(e) = self.ens210.read_envir() {
            tracing::error!("ENS210 read failed: {}", e);
        }
        match self.ens210.status() {
            Ok(s) => self.ens210_status = s,
            Err(e) => tracing::error!("ENS210 status read failed: {}", e),
        }
        if let Err(e) = self.ens16x.write_compensation(self.ens210.compensation()) {
            tracing::error!("ENS16x compensation write failed: {}", e);
        }
        if let Err(e) = self.ens16x.device_status() {
            tracing::error!("ENS16x status read failed: {}", e);
        }
        for (name, result) in [
            ("etvoc", self.ens16x.read_etvoc()),
            ("eco2", self.ens16x.read_eco2()),
            ("aqi", self.ens16x.read_aqi()),
        ] {
            if let Err(e) = result {
                tracing::error!("ENS16x {} read failed: {}", name, e);
            }
        }

        let reading = self.snapshot(now_ms);
        tracing::info!(
            "ENS210 0x{:02X}, {:.2}C, {:.2}%RH | ENS16x {}, eTVOC {} ppb, eCO2 {} ppm, AQI {}",
            reading.ens210_status,
            reading.temperature_c,
            reading.humidity,
            reading.status.as_str(),
            reading.etvoc_ppb,
            reading.eco2_ppm,
            reading.aqi
        );
        reading
    }

    /// Cached values without touching the bus.
    pub fn snapshot(
        &self,
        now_ms: u64,
    ) -> SensorReading {
        SensorReading {
            ens210_status: self.ens210_status,
            temperature_c: self.ens210.temperature(TempUnit::Celsius),
            temperature_f: self.ens210.temperature(TempUnit::Fahrenheit),
            humidity: self.ens210.humidity(),
            status: self.ens16x.status(),
            etvoc_ppb: self.ens16x.etvoc(),
            eco2_ppm: self.ens16x.eco2(),
            aqi: self.ens16x.aqi(),
            timestamp_ms: now_ms,
        }
    }

    /// Poll forever at the context's readout period, publishing each reading
    /// and queueing its telemetry line.
    pub async fn run(
        &mut self,
        ctx: &DeviceContext,
    ) -> ! {
        loop {
            let reading = self.poll(Instant::now().as_millis());
            ctx.publish_reading(reading);
            match telemetry::encode(&reading) {
                Ok(line) => ctx.send_telemetry(line),
                Err(e) => tracing::warn!("Telemetry encode failed: {}", e),
            }
            Timer::after_millis(ctx.readout_period_ms() as u64).await;
        }
    }

    /// Gas sensor driver, e.g. for mode changes outside the poll cycle.
    pub fn ens16x(&mut self) -> &mut Ens16x<'a, I2C> {
        &mut self.ens16x
    }
}
