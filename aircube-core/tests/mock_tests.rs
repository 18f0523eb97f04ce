use core::cell::RefCell;

use aircube_core::utils::controllers::{
    ens16x::{AirStatus, Ens16x, OpMode},
    ens210::{CompensationData, Ens210, TempUnit},
    i2c::{BusError, I2cGateway, SharedBus, MAX_CACHED_DEVICES},
    sensors::SensorHub,
};
use embassy_time::Duration;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use futures_lite::future::block_on;

/// I2C address of the ENS210 temperature/humidity sensor.
pub const ENS210: u8 = 0x43;
/// I2C address of the ENS16x gas sensor.
pub const ENS16X: u8 = 0x52;

/// Create a write transaction for the given I2C address and data payload.
pub fn write(
    addr: u8,
    data: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write(addr, data)
}
/// Create a write_read transaction for the given I2C address/payloads.
pub fn write_read(
    addr: u8,
    write: Vec<u8>,
    read: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write_read(addr, write, read)
}

/// Bus shared for the rest of the test run, as a board crate would hold it.
fn shared(mock: I2cMock) -> &'static SharedBus<I2cMock> {
    Box::leak(Box::new(critical_section::Mutex::new(RefCell::new(mock))))
}

/// Gateway initialized over a mock expecting `expectations`.
fn gateway(expectations: &[I2cTrans]) -> I2cGateway<I2cMock> {
    let gw = I2cGateway::new();
    gw.init(shared(I2cMock::new(expectations)));
    gw
}

/// Release the bus and check every expectation was consumed.
fn finish(gw: &I2cGateway<I2cMock>) {
    let bus = gw.deinit().expect("bus was initialized");
    critical_section::with(|cs| bus.borrow_ref_mut(cs).done());
}

/// 25.006 C, valid
const T_VALID: [u8; 3] = [0x8A, 0x4A, 0x01];
/// 45 %RH, valid
const H_VALID: [u8; 3] = [0x00, 0x5A, 0x01];

#[test]
fn transactions_before_init_fail() {
    let gw = I2cGateway::<I2cMock>::new();
    assert_eq!(gw.write(ENS210, &[0x10, 0x00]), Err(BusError::NotInitialized));
    let mut buf = [0u8; 1];
    assert_eq!(gw.read(ENS210, &[0x11], &mut buf), Err(BusError::NotInitialized));
    assert_eq!(gw.cached_devices(), 0);
}

#[test]
fn second_init_keeps_first_bus() {
    let gw = gateway(&[write(ENS210, vec![0x10, 0x00])]);
    let mut second = I2cMock::new(&[]);
    gw.init(shared(second.clone()));
    second.done();
    gw.write(ENS210, &[0x10, 0x00]).unwrap();
    finish(&gw);
}

#[test]
fn gateway_shares_bus_with_other_users() {
    let bus = shared(I2cMock::new(&[
        write(ENS210, vec![0x10, 0x00]),
        write(0x20, vec![0xAA]),
        write_read(ENS16X, vec![0x00], vec![0x60, 0x01]),
    ]));
    let gw = I2cGateway::new();
    gw.init(bus);
    gw.write(ENS210, &[0x10, 0x00]).unwrap();
    // a second driver on the same bus, outside the gateway
    let mut other = embedded_hal_bus::i2c::CriticalSectionDevice::new(bus);
    embedded_hal::i2c::I2c::write(&mut other, 0x20, &[0xAA]).unwrap();
    let mut id = [0u8; 2];
    gw.read(ENS16X, &[0x00], &mut id).unwrap();
    assert_eq!(id, [0x60, 0x01]);
    finish(&gw);
}

#[test]
fn handle_cache_is_bounded() {
    let expectations = [
        write(0x10, vec![0x00]),
        write(0x11, vec![0x00]),
        write(0x12, vec![0x00]),
        write(0x13, vec![0x00]),
        write(0x10, vec![0x01]),
    ];
    let gw = gateway(&expectations);
    for addr in 0x10..0x14 {
        gw.write(addr, &[0x00]).unwrap();
    }
    assert_eq!(gw.cached_devices(), MAX_CACHED_DEVICES);
    assert_eq!(gw.write(0x14, &[0x00]), Err(BusError::DeviceCacheFull));
    assert_eq!(gw.cached_devices(), MAX_CACHED_DEVICES);
    // cached addresses keep working
    gw.write(0x10, &[0x01]).unwrap();
    finish(&gw);
    assert_eq!(gw.cached_devices(), 0);
}

#[test]
fn hal_errors_are_mapped() {
    let expectations = [
        write(ENS16X, vec![0x10, 0x02])
            .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
        write_read(ENS16X, vec![0x20], vec![0x00]).with_error(ErrorKind::Bus),
    ];
    let gw = gateway(&expectations);
    assert_eq!(gw.write(ENS16X, &[0x10, 0x02]), Err(BusError::Nack));
    let mut buf = [0u8; 1];
    assert_eq!(gw.read(ENS16X, &[0x20], &mut buf), Err(BusError::Timeout));
    finish(&gw);
}

#[test]
fn deinit_releases_bus() {
    let gw = gateway(&[write(ENS210, vec![0x10, 0x01])]);
    gw.write(ENS210, &[0x10, 0x01]).unwrap();
    finish(&gw);
    assert!(!gw.is_initialized());
    assert_eq!(gw.write(ENS210, &[0x10, 0x01]), Err(BusError::NotInitialized));
    assert!(gw.deinit().is_none());
}

#[test]
fn ens210_init_and_deinit() {
    let expectations = [
        write(ENS210, vec![0x10, 0x00]),
        write(ENS210, vec![0x21, 0b11]),
        write(ENS210, vec![0x22, 0b11]),
        write_read(ENS210, vec![0x11], vec![0x01]),
        write_read(ENS210, vec![0x00], vec![0x10, 0x02]),
        write(ENS210, vec![0x10, 0x01]),
    ];
    let gw = gateway(&expectations);
    let mut sensor = Ens210::new(&gw);
    sensor.init().unwrap();
    assert_eq!(sensor.status().unwrap(), 0x01);
    assert_eq!(sensor.part_id().unwrap(), 0x0210);
    sensor.deinit().unwrap();
    finish(&gw);
}

#[test]
fn ens210_invalid_reading_keeps_cache() {
    let expectations = [
        write_read(ENS210, vec![0x30], T_VALID.to_vec()),
        write_read(ENS210, vec![0x33], H_VALID.to_vec()),
        // valid bit clear on both
        write_read(ENS210, vec![0x30], vec![0x00, 0x50, 0x00]),
        write_read(ENS210, vec![0x33], vec![0x00, 0x20, 0x02]),
    ];
    let gw = gateway(&expectations);
    let mut sensor = Ens210::new(&gw);

    sensor.read_envir().unwrap();
    let c = sensor.temperature(TempUnit::Celsius);
    assert!((c - 25.006).abs() < 0.01);
    assert!((sensor.temperature(TempUnit::Kelvin) - 298.156).abs() < 0.01);
    assert!((sensor.temperature(TempUnit::Fahrenheit) - 77.01).abs() < 0.01);
    assert_eq!(sensor.humidity(), 45.0);
    let comp = sensor.compensation();
    assert_eq!(
        comp,
        CompensationData {
            t: [0x8A, 0x4A],
            h: [0x00, 0x5A],
        }
    );

    sensor.read_envir().unwrap();
    assert_eq!(sensor.temperature(TempUnit::Celsius), c);
    assert_eq!(sensor.humidity(), 45.0);
    assert_eq!(sensor.compensation(), comp);
    finish(&gw);
}

#[test]
fn ens210_bus_error_keeps_cache() {
    let expectations = [
        write_read(ENS210, vec![0x30], T_VALID.to_vec()),
        write_read(ENS210, vec![0x33], H_VALID.to_vec()),
        write_read(ENS210, vec![0x30], vec![0, 0, 0])
            .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
    ];
    let gw = gateway(&expectations);
    let mut sensor = Ens210::new(&gw);
    sensor.read_envir().unwrap();
    assert_eq!(sensor.read_envir(), Err(BusError::Nack));
    assert_eq!(sensor.humidity(), 45.0);
    finish(&gw);
}

#[test]
fn ens16x_set_opmode_confirms() {
    let expectations = [
        write(ENS16X, vec![0x10, 0x01]),
        write(ENS16X, vec![0x10, 0x02]),
        write_read(ENS16X, vec![0x10], vec![0x02]),
        // device refuses low power
        write(ENS16X, vec![0x10, 0x01]),
        write(ENS16X, vec![0x10, 0x03]),
        write_read(ENS16X, vec![0x10], vec![0x01]),
    ];
    let gw = gateway(&expectations);
    let mut sensor = Ens16x::new(&gw);
    assert_eq!(sensor.set_opmode(OpMode::Standard), Ok(Some(OpMode::Standard)));
    assert_eq!(sensor.set_opmode(OpMode::LowPower), Ok(Some(OpMode::Standard)));
    assert_eq!(sensor.mode(), Some(OpMode::Standard));
    finish(&gw);
}

#[test]
fn ens16x_init_switches_to_standard() {
    let expectations = [
        write_read(ENS16X, vec![0x00], vec![0x60, 0x01]),
        write_read(ENS16X, vec![0x20], vec![0b0000_0110]),
        write_read(ENS16X, vec![0x10], vec![0x00]),
        write(ENS16X, vec![0x10, 0x01]),
        write(ENS16X, vec![0x10, 0x02]),
        write_read(ENS16X, vec![0x10], vec![0x02]),
        write_read(ENS16X, vec![0x22], vec![0x2C, 0x01]),
        write_read(ENS16X, vec![0x26], vec![0x32, 0x00]),
        write_read(ENS16X, vec![0x21], vec![0x02]),
    ];
    let gw = gateway(&expectations);
    let mut sensor = Ens16x::new(&gw);
    sensor.init().unwrap();
    assert_eq!(sensor.mode(), Some(OpMode::Standard));
    assert_eq!(sensor.status(), AirStatus::WarmingUp);
    assert_eq!(sensor.etvoc(), 300);
    assert_eq!(sensor.aqi(), 50);
    finish(&gw);
}

#[test]
fn ens16x_compensation_ignores_readback_failure() {
    let comp = CompensationData {
        t: [0x8A, 0x4A],
        h: [0x00, 0x5A],
    };
    let expectations = [
        write(ENS16X, vec![0x13, 0x8A, 0x4A, 0x00, 0x5A]),
        write_read(ENS16X, vec![0x30], vec![0x8A, 0x4A]),
        write_read(ENS16X, vec![0x32], vec![0, 0]).with_error(ErrorKind::Bus),
    ];
    let gw = gateway(&expectations);
    let mut sensor = Ens16x::new(&gw);
    assert_eq!(sensor.write_compensation(comp), Ok(()));
    finish(&gw);
}

#[test]
fn poll_cycle_order() {
    let expectations = [
        // ENS210 measurement and status
        write_read(ENS210, vec![0x30], T_VALID.to_vec()),
        write_read(ENS210, vec![0x33], H_VALID.to_vec()),
        write_read(ENS210, vec![0x11], vec![0x01]),
        // compensation into the gas sensor
        write(ENS16X, vec![0x13, 0x8A, 0x4A, 0x00, 0x5A]),
        write_read(ENS16X, vec![0x30], vec![0x8A, 0x4A]),
        write_read(ENS16X, vec![0x32], vec![0x00, 0x5A]),
        // gas sensor status and outputs
        write_read(ENS16X, vec![0x20], vec![0b0000_0011]),
        write_read(ENS16X, vec![0x22], vec![0x64, 0x00]),
        write_read(ENS16X, vec![0x24], vec![0x90, 0x01]),
        write_read(ENS16X, vec![0x26], vec![0xFA, 0x00]),
    ];
    let gw = gateway(&expectations);
    let mut hub = SensorHub::new(&gw);
    let reading = hub.poll(1234);
    assert_eq!(reading.ens210_status, 0x01);
    assert!((reading.temperature_c - 25.006).abs() < 0.01);
    assert_eq!(reading.humidity, 45.0);
    assert_eq!(reading.status, AirStatus::Ok);
    assert_eq!(reading.etvoc_ppb, 100);
    assert_eq!(reading.eco2_ppm, 400);
    assert_eq!(reading.aqi, 250);
    assert_eq!(reading.timestamp_ms, 1234);
    finish(&gw);
}

#[test]
fn poll_survives_gas_sensor_fault() {
    let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
    let expectations = [
        write_read(ENS210, vec![0x30], T_VALID.to_vec()),
        write_read(ENS210, vec![0x33], H_VALID.to_vec()),
        write_read(ENS210, vec![0x11], vec![0x00]),
        write(ENS16X, vec![0x13, 0x8A, 0x4A, 0x00, 0x5A]).with_error(nack),
        write_read(ENS16X, vec![0x20], vec![0x00]).with_error(nack),
        write_read(ENS16X, vec![0x22], vec![0, 0]).with_error(nack),
        write_read(ENS16X, vec![0x24], vec![0, 0]).with_error(nack),
        write_read(ENS16X, vec![0x26], vec![0, 0]).with_error(nack),
    ];
    let gw = gateway(&expectations);
    let mut hub = SensorHub::new(&gw);
    let reading = hub.poll(5);
    assert_eq!(reading.humidity, 45.0);
    assert_eq!(reading.status, AirStatus::Unknown);
    assert_eq!(reading.aqi, 0);
    finish(&gw);
}

#[test]
fn hub_start_brings_up_both_sensors() {
    let expectations = [
        write(ENS210, vec![0x10, 0x00]),
        write(ENS210, vec![0x21, 0b11]),
        write(ENS210, vec![0x22, 0b11]),
        write_read(ENS210, vec![0x11], vec![0x01]),
        write_read(ENS16X, vec![0x00], vec![0x60, 0x01]),
        write_read(ENS16X, vec![0x20], vec![0b0000_0000]),
        write_read(ENS16X, vec![0x10], vec![0x02]),
        write_read(ENS16X, vec![0x22], vec![0x00, 0x00]),
        write_read(ENS16X, vec![0x26], vec![0x01, 0x00]),
        write_read(ENS16X, vec![0x21], vec![0x01]),
    ];
    let gw = gateway(&expectations);
    let mut hub = SensorHub::new(&gw);
    block_on(hub.start(Duration::from_millis(1))).unwrap();
    assert_eq!(hub.ens16x().mode(), Some(OpMode::Standard));
    finish(&gw);
}
