use aircube_core::mk_static;
use aircube_core::utils::config::DeviceConfig;
use aircube_core::utils::connection::serial;
use aircube_core::utils::controllers::button::{self, Brightness};
use aircube_core::utils::controllers::i2c::SharedBus;
use aircube_core::utils::controllers::storage::{PersistenceError, SettingsStore};
use aircube_core::utils::math::hysteresis::ColorMapping;
use aircube_core::utils::{ColorEngine, DeviceContext, I2cGateway, LedRenderer, SensorHub};
use anyhow::Context;
use clap::Parser;
use core::cell::RefCell;
use embassy_executor::Executor;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Timer};
use embedded_hal::i2c::{ErrorKind, I2c, NoAcknowledgeSource, Operation};
use futures_lite::future::block_on;
use rand_core::{OsRng, TryRngCore};
use smart_leds_trait::{SmartLedsWrite, RGB8};
use static_cell::StaticCell;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// JSON device configuration; missing fields use defaults
    #[clap(long)]
    config: Option<PathBuf>,
    /// file holding the persisted brightness preference
    #[clap(long, default_value = "aircube-state.json")]
    state: PathBuf,
    /// override the sensor readout period (ms)
    #[clap(long)]
    readout_period: Option<u32>,
    /// play the startup sweep
    #[clap(long)]
    sweep: bool,
    /// use green/yellow/red bands instead of the hue gradient
    #[clap(long)]
    banded: bool,
    /// seconds the simulated gas sensor spends warming up
    #[clap(long, default_value_t = 10)]
    warmup_secs: u64,
    /// simulate a (bouncy) button press every N ms
    #[clap(long)]
    press_every: Option<u64>,
}

/// Register-level stand-in for the ENS210 and ENS16x.
struct SimBus {
    start: std::time::Instant,
    warmup: std::time::Duration,
    ens210_active: bool,
    ens210_reads: u32,
    ens16x_mode: u8,
    /// Raw T/H last written to the gas sensor
    comp: [u8; 4],
}

impl SimBus {
    const ENS210: u8 = 0x43;
    const ENS16X: u8 = 0x52;

    fn new(warmup: std::time::Duration) -> Self {
        Self {
            start: std::time::Instant::now(),
            warmup,
            ens210_active: false,
            ens210_reads: 0,
            ens16x_mode: 0x00,
            comp: [0; 4],
        }
    }

    fn secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Uniform noise in -0.5..0.5; zero if the OS source fails.
    fn jitter(&self) -> f32 {
        let sample = OsRng.try_next_u32().unwrap_or(500);
        (sample % 1000) as f32 / 1000.0 - 0.5
    }

    fn aqi(&mut self) -> u16 {
        let t = self.secs();
        let drift = 70.0 + 80.0 * (t / 45.0).sin() + 40.0 * (t / 11.0).sin();
        (drift + 10.0 * self.jitter()).clamp(0.0, 500.0) as u16
    }

    fn write_reg(
        &mut self,
        addr: u8,
        bytes: &[u8],
    ) {
        match (addr, bytes) {
            (Self::ENS210, [0x10, v, ..]) => self.ens210_active = *v & 0x01 == 0,
            (Self::ENS16X, [0x10, mode, ..]) => self.ens16x_mode = *mode,
            (Self::ENS16X, [0x13, t0, t1, h0, h1]) => self.comp = [*t0, *t1, *h0, *h1],
            _ => {}
        }
    }

    fn read_reg(
        &mut self,
        addr: u8,
        reg: u8,
        out: &mut [u8],
    ) {
        let t = self.secs();
        let bytes: Vec<u8> = match (addr, reg) {
            (Self::ENS210, 0x00) => vec![0x10, 0x02],
            (Self::ENS210, 0x11) => vec![self.ens210_active as u8],
            (Self::ENS210, 0x30 | 0x33) => {
                self.ens210_reads += 1;
                // every so often the sensor reports a stale conversion
                let valid = (self.ens210_reads % 17 != 0) as u8;
                let raw = if reg == 0x30 {
                    let c = 22.0 + 1.5 * (t / 60.0).sin() + 0.1 * self.jitter();
                    ((c + 273.15) * 64.0) as u16
                } else {
                    let rh = 40.0 + 5.0 * (t / 90.0).sin();
                    (rh * 512.0) as u16
                };
                let [lo, hi] = raw.to_le_bytes();
                vec![lo, hi, valid]
            }
            (Self::ENS16X, 0x00) => vec![0x60, 0x01],
            (Self::ENS16X, 0x10) => vec![self.ens16x_mode],
            (Self::ENS16X, 0x20) => {
                let validity = if self.start.elapsed() < self.warmup { 1 } else { 0 };
                vec![(validity << 2) | 0x02]
            }
            (Self::ENS16X, 0x21) => vec![(self.aqi() / 50).clamp(1, 5) as u8],
            (Self::ENS16X, 0x22) => (self.aqi() * 4).to_le_bytes().to_vec(),
            (Self::ENS16X, 0x24) => (400 + self.aqi() * 3).to_le_bytes().to_vec(),
            (Self::ENS16X, 0x26) => self.aqi().to_le_bytes().to_vec(),
            (Self::ENS16X, 0x30) => self.comp[..2].to_vec(),
            (Self::ENS16X, 0x32) => self.comp[2..].to_vec(),
            _ => Vec::new(),
        };
        for (dst, src) in out.iter_mut().zip(bytes.iter().chain(std::iter::repeat(&0))) {
            *dst = *src;
        }
    }
}

impl embedded_hal::i2c::ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != Self::ENS210 && address != Self::ENS16X {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        let mut reg = 0u8;
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    reg = bytes.first().copied().unwrap_or(reg);
                    self.write_reg(address, bytes);
                }
                Operation::Read(buf) => self.read_reg(address, reg, buf),
            }
        }
        Ok(())
    }
}

/// LED driver that logs frame changes to the console.
struct ConsoleLeds {
    last: Vec<RGB8>,
}

impl SmartLedsWrite for ConsoleLeds {
    type Error = Infallible;
    type Color = RGB8;

    fn write<T, I>(
        &mut self,
        iterator: T,
    ) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        let frame: Vec<RGB8> = iterator.into_iter().map(Into::into).collect();
        if frame != self.last {
            let hex: Vec<String> = frame
                .iter()
                .map(|c| format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b))
                .collect();
            debug!("LEDs: {}", hex.join(" "));
            self.last = frame;
        }
        Ok(())
    }
}

/// Button line as seen after the debounce window: still pressed.
struct SimButton;

impl embedded_hal::digital::ErrorType for SimButton {
    type Error = Infallible;
}

impl embedded_hal::digital::InputPin for SimButton {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

/// Brightness preference kept in a small JSON file.
struct FileStore {
    path: PathBuf,
}

impl FileStore {
    fn entries(&self) -> Result<BTreeMap<String, i32>, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).map_err(|_| PersistenceError::Unavailable),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(_) => Err(PersistenceError::Unavailable),
        }
    }
}

impl SettingsStore for FileStore {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<i32>, PersistenceError> {
        Ok(self.entries()?.get(key).copied())
    }

    fn set(
        &mut self,
        key: &str,
        value: i32,
    ) -> Result<(), PersistenceError> {
        let mut entries = self.entries().unwrap_or_default();
        entries.insert(key.to_owned(), value);
        let text =
            serde_json::to_string_pretty(&entries).map_err(|_| PersistenceError::Unavailable)?;
        std::fs::write(&self.path, text).map_err(|_| PersistenceError::Unavailable)
    }
}

/// Chunks read from stdin by a helper thread.
static STDIN_CHUNKS: Channel<CriticalSectionRawMutex, heapless::Vec<u8, 64>, 16> = Channel::new();

fn spawn_stdin_reader() {
    std::thread::spawn(|| {
        let mut stdin = std::io::stdin().lock();
        let mut buf = [0u8; 64];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(chunk) = heapless::Vec::from_slice(&buf[..n]) {
                        block_on(STDIN_CHUNKS.send(chunk));
                    }
                }
                Err(e) => {
                    warn!("stdin closed: {}", e);
                    break;
                }
            }
        }
    });
}

/// Serial rx side backed by stdin.
struct StdinPort {
    pending: heapless::Vec<u8, 64>,
    pos: usize,
}

impl embedded_io_async::ErrorType for StdinPort {
    type Error = Infallible;
}

impl embedded_io_async::Read for StdinPort {
    async fn read(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        if self.pos >= self.pending.len() {
            self.pending = STDIN_CHUNKS.receive().await;
            self.pos = 0;
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Serial tx side backed by stdout.
struct StdoutPort;

impl embedded_io_async::ErrorType for StdoutPort {
    type Error = embedded_io_async::ErrorKind;
}

impl embedded_io_async::Write for StdoutPort {
    async fn write(
        &mut self,
        buf: &[u8],
    ) -> Result<usize, Self::Error> {
        std::io::stdout()
            .lock()
            .write_all(buf)
            .map_err(|_| embedded_io_async::ErrorKind::Other)?;
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::stdout()
            .flush()
            .map_err(|_| embedded_io_async::ErrorKind::Other)
    }
}

#[embassy_executor::task]
async fn sensor_task(
    mut hub: SensorHub<'static, SimBus>,
    ctx: &'static DeviceContext,
) -> ! {
    hub.run(ctx).await
}

#[embassy_executor::task]
async fn engine_task(
    mut engine: ColorEngine,
    ctx: &'static DeviceContext,
) -> ! {
    engine.run(ctx).await
}

#[embassy_executor::task]
async fn led_task(
    renderer: LedRenderer<ConsoleLeds>,
    ctx: &'static DeviceContext,
) -> ! {
    let period = Duration::from_millis(ctx.config.render_ms as u64);
    renderer.run(&ctx.leds, period).await
}

#[embassy_executor::task]
async fn rx_task(ctx: &'static DeviceContext) -> ! {
    let port = StdinPort {
        pending: heapless::Vec::new(),
        pos: 0,
    };
    serial::rx(ctx, port).await
}

#[embassy_executor::task]
async fn tx_task(ctx: &'static DeviceContext) -> ! {
    serial::tx(ctx, StdoutPort).await
}

#[embassy_executor::task]
async fn button_task(
    ctx: &'static DeviceContext,
    store: FileStore,
    brightness: Brightness,
) -> ! {
    button::run(ctx, SimButton, store, brightness).await
}

/// Fake interrupt source: a press followed by a contact bounce.
#[embassy_executor::task]
async fn press_task(
    ctx: &'static DeviceContext,
    every: Duration,
) -> ! {
    loop {
        Timer::after(every).await;
        info!("Simulated button press");
        if !ctx.push_edge() {
            warn!("Edge queue full");
        }
        Timer::after_millis(5).await;
        ctx.push_edge();
    }
}

fn load_config(opts: &Opts) -> anyhow::Result<DeviceConfig> {
    let mut config = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => DeviceConfig::default(),
    };
    if let Some(period) = opts.readout_period {
        config.readout_period_ms = period;
    }
    if opts.sweep {
        config.startup_sweep = true;
    }
    if opts.banded {
        config.color_mapping = ColorMapping::Banded;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts: Opts = Opts::parse();
    let config = load_config(&opts)?;
    info!("AirCube mock starting");

    let store = FileStore {
        path: opts.state.clone(),
    };
    let brightness = Brightness::load(&store);
    let ctx: &'static DeviceContext =
        mk_static!(DeviceContext, DeviceContext::new(config, brightness.level()));

    let bus: &'static I2cGateway<SimBus> = mk_static!(I2cGateway<SimBus>, I2cGateway::new());
    let sim = SimBus::new(std::time::Duration::from_secs(opts.warmup_secs));
    bus.init(mk_static!(
        SharedBus<SimBus>,
        critical_section::Mutex::new(RefCell::new(sim))
    ));
    let mut hub = SensorHub::new(bus);
    block_on(hub.start(Duration::from_millis(config.sensor_settle_ms as u64)))
        .context("sensor bring-up failed")?;

    let renderer = LedRenderer::new(
        ConsoleLeds { last: Vec::new() },
        config.led_count,
        config.strip_len,
        config.channel_order,
    );
    let engine = ColorEngine::new(&config);
    spawn_stdin_reader();

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(tx_task(ctx)).unwrap();
        spawner.spawn(rx_task(ctx)).unwrap();
        spawner.spawn(led_task(renderer, ctx)).unwrap();
        spawner.spawn(engine_task(engine, ctx)).unwrap();
        spawner.spawn(sensor_task(hub, ctx)).unwrap();
        spawner.spawn(button_task(ctx, store, brightness)).unwrap();
        if let Some(ms) = opts.press_every {
            spawner.spawn(press_task(ctx, Duration::from_millis(ms))).unwrap();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_centered() {
        let sim = SimBus::new(std::time::Duration::ZERO);
        for _ in 0..200 {
            let j = sim.jitter();
            assert!((-0.5..0.5).contains(&j));
        }
    }

    #[test]
    fn unknown_address_is_nacked() {
        let mut sim = SimBus::new(std::time::Duration::ZERO);
        assert_eq!(
            sim.write(0x10, &[0x00]),
            Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        );
        let mut id = [0u8; 2];
        sim.write_read(SimBus::ENS16X, &[0x00], &mut id).unwrap();
        assert_eq!(id, [0x60, 0x01]);
    }
}
