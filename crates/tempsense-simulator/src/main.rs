//! Desktop simulator for the tempsense temperature reporter.
//!
//! Runs the same boot gate and sensing cycle as the board, with simulated
//! sensors and host-side sinks, so settings files and reporting endpoints can
//! be tried without hardware.
//!
//! # Environment
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `TEMPSENSE_SETTINGS` | bundled `settings.toml` | settings file to load |
//! | `SIM_DEBUG_JUMPER` | `0` | `1` grounds the debug jumper |
//! | `SIM_FAILING_SENSORS` | empty | comma-separated sensor ids that fail to read |
//! | `SIM_SINK` | `log` | `log`, `posts` or `http` |
//! | `SIM_POSTS_DIR` | `posts` | output directory of the `posts` sink |
//! | `SIM_CYCLES` | `3` | number of sensing cycles |
//! | `SIM_SPEEDUP` | `600` | factor applied to every delay |

use std::env;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use embassy_futures::block_on;
use log::{error, info, warn};

use tempsense_core::app_state::RunState;
use tempsense_core::boot::{BootController, BootOutcome};
use tempsense_core::config::{Config, ConfigError, ReportConfig, SensorConfig};
use tempsense_core::reading::Reading;
use tempsense_core::report::post::PostDocument;
use tempsense_core::report::{LogSink, ReportError, ReportSink, Retrying, http};
use tempsense_core::sensing::SensingModule;
use tempsense_core::sensors::{SensorError, TemperatureProbe};
use tempsense_core::status::StatusLed;
use tempsense_core::time::{Clock, Timestamp};

const DEFAULT_SETTINGS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/settings.toml");

/// How long the LED pattern is shown before the simulator exits on halt.
const HALT_DISPLAY_MS: u64 = 6_000;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Simulated hardware
// ---------------------------------------------------------------------------

/// Debug jumper driven from `SIM_DEBUG_JUMPER`.
struct SimJumper {
    grounded: bool,
}

impl embedded_hal::digital::ErrorType for SimJumper {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::InputPin for SimJumper {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.grounded)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.grounded)
    }
}

/// Status LED that logs its transitions.
#[derive(Default)]
struct LogLed {
    lit: bool,
}

impl embedded_hal::digital::ErrorType for LogLed {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for LogLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.lit {
            log::trace!("LED off");
        }
        self.lit = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.lit {
            log::trace!("LED on");
        }
        self.lit = true;
        Ok(())
    }
}

/// Sleeps the thread for the requested time divided by the speedup.
#[derive(Clone, Copy)]
struct ScaledDelay {
    speedup: u32,
}

impl embedded_hal_async::delay::DelayNs for ScaledDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns / self.speedup.max(1))));
    }
}

/// Temperatures that drift slowly around a per-sensor baseline.
struct SimulatedProbe {
    started: Instant,
    speedup: u32,
    failing: Vec<String>,
}

impl TemperatureProbe for SimulatedProbe {
    async fn read_celsius(&mut self, sensor: &SensorConfig) -> Result<f32, SensorError> {
        if self.failing.iter().any(|id| *id == sensor.id) {
            return Err(SensorError::NotPresent { pin: sensor.pin });
        }

        // simulated time, so the curve moves at the same pace as the delays
        let t = self.started.elapsed().as_secs_f64() * f64::from(self.speedup);
        let baseline = 18.0 + f64::from(sensor.pin % 8);
        let celsius = baseline + 3.0 * (t / 3600.0).sin() + 0.5 * (t / 420.0).cos();

        // the DS18B20 resolves 1/16 °C
        Ok(((celsius * 16.0).round() / 16.0) as f32)
    }
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Timestamp::from_unix(i64::try_from(secs).unwrap_or(i64::MAX))
    }
}

// ---------------------------------------------------------------------------
// Host sinks
// ---------------------------------------------------------------------------

/// Writes each post into a local directory tree, as a static site would store it.
struct PostDirectorySink {
    root: PathBuf,
    utc_offset_hours: i8,
}

impl ReportSink for PostDirectorySink {
    async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
        let document = PostDocument::new(reading, self.utc_offset_hours);
        let path = self.root.join(&document.path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                error!("Creating {}: {}", parent.display(), e);
                ReportError::Storage("cannot create post directory")
            })?;
        }
        fs::write(&path, &document.body).map_err(|e| {
            error!("Writing {}: {}", path.display(), e);
            ReportError::Storage("cannot write post")
        })?;

        info!("Wrote {}", path.display());
        Ok(())
    }
}

/// PUTs each post to `REPORT_URL` over a blocking `std::net` connection.
struct StdHttpSink {
    report: ReportConfig,
    utc_offset_hours: i8,
}

impl StdHttpSink {
    fn exchange(&self, request: &[u8]) -> std::io::Result<Vec<u8>> {
        let target = &self.report.target;
        let mut stream = TcpStream::connect((target.host.as_str(), target.port))?;
        stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;
        stream.set_write_timeout(Some(SOCKET_TIMEOUT))?;

        stream.write_all(request)?;
        stream.flush()?;

        let mut response = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&chunk[..n]);
            if response.windows(2).any(|w| w == b"\r\n") {
                break;
            }
        }
        Ok(response)
    }
}

impl ReportSink for StdHttpSink {
    async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
        let document = PostDocument::new(reading, self.utc_offset_hours);
        let request =
            http::put_request(&self.report.target, self.report.token.as_deref(), &document);

        let response = self.exchange(&request).map_err(|e| {
            warn!("HTTP exchange with {} failed: {}", self.report.target.authority(), e);
            ReportError::Network("HTTP exchange failed")
        })?;

        http::check_status(http::parse_status(&response)?)
    }
}

/// Sink selected by `SIM_SINK`.
enum SimSink {
    Log(LogSink),
    Posts(PostDirectorySink),
    Http(StdHttpSink),
}

impl ReportSink for SimSink {
    async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
        match self {
            Self::Log(sink) => sink.publish(reading).await,
            Self::Posts(sink) => sink.publish(reading).await,
            Self::Http(sink) => sink.publish(reading).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

fn env_flag(name: &str) -> bool {
    matches!(env::var(name).as_deref(), Ok("1" | "true" | "yes"))
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("{} = {:?} is not a number, using the default", name, value);
            default
        }),
        Err(_) => default,
    }
}

fn env_list(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Read and parse the settings file; an unreadable file counts as empty.
fn load_config(path: &str) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        error!("Cannot read settings file {}: {}", path, e);
        String::new()
    });
    Config::from_settings(&text)
}

fn build_sink(kind: &str, config: &Config) -> SimSink {
    match kind {
        "posts" => SimSink::Posts(PostDirectorySink {
            root: PathBuf::from(env::var("SIM_POSTS_DIR").unwrap_or_else(|_| "posts".into())),
            utc_offset_hours: config.utc_offset_hours,
        }),
        "http" => SimSink::Http(StdHttpSink {
            report: config.report.clone(),
            utc_offset_hours: config.utc_offset_hours,
        }),
        other => {
            if other != "log" {
                warn!("Unknown SIM_SINK {:?}, logging readings instead", other);
            }
            SimSink::Log(LogSink)
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    info!("Starting tempsense simulator");

    let speedup = env_number("SIM_SPEEDUP", 600u32).max(1);
    let cycles = env_number("SIM_CYCLES", 3u32);
    let settings_path = env::var("TEMPSENSE_SETTINGS").unwrap_or_else(|_| DEFAULT_SETTINGS.into());
    let delay = ScaledDelay { speedup };

    let mut led = StatusLed::new(LogLed::default(), delay);
    block_on(led.stage(RunState::Booting));

    let mut boot = BootController::new(SimJumper {
        grounded: env_flag("SIM_DEBUG_JUMPER"),
    });
    let outcome = boot.start(|| load_config(&settings_path));
    let debug_mode = matches!(outcome, BootOutcome::Debug);
    let config = match outcome.into_config() {
        Ok(config) => config,
        Err(pattern) => {
            info!("Halted: LED blinks until power is removed");
            block_on(led.run_for(pattern, HALT_DISPLAY_MS));
            return if debug_mode {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };
    log::set_max_level(config.log_level);

    let probe = SimulatedProbe {
        started: Instant::now(),
        speedup,
        failing: env_list("SIM_FAILING_SENSORS"),
    };
    let sink_kind = env::var("SIM_SINK").unwrap_or_else(|_| "log".into());
    let sink = Retrying::new(build_sink(&sink_kind, &config), delay, config.report.retry);

    let mut sensing = SensingModule::new(&config, probe, sink, SystemClock);

    for cycle in 1..=cycles {
        block_on(led.stage(RunState::Reporting));
        let summary = block_on(sensing.run_cycle());
        block_on(led.stage(RunState::Complete));

        info!("Cycle {}/{}: {:?}", cycle, cycles, summary);
        if cycle < cycles {
            let succeeded = summary.succeeded();
            block_on(led.rest(succeeded, config.rest_secs(succeeded)));
        }
    }

    info!("Simulator exiting");
    ExitCode::SUCCESS
}
