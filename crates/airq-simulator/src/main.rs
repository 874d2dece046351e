//! Desktop simulator for the air-quality board.
//!
//! Runs the full BME688 pipeline (bring-up, heater setup, baseline burn-in,
//! scoring and data logging) against the simulated sensor. Time is virtual,
//! so the five-minute burn-in finishes immediately.
//!
//! Files land in a host directory that plays the SD card, so a baseline
//! learned in one run is reused by the next.
//!
//! # Usage
//!
//! ```text
//! airq-simulator [DATA_DIR] [--force-burn-in]
//! ```
//!
//! `DATA_DIR` defaults to `./sdcard`. Set `RUST_LOG=debug` for driver detail.

mod dir_storage;

use std::fmt;
use std::process::ExitCode;

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use airq_core::async_i2c_bus::SharedI2cBus;
use airq_core::board::{Board, BoardError, ONBOARD_ZIP_LEDS};
use airq_core::clock::Clock;
use airq_core::config::BoardConfig;
use airq_core::metrics::AirQualityRating;
use airq_core::sensors::bme688::registers::RawCodes;
use airq_core::sensors::bme688::{PressureUnit, TemperatureUnit};
use airq_core::sensors::{Bme688, Sensor, SensorError};
use airq_core::sim::{ManualClock, REFERENCE_CODES, RecordingStateMachine, SimDelay, SimulatedBme688};
use airq_core::storage::{DataLogger, StorageError};

use dir_storage::DirStorage;

/// Virtual time between logged readings.
const SAMPLE_INTERVAL_MS: u32 = 3000;

/// Number of readings taken after the baseline is in place.
const SAMPLE_COUNT: usize = 12;

const LOG_HEADINGS: [&str; 6] = ["Temp_cC", "Press_Pa", "Hum_%", "Gas_ohm", "IAQ", "eCO2_ppm"];

/// Conditions the simulated sensor reports at each step of the run.
#[derive(Debug, Clone, Copy)]
enum Scenario {
    CleanAir,
    Breath,
    Pollution,
}

impl Scenario {
    fn at(step: usize) -> Self {
        match step {
            4 => Self::Breath,
            8..=10 => Self::Pollution,
            _ => Self::CleanAir,
        }
    }

    fn codes(self) -> RawCodes {
        match self {
            Self::CleanAir => REFERENCE_CODES,
            Self::Breath => RawCodes {
                humidity: REFERENCE_CODES.humidity + 2400,
                ..REFERENCE_CODES
            },
            Self::Pollution => RawCodes {
                gas: REFERENCE_CODES.gas + 300,
                ..REFERENCE_CODES
            },
        }
    }
}

#[derive(Debug)]
enum SimError {
    Sensor(SensorError),
    Storage(StorageError),
    Board(BoardError),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {}", e),
            Self::Storage(e) => write!(f, "storage: {}", e),
            Self::Board(e) => write!(f, "board: {}", e),
        }
    }
}

impl From<SensorError> for SimError {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

impl From<StorageError> for SimError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<BoardError> for SimError {
    fn from(e: BoardError) -> Self {
        Self::Board(e)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting air-quality board simulator");

    let mut data_dir = String::from("sdcard");
    let mut force_burn_in = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--force-burn-in" => force_burn_in = true,
            _ => data_dir = arg,
        }
    }

    let mut storage = match DirStorage::new(&data_dir) {
        Ok(storage) => storage,
        Err(e) => {
            error!("Cannot use {} as the SD card: {}", data_dir, e);
            return ExitCode::FAILURE;
        }
    };
    info!("SD card directory: {}", data_dir);

    match block_on(run(&mut storage, force_burn_in)) {
        Ok(()) => {
            info!("Simulator exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Simulation failed, {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(storage: &mut DirStorage, force_burn_in: bool) -> Result<(), SimError> {
    let config = BoardConfig::load_or_default(storage);
    config.save(storage)?;

    let bus: Mutex<NoopRawMutex, SimulatedBme688> = Mutex::new(SimulatedBme688::new());
    let clock = ManualClock::new();

    let mut sensor = Bme688::init(
        SharedI2cBus::new(&bus),
        SimDelay::new(&clock),
        &clock,
        config.sensor,
    )
    .await?;
    info!(
        "Sensor up: {:.2} C, {:.1} mBar, {} %",
        sensor.read_temperature(TemperatureUnit::Celsius),
        sensor.read_pressure(PressureUnit::Millibar),
        sensor.read_humidity()
    );

    let heater = config.sensor.heater;
    sensor
        .setup_gas_sensor(heater.target_temp_c, heater.duration_ms)
        .await?;

    let mut last_percent = None;
    let baseline = sensor
        .establish_baseline(storage, force_burn_in, |progress| {
            let percent = progress.percent();
            // report in 10 % steps
            if last_percent.is_none_or(|last| percent / 10 != last / 10) {
                info!(
                    "Burn-in {}% ({}/{})",
                    percent, progress.completed, progress.total
                );
                last_percent = Some(percent);
            }
        })
        .await?;
    info!(
        "Baseline: {} ohm at {:.2} C (virtual time {} s)",
        baseline.gas_resistance,
        baseline.ambient_celsius(),
        clock.now_ms() / 1000
    );

    let mut board = Board::new(config);
    let mut leds = board.zip_leds::<_, ONBOARD_ZIP_LEDS>(RecordingStateMachine::new())?;
    let mut servo = board.servo(RecordingStateMachine::new())?;

    let mut logger = DataLogger::with_default_file(&mut *storage, config.log_separator)?;
    if logger.size()? == 0 {
        logger.write_project_info(&["Air-quality board simulator", "BME688 on virtual time"])?;
        logger.write_headings(&LOG_HEADINGS)?;
    }

    let mut pause = SimDelay::new(&clock);
    for step in 0..SAMPLE_COUNT {
        let scenario = Scenario::at(step);
        if let Ok(mut sim) = bus.try_lock() {
            sim.set_codes(scenario.codes());
        }

        let readings = match sensor.read().await {
            Ok(readings) => readings,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping reading: {}", e);
                continue;
            }
        };

        let rating = AirQualityRating::from_score(readings.iaq_score.clamp(0, 500) as u16);
        info!(
            "[{:>3} s] {:?}: IAQ {} ({}), eCO2 {} ppm, {} %",
            clock.now_ms() / 1000,
            scenario,
            readings.iaq_score,
            rating.label(),
            readings.eco2_ppm,
            readings.humidity_percent
        );

        leds.set(0, rating.colour())?;
        leds.show()?;
        servo.to_degrees(readings.iaq_score as f32 * 180.0 / 500.0)?;

        logger.log_readings(readings)?;
        pause.delay_ms(SAMPLE_INTERVAL_MS).await;
    }

    info!("Log holds {} bytes", logger.size()?);
    info!(
        "Status LED pushed {} words, servo at {} us",
        leds.tx().words().len(),
        servo.period_us()
    );

    board.release_zip_leds(leds);
    board.release_servo(servo);
    Ok(())
}
