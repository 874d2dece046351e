//! BME688 environmental sensor
//!
//! Temperature, pressure, humidity and heated-plate gas resistance over I2C,
//! plus the air-quality model built on top of them.
//!
//! Every acquisition runs the same pipeline: a forced-mode measurement is
//! triggered, the status register is polled until new data is flagged, the
//! raw codes are read back in one burst and compensated with the part's own
//! calibration constants. Air-quality figures are derived on demand from the
//! latest compensated reading and the learned [`Baseline`].

pub mod air_quality;
pub mod baseline;
pub mod calibration;
pub mod compensation;
pub mod registers;

pub use air_quality::AirQualityResult;
pub use baseline::{Baseline, BurnInProgress, BurnInState, CancelToken};
pub use calibration::CalibrationConstants;
pub use compensation::CompensatedReading;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, error, info, warn};

use self::baseline::BurnIn;
use self::registers::*;
use super::{Sensor, SensorError, SensorReadings};
use crate::clock::Clock;
use crate::config::{Bme688Config, HeaterProfile};
use crate::storage::{FileStorage, StorageError};

const SENSOR: &str = "BME688";

/// Humidity and tick of the acquisition before the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousSample {
    pub timestamp_ms: u64,
    pub humidity_percent: i32,
}

/// Raw codes of one acquisition, with the previous acquisition carried
/// alongside for breath detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub codes: RawCodes,
    pub timestamp_ms: u64,
    pub previous: Option<PreviousSample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressureUnit {
    #[default]
    Pascal,
    Millibar,
}

/// Typed readings from the BME688.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bme688Readings {
    pub temperature_centi: i32,
    pub pressure_pa: i32,
    pub humidity_percent: i32,
    pub gas_resistance_ohms: i32,
    pub iaq_score: i32,
    pub eco2_ppm: i32,
}

impl SensorReadings<6> for Bme688Readings {
    fn to_array(self) -> [i32; 6] {
        [
            self.temperature_centi,
            self.pressure_pa,
            self.humidity_percent,
            self.gas_resistance_ohms,
            self.iaq_score,
            self.eco2_ppm,
        ]
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(operation: &'static str) -> impl FnOnce(E) -> SensorError {
    move |e| {
        error!("{} {} failed: {:?}", SENSOR, operation, e);
        SensorError::DeviceCommunication {
            sensor: SENSOR,
            operation,
            kind: e.kind(),
        }
    }
}

pub struct Bme688<I, D, C> {
    i2c: I,
    delay: D,
    clock: C,
    config: Bme688Config,
    calibration: CalibrationConstants,
    sample: RawSample,
    latest: CompensatedReading,
    has_reading: bool,
    gas_configured: bool,
    baseline: Option<Baseline>,
    burn_in: BurnInState,
}

impl<I, D, C> Bme688<I, D, C>
where
    I: I2c,
    D: DelayNs,
    C: Clock,
{
    /// Brings the sensor up: waits for the chip id, soft-resets, loads the
    /// calibration constants, applies oversampling and filter settings and
    /// takes a first measurement. The gas heater is left unconfigured.
    pub async fn init(i2c: I, delay: D, clock: C, config: Bme688Config) -> Result<Self, SensorError> {
        let mut sensor = Self {
            i2c,
            delay,
            clock,
            config,
            calibration: CalibrationConstants::default(),
            sample: RawSample::default(),
            latest: CompensatedReading::default(),
            has_reading: false,
            gas_configured: false,
            baseline: None,
            burn_in: BurnInState::NotStarted,
        };

        sensor.wait_for_chip_id().await?;

        sensor
            .write_register(REG_RESET, SOFT_RESET_CMD, "soft reset")
            .await?;
        sensor.delay.delay_ms(sensor.config.reset_settle_ms).await;

        sensor.calibration = sensor.read_calibration().await?;
        debug!("{} calibration: {:?}", SENSOR, sensor.calibration);

        sensor.configure().await?;
        sensor.measure().await?;

        info!(
            "{} initialized at {:#04x}: {} centi-C, {} Pa, {} %",
            SENSOR,
            sensor.config.address,
            sensor.latest.temperature_centi,
            sensor.latest.pressure_pa,
            sensor.latest.humidity_percent
        );
        Ok(sensor)
    }

    async fn wait_for_chip_id(&mut self) -> Result<(), SensorError> {
        let attempts = self.config.chip_id_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.read_register(REG_CHIP_ID, "read chip id").await {
                Ok(CHIP_ID) => {
                    debug!("{} answered on attempt {}", SENSOR, attempt);
                    return Ok(());
                }
                Ok(found) => {
                    warn!("{} chip id {:#04x} on attempt {}", SENSOR, found, attempt);
                    last_error = Some(SensorError::ChipIdMismatch {
                        sensor: SENSOR,
                        expected: CHIP_ID,
                        found,
                    });
                }
                Err(e) => last_error = Some(e),
            }
            if attempt < attempts {
                self.delay.delay_ms(self.config.chip_id_retry_ms).await;
            }
        }

        let e = last_error.unwrap_or(SensorError::AcquisitionTimeout {
            sensor: SENSOR,
            operation: "identify chip",
            attempts: attempts as u32,
        });
        error!("{} did not identify: {}", SENSOR, e);
        Err(e)
    }

    async fn read_calibration(&mut self) -> Result<CalibrationConstants, SensorError> {
        let mut block_a = [0u8; CALIB_A_LEN];
        let mut block_b = [0u8; CALIB_B_LEN];
        self.read_block(REG_CALIB_A, &mut block_a, "read calibration").await?;
        self.read_block(REG_CALIB_B, &mut block_b, "read calibration").await?;
        let res_heat_val = self.read_register(REG_RES_HEAT_VAL, "read calibration").await?;
        let res_heat_range = self
            .read_register(REG_RES_HEAT_RANGE, "read calibration")
            .await?;

        Ok(CalibrationConstants::from_registers(
            &block_a,
            &block_b,
            res_heat_val,
            res_heat_range,
        ))
    }

    async fn configure(&mut self) -> Result<(), SensorError> {
        let config = self.config;
        let operation = "configure";

        self.write_register(REG_CTRL_MEAS, MODE_SLEEP, operation).await?;
        self.write_register(REG_CTRL_HUM, config.humidity_oversampling.bits(), operation)
            .await?;
        let ctrl_meas = (config.temperature_oversampling.bits() << 5)
            | (config.pressure_oversampling.bits() << 2);
        self.write_register(REG_CTRL_MEAS, ctrl_meas, operation).await?;
        self.write_register(REG_CONFIG, config.filter.bits() << 2, operation)
            .await?;
        self.write_register(REG_CTRL_GAS_1, RUN_GAS, operation).await?;
        Ok(())
    }

    /// Runs one acquisition and compensation cycle and caches the result.
    ///
    /// A measurement that never flags new data is retried
    /// `acquisition_retries` times before [`SensorError::AcquisitionTimeout`]
    /// is returned.
    pub async fn measure(&mut self) -> Result<CompensatedReading, SensorError> {
        let attempts = self.config.acquisition_retries.max(1) as u32;

        for attempt in 1..=attempts {
            if let Some(codes) = self.acquire().await? {
                let sample = RawSample {
                    codes,
                    timestamp_ms: self.clock.now_ms(),
                    previous: self.has_reading.then_some(PreviousSample {
                        timestamp_ms: self.latest.timestamp_ms,
                        humidity_percent: self.latest.humidity_percent,
                    }),
                };
                let reading = compensation::compensate(&sample, &self.calibration);

                self.sample = sample;
                self.latest = reading;
                self.has_reading = true;
                return Ok(reading);
            }
            warn!(
                "{} measurement {}/{} timed out, retrying",
                SENSOR, attempt, attempts
            );
        }

        error!("{} no new data after {} attempts", SENSOR, attempts);
        Err(SensorError::AcquisitionTimeout {
            sensor: SENSOR,
            operation: "wait for new data",
            attempts,
        })
    }

    /// Triggers one forced measurement and reads the raw codes back, or
    /// `None` if the new-data flag never came up.
    async fn acquire(&mut self) -> Result<Option<RawCodes>, SensorError> {
        // Keep the oversampling bits, only switch the mode
        let ctrl_meas = self.read_register(REG_CTRL_MEAS, "read ctrl_meas").await?;
        self.write_register(REG_CTRL_MEAS, (ctrl_meas & !0x03) | MODE_FORCED, "start measurement")
            .await?;

        for _ in 0..self.config.status_polls() {
            let status = self
                .read_register(REG_MEAS_STATUS_0, "read measurement status")
                .await?;
            if status & NEW_DATA != 0 {
                let mut field = [0u8; FIELD_0_LEN];
                self.read_block(REG_FIELD_0, &mut field, "read data").await?;
                return Ok(Some(RawCodes::from_field(&field)));
            }
            self.delay.delay_ms(self.config.status_poll_interval_ms).await;
        }
        Ok(None)
    }

    /// Programs heater step 0 for gas measurements.
    ///
    /// `target_temp_c` is clamped to 200..=400 °C and `heat_duration_ms` to
    /// 0..=4032 ms. The heater code depends on the ambient temperature: the
    /// baseline's if one is known, otherwise the latest reading's.
    pub async fn setup_gas_sensor(
        &mut self,
        target_temp_c: u16,
        heat_duration_ms: u16,
    ) -> Result<(), SensorError> {
        let target = target_temp_c.clamp(
            compensation::HEATER_TEMP_MIN_C,
            compensation::HEATER_TEMP_MAX_C,
        );
        let duration = heat_duration_ms.min(compensation::HEATER_DURATION_MAX_MS);
        let ambient_centi = match self.baseline {
            Some(baseline) => baseline.ambient_temperature as i32,
            None => self.latest.temperature_centi,
        };

        let heater_code = compensation::heater_resistance_code(ambient_centi, target, &self.calibration);
        let wait_code = compensation::heater_duration_code(duration);
        self.write_register(REG_RES_HEAT_0, heater_code, "set heater temperature")
            .await?;
        self.write_register(REG_GAS_WAIT_0, wait_code, "set heater duration")
            .await?;

        // Select heater step 0, keeping gas conversions enabled
        let gas_enable = self.read_register(REG_CTRL_GAS_1, "read ctrl_gas_1").await? & RUN_GAS;
        self.write_register(REG_CTRL_GAS_1, gas_enable, "select heater step").await?;

        self.gas_configured = true;
        info!(
            "{} gas heater set to {} C for {} ms (res_heat {:#04x}, gas_wait {:#04x})",
            SENSOR, target, duration, heater_code, wait_code
        );
        Ok(())
    }

    /// Loads the persisted baseline, or learns a new one by burn-in when
    /// there is none, it cannot be read or `forced` is set.
    ///
    /// `progress` is called before the first sample and after every sample.
    /// A learned baseline is persisted; failing to persist it is logged but
    /// does not fail the call.
    pub async fn establish_baseline<S, F>(
        &mut self,
        storage: &mut S,
        forced: bool,
        progress: F,
    ) -> Result<Baseline, SensorError>
    where
        S: FileStorage,
        F: FnMut(BurnInProgress),
    {
        let never = CancelToken::new();
        self.establish_baseline_cancellable(storage, forced, progress, &never)
            .await
    }

    /// [`Self::establish_baseline`] that stops before the next sample once
    /// `cancel` is set. A cancelled burn-in leaves no baseline behind.
    pub async fn establish_baseline_cancellable<S, F>(
        &mut self,
        storage: &mut S,
        forced: bool,
        mut progress: F,
        cancel: &CancelToken,
    ) -> Result<Baseline, SensorError>
    where
        S: FileStorage,
        F: FnMut(BurnInProgress),
    {
        if !self.gas_configured {
            let HeaterProfile {
                target_temp_c,
                duration_ms,
            } = self.config.heater;
            self.setup_gas_sensor(target_temp_c, duration_ms).await?;
        }

        if forced {
            info!("{} baseline burn-in forced", SENSOR);
        } else {
            match Baseline::load(storage) {
                Ok(baseline) => {
                    info!(
                        "{} baseline loaded: {} ohm, {} centi-C",
                        SENSOR, baseline.gas_resistance, baseline.ambient_temperature
                    );
                    self.baseline = Some(baseline);
                    self.burn_in = BurnInState::Complete;
                    return Ok(baseline);
                }
                Err(StorageError::NotFound { .. }) => {
                    info!("{} no stored baseline, starting burn-in", SENSOR);
                }
                Err(e) => warn!("{} stored baseline unusable ({}), starting burn-in", SENSOR, e),
            }
        }

        self.baseline = None;
        let mut burn_in = BurnIn::new(self.config.burn_in.samples);
        self.burn_in = BurnInState::Sampling(burn_in.progress());
        progress(burn_in.progress());

        let baseline = loop {
            if cancel.is_cancelled() {
                let completed = burn_in.progress().completed;
                warn!("{} burn-in cancelled after {} samples", SENSOR, completed);
                self.burn_in = BurnInState::NotStarted;
                return Err(SensorError::BurnInCancelled {
                    sensor: SENSOR,
                    completed,
                });
            }

            let reading = match self.measure().await {
                Ok(reading) => reading,
                Err(e) => {
                    self.burn_in = BurnInState::NotStarted;
                    return Err(e);
                }
            };
            let learned = burn_in.push(&reading);
            self.burn_in = BurnInState::Sampling(burn_in.progress());
            progress(burn_in.progress());

            match learned {
                Some(baseline) => break baseline,
                None => self.delay.delay_ms(self.config.burn_in.interval_ms).await,
            }
        };

        info!(
            "{} baseline learned: {} ohm, {} centi-C",
            SENSOR, baseline.gas_resistance, baseline.ambient_temperature
        );
        if let Err(e) = baseline.persist(storage) {
            error!("{} failed to persist baseline: {}", SENSOR, e);
        }

        self.baseline = Some(baseline);
        self.burn_in = BurnInState::Complete;
        Ok(baseline)
    }

    /// Installs a baseline obtained elsewhere.
    pub fn set_baseline(&mut self, baseline: Baseline) {
        self.baseline = Some(baseline);
        self.burn_in = BurnInState::Complete;
    }

    pub fn read_temperature(&self, unit: TemperatureUnit) -> f32 {
        let celsius = self.latest.temperature_celsius();
        match unit {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => ((celsius * 18.0) + 320.0) / 10.0,
        }
    }

    pub fn read_pressure(&self, unit: PressureUnit) -> f32 {
        let pascal = self.latest.pressure_pa as f32;
        match unit {
            PressureUnit::Pascal => pascal,
            PressureUnit::Millibar => pascal / 100.0,
        }
    }

    pub fn read_humidity(&self) -> i32 {
        self.latest.humidity_percent
    }

    pub fn read_gas_resistance(&self) -> Result<u32, SensorError> {
        self.require_gas()?;
        Ok(self.latest.gas_resistance_ohms)
    }

    /// Scores the latest reading. Recomputed on every call.
    pub fn air_quality(&self) -> Result<AirQualityResult, SensorError> {
        self.require_gas()?;
        let baseline = self
            .baseline
            .ok_or(SensorError::BaselineUnavailable { sensor: SENSOR })?;
        Ok(air_quality::score(&self.latest, &baseline, self.sample.previous))
    }

    pub fn read_estimated_co2(&self) -> Result<u32, SensorError> {
        self.air_quality().map(|result| result.eco2_ppm)
    }

    pub fn air_quality_percent(&self) -> Result<u8, SensorError> {
        self.air_quality().map(|result| result.iaq_percent)
    }

    pub fn air_quality_score(&self) -> Result<u16, SensorError> {
        self.air_quality().map(|result| result.iaq_score)
    }

    pub fn latest_reading(&self) -> &CompensatedReading {
        &self.latest
    }

    pub fn latest_sample(&self) -> &RawSample {
        &self.sample
    }

    pub fn calibration(&self) -> &CalibrationConstants {
        &self.calibration
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    pub fn burn_in_state(&self) -> BurnInState {
        self.burn_in
    }

    pub fn is_gas_configured(&self) -> bool {
        self.gas_configured
    }

    pub fn config(&self) -> &Bme688Config {
        &self.config
    }

    /// Gives the bus, delay and clock back.
    pub fn release(self) -> (I, D, C) {
        (self.i2c, self.delay, self.clock)
    }

    fn require_gas(&self) -> Result<(), SensorError> {
        if self.gas_configured {
            Ok(())
        } else {
            Err(SensorError::GasSensorNotConfigured { sensor: SENSOR })
        }
    }

    async fn read_register(&mut self, reg: u8, operation: &'static str) -> Result<u8, SensorError> {
        let mut value = [0u8];
        self.read_block(reg, &mut value, operation).await?;
        Ok(value[0])
    }

    async fn read_block(
        &mut self,
        reg: u8,
        buffer: &mut [u8],
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c
            .write_read(self.config.address, &[reg], buffer)
            .await
            .map_err(bus_error(operation))
    }

    async fn write_register(
        &mut self,
        reg: u8,
        value: u8,
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c
            .write(self.config.address, &[reg, value])
            .await
            .map_err(bus_error(operation))
    }
}

impl<I, D, C> Sensor<6> for Bme688<I, D, C>
where
    I: I2c,
    D: DelayNs,
    C: Clock,
{
    type Readings = Bme688Readings;

    /// Measures and scores in one go. Needs the gas heater configured and a
    /// baseline in place.
    async fn read(&mut self) -> Result<Bme688Readings, SensorError> {
        self.require_gas()?;
        let reading = self.measure().await?;
        let quality = self.air_quality()?;

        Ok(Bme688Readings {
            temperature_centi: reading.temperature_centi,
            pressure_pa: reading.pressure_pa,
            humidity_percent: reading.humidity_percent,
            gas_resistance_ohms: reading.gas_resistance_ohms.min(i32::MAX as u32) as i32,
            iaq_score: quality.iaq_score as i32,
            eco2_ppm: quality.eco2_ppm.min(i32::MAX as u32) as i32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_i2c_bus::SharedI2cBus;
    use crate::sim::{ManualClock, REFERENCE_CODES, SimDelay, SimulatedBme688};
    use crate::storage::{BASELINE_FILE, MemoryStorage};
    use alloc::vec;
    use alloc::vec::Vec;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_sync::mutex::Mutex;
    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    type SimBus = Mutex<NoopRawMutex, SimulatedBme688>;
    type SimSensor<'a> = Bme688<SharedI2cBus<'a, NoopRawMutex, SimulatedBme688>, SimDelay<'a>, &'a ManualClock>;

    fn sensor<'a>(bus: &'a SimBus, clock: &'a ManualClock, config: Bme688Config) -> SimSensor<'a> {
        block_on(Bme688::init(
            SharedI2cBus::new(bus),
            SimDelay::new(clock),
            clock,
            config,
        ))
        .unwrap()
    }

    fn with_sim<R>(bus: &SimBus, f: impl FnOnce(&mut SimulatedBme688) -> R) -> R {
        let mut sim = bus.try_lock().unwrap();
        f(&mut sim)
    }

    #[test]
    fn test_init_configures_device() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let sensor = sensor(&bus, &clock, Bme688Config::default());

        assert_eq!(*sensor.calibration(), crate::sim::reference_calibration());
        assert!(!sensor.is_gas_configured());
        with_sim(&bus, |sim| {
            assert_eq!(sim.register(REG_CTRL_HUM), 0x02);
            assert_eq!(sim.register(REG_CTRL_MEAS), (0x02 << 5) | (0x05 << 2));
            assert_eq!(sim.register(REG_CONFIG), 0x02 << 2);
            assert_eq!(sim.register(REG_CTRL_GAS_1), RUN_GAS);
            // initial measurement
            assert_eq!(sim.measurement_count(), 1);
        });
        assert_eq!(sensor.latest_reading().temperature_centi, 2643);
    }

    #[test]
    fn test_measure_compensates_latest_codes() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let mut sensor = sensor(&bus, &clock, Bme688Config::default());

        with_sim(&bus, |sim| {
            sim.set_codes(RawCodes {
                humidity: 21_500,
                ..REFERENCE_CODES
            })
        });
        let start = clock.now_ms();
        clock.advance_ms(1000);
        let reading = block_on(sensor.measure()).unwrap();

        assert_eq!(reading.temperature_centi, 2643);
        assert_eq!(reading.pressure_pa, 101_364);
        assert_eq!(reading.humidity_percent, 44);
        assert_eq!(reading.gas_resistance_ohms, 939_400);
        assert_eq!(reading.timestamp_ms, start + 1000);

        let previous = sensor.latest_sample().previous.unwrap();
        assert_eq!(previous.humidity_percent, 40);
        assert_eq!(previous.timestamp_ms, start);
    }

    #[test]
    fn test_unit_conversions() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let sensor = sensor(&bus, &clock, Bme688Config::default());

        assert!((sensor.read_temperature(TemperatureUnit::Celsius) - 26.43).abs() < 1e-4);
        assert!((sensor.read_temperature(TemperatureUnit::Fahrenheit) - 79.574).abs() < 1e-3);
        assert_eq!(sensor.read_pressure(PressureUnit::Pascal), 101_364.0);
        assert!((sensor.read_pressure(PressureUnit::Millibar) - 1013.64).abs() < 1e-3);
        assert_eq!(sensor.read_humidity(), 40);
    }

    #[test]
    fn test_gas_reads_need_setup() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let mut sensor = sensor(&bus, &clock, Bme688Config::default());

        let not_configured = SensorError::GasSensorNotConfigured { sensor: "BME688" };
        assert_eq!(sensor.read_gas_resistance(), Err(not_configured));
        assert_eq!(sensor.read_estimated_co2(), Err(not_configured));
        assert_eq!(sensor.air_quality_percent(), Err(not_configured));
        assert_eq!(sensor.air_quality_score(), Err(not_configured));
        assert_eq!(block_on(sensor.read()), Err(not_configured));

        block_on(sensor.setup_gas_sensor(300, 180)).unwrap();
        assert_eq!(sensor.read_gas_resistance(), Ok(939_400));
        assert_eq!(
            sensor.read_estimated_co2(),
            Err(SensorError::BaselineUnavailable { sensor: "BME688" })
        );
    }

    #[test]
    fn test_setup_gas_sensor_programs_heater() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let mut sensor = sensor(&bus, &clock, Bme688Config::default());

        block_on(sensor.setup_gas_sensor(300, 180)).unwrap();
        with_sim(&bus, |sim| {
            assert_eq!(sim.register(REG_RES_HEAT_0), 116);
            assert_eq!(sim.register(REG_GAS_WAIT_0), 109);
            assert_eq!(sim.register(REG_CTRL_GAS_1), RUN_GAS);
        });

        // Out-of-range requests are clamped
        block_on(sensor.setup_gas_sensor(450, 5000)).unwrap();
        with_sim(&bus, |sim| {
            assert_eq!(
                sim.register(REG_RES_HEAT_0),
                compensation::heater_resistance_code(2643, 400, &crate::sim::reference_calibration())
            );
            assert_eq!(sim.register(REG_GAS_WAIT_0), 0xFF);
        });
    }

    #[test]
    fn test_burn_in_learns_and_persists_baseline() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let mut sensor = sensor(&bus, &clock, Bme688Config::default());
        let mut storage = MemoryStorage::new();
        let mut reports = Vec::new();
        let start = clock.now_ms();

        let baseline = block_on(sensor.establish_baseline(&mut storage, false, |p| reports.push(p)))
            .unwrap();

        assert_eq!(baseline.gas_resistance, 939_400.0);
        assert_eq!(baseline.ambient_temperature, 2643.0);
        assert_eq!(sensor.burn_in_state(), BurnInState::Complete);
        assert!(sensor.is_gas_configured());
        assert_eq!(with_sim(&bus, |sim| sim.measurement_count()), 61);

        assert_eq!(reports.len(), 61);
        assert_eq!(reports[0].percent(), 0);
        assert_eq!(reports[30].percent(), 50);
        assert_eq!(reports[60].percent(), 100);
        // 59 gaps of 5 s between 60 samples
        assert_eq!(clock.now_ms() - start, 59 * 5000);

        assert_eq!(
            storage.contents(BASELINE_FILE),
            Some(&b"939400\r\n2643\r\n"[..])
        );
    }

    #[test]
    fn test_persisted_baseline_skips_burn_in() {
        let mut storage = MemoryStorage::new();
        let clock = ManualClock::new();

        let first_bus = Mutex::new(SimulatedBme688::new());
        let mut first = sensor(&first_bus, &clock, Bme688Config::default());
        let learned = block_on(first.establish_baseline(&mut storage, false, |_| {})).unwrap();

        let second_bus = Mutex::new(SimulatedBme688::new());
        let mut second = sensor(&second_bus, &clock, Bme688Config::default());
        let loaded = block_on(second.establish_baseline(&mut storage, false, |_| {})).unwrap();

        assert_eq!(loaded, learned);
        assert_eq!(second.baseline(), Some(learned));
        // Only the initial measurement ran on the second part
        assert_eq!(with_sim(&second_bus, |sim| sim.measurement_count()), 1);
    }

    #[test]
    fn test_forced_burn_in_replaces_baseline() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let config = Bme688Config {
            burn_in: crate::config::BurnInConfig {
                samples: 4,
                interval_ms: 1000,
            },
            ..Default::default()
        };
        let mut sensor = sensor(&bus, &clock, config);
        let mut storage = MemoryStorage::new();
        storage.write(BASELINE_FILE, b"100000\r\n2500\r\n").unwrap();

        let loaded = block_on(sensor.establish_baseline(&mut storage, false, |_| {})).unwrap();
        assert_eq!(loaded.gas_resistance, 100_000.0);

        let relearned = block_on(sensor.establish_baseline(&mut storage, true, |_| {})).unwrap();
        assert_eq!(relearned.gas_resistance, 939_400.0);
        assert_eq!(Baseline::load(&mut storage).unwrap(), relearned);
    }

    #[test]
    fn test_corrupt_baseline_triggers_burn_in() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let config = Bme688Config {
            burn_in: crate::config::BurnInConfig {
                samples: 2,
                interval_ms: 10,
            },
            ..Default::default()
        };
        let mut sensor = sensor(&bus, &clock, config);
        let mut storage = MemoryStorage::new();
        storage.write(BASELINE_FILE, b"not a number\r\n").unwrap();

        let baseline = block_on(sensor.establish_baseline(&mut storage, false, |_| {})).unwrap();
        assert_eq!(baseline.gas_resistance, 939_400.0);
        assert_eq!(with_sim(&bus, |sim| sim.measurement_count()), 3);
    }

    #[test]
    fn test_cancelled_burn_in() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let mut sensor = sensor(&bus, &clock, Bme688Config::default());
        let mut storage = MemoryStorage::new();
        let cancel = CancelToken::new();

        let result = block_on(sensor.establish_baseline_cancellable(
            &mut storage,
            false,
            |p| {
                if p.completed == 5 {
                    cancel.cancel();
                }
            },
            &cancel,
        ));

        assert_eq!(
            result,
            Err(SensorError::BurnInCancelled {
                sensor: "BME688",
                completed: 5
            })
        );
        assert_eq!(sensor.baseline(), None);
        assert_eq!(sensor.burn_in_state(), BurnInState::NotStarted);
        assert!(!storage.exists(BASELINE_FILE));
    }

    #[test]
    fn test_breath_detection_through_driver() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let mut sensor = sensor(&bus, &clock, Bme688Config::default());
        block_on(sensor.setup_gas_sensor(300, 180)).unwrap();
        sensor.set_baseline(Baseline {
            gas_resistance: 939_400.0,
            ambient_temperature: 2643.0,
        });

        // 40 % at t=10 s, then 44 % three seconds later
        clock.advance_ms(10_000);
        block_on(sensor.measure()).unwrap();
        with_sim(&bus, |sim| {
            sim.set_codes(RawCodes {
                humidity: 21_500,
                ..REFERENCE_CODES
            })
        });
        clock.advance_ms(3000);
        block_on(sensor.measure()).unwrap();
        assert_eq!(sensor.read_estimated_co2(), Ok(1918));
        assert_eq!(sensor.air_quality_percent(), Ok(93));
        assert_eq!(sensor.air_quality_score(), Ok(35));

        // Same rise over six seconds is not a breath
        with_sim(&bus, |sim| sim.set_codes(REFERENCE_CODES));
        clock.advance_ms(6000);
        block_on(sensor.measure()).unwrap();
        with_sim(&bus, |sim| {
            sim.set_codes(RawCodes {
                humidity: 21_500,
                ..REFERENCE_CODES
            })
        });
        clock.advance_ms(6000);
        block_on(sensor.measure()).unwrap();
        assert_eq!(sensor.read_estimated_co2(), Ok(418));
    }

    #[test]
    fn test_sensor_trait_readings() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let mut sensor = sensor(&bus, &clock, Bme688Config::default());
        block_on(sensor.setup_gas_sensor(300, 180)).unwrap();
        sensor.set_baseline(Baseline {
            gas_resistance: 939_400.0,
            ambient_temperature: 2643.0,
        });

        let readings = block_on(sensor.read()).unwrap();
        assert_eq!(readings.to_array(), [2643, 101_364, 40, 939_400, 25, 337]);
    }

    #[test]
    fn test_acquisition_timeout_after_retries() {
        let bus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let mut sensor = sensor(&bus, &clock, Bme688Config::default());

        with_sim(&bus, |sim| sim.set_never_ready(true));
        let start = clock.now_ms();
        let result = block_on(sensor.measure());

        assert_eq!(
            result,
            Err(SensorError::AcquisitionTimeout {
                sensor: "BME688",
                operation: "wait for new data",
                attempts: 3
            })
        );
        assert!(!result.unwrap_err().is_fatal());
        // Three attempts of 500 polls, 10 ms apart
        assert_eq!(clock.now_ms() - start, 3 * 5000);
        // The last good reading is kept
        assert_eq!(sensor.latest_reading().temperature_centi, 2643);
    }

    #[test]
    fn test_wrong_chip_id_is_fatal() {
        let mut sim = SimulatedBme688::new();
        sim.set_chip_id(0x60);
        let bus: SimBus = Mutex::new(sim);
        let clock = ManualClock::new();
        let config = Bme688Config {
            chip_id_attempts: 4,
            ..Default::default()
        };

        let result = block_on(Bme688::init(
            SharedI2cBus::new(&bus),
            SimDelay::new(&clock),
            &clock,
            config,
        ));
        let e = result.err().unwrap();
        assert_eq!(
            e,
            SensorError::ChipIdMismatch {
                sensor: "BME688",
                expected: 0x61,
                found: 0x60
            }
        );
        assert!(e.is_fatal());
        // Three waits between four attempts
        assert_eq!(clock.now_ms(), 3 * 100);
    }

    #[test]
    fn test_absent_device_is_fatal() {
        let bus: SimBus = Mutex::new(SimulatedBme688::new());
        let clock = ManualClock::new();
        let config = Bme688Config {
            address: 0x76,
            chip_id_attempts: 2,
            ..Default::default()
        };

        let result = block_on(Bme688::init(
            SharedI2cBus::new(&bus),
            SimDelay::new(&clock),
            &clock,
            config,
        ));
        assert_eq!(
            result.err(),
            Some(SensorError::DeviceCommunication {
                sensor: "BME688",
                operation: "read chip id",
                kind: ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            })
        );
    }

    #[test]
    fn test_bus_error_during_reset() {
        let expectations = [
            Transaction::write_read(0x77, vec![REG_CHIP_ID], vec![CHIP_ID]),
            Transaction::write(0x77, vec![REG_RESET, SOFT_RESET_CMD]).with_error(ErrorKind::Bus),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let clock = ManualClock::new();

        let result = block_on(Bme688::init(
            &mut i2c,
            SimDelay::new(&clock),
            &clock,
            Bme688Config::default(),
        ));
        assert_eq!(
            result.err(),
            Some(SensorError::DeviceCommunication {
                sensor: "BME688",
                operation: "soft reset",
                kind: ErrorKind::Bus,
            })
        );
        i2c.done();
    }

    #[test]
    fn test_chip_id_found_on_later_attempt() {
        let expectations = [
            Transaction::write_read(0x77, vec![REG_CHIP_ID], vec![0x00])
                .with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
            Transaction::write_read(0x77, vec![REG_CHIP_ID], vec![CHIP_ID]),
            Transaction::write(0x77, vec![REG_RESET, SOFT_RESET_CMD]).with_error(ErrorKind::Other),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let clock = ManualClock::new();

        let result = block_on(Bme688::init(
            &mut i2c,
            SimDelay::new(&clock),
            &clock,
            Bme688Config::default(),
        ));
        // Got past identification on the second read
        assert!(matches!(
            result.err(),
            Some(SensorError::DeviceCommunication {
                operation: "soft reset",
                ..
            })
        ));
        assert_eq!(clock.now_ms(), 100);
        i2c.done();
    }
}
