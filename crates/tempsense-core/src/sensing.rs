//! The sense-and-report cycle.
//!
//! One cycle polls every configured sensor in configuration order, turns each
//! successful poll into a [`Reading`] and hands it to the sink immediately.
//! A sensor that cannot be read is logged and counted; the remaining sensors
//! are still polled. Nothing is carried over from one cycle to the next.

use log::{debug, info, warn};

use crate::config::Config;
use crate::reading::Reading;
use crate::report::ReportSink;
use crate::sensors::{POWER_ON_RESET_CELSIUS, TemperatureProbe};
use crate::time::Clock;

/// Outcome counts of one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub reported: usize,
    pub read_failures: usize,
    pub report_failures: usize,
    /// Readings equal to the DS18B20 power-on value, still reported
    pub power_on_values: usize,
}

impl CycleSummary {
    /// Every sensor was read and every reading accepted by the sink.
    pub const fn succeeded(&self) -> bool {
        self.reported > 0 && self.read_failures == 0 && self.report_failures == 0
    }
}

pub struct SensingModule<'a, P, S, C> {
    config: &'a Config,
    probe: P,
    sink: S,
    clock: C,
    warmed_up: bool,
}

impl<'a, P, S, C> SensingModule<'a, P, S, C>
where
    P: TemperatureProbe,
    S: ReportSink,
    C: Clock,
{
    pub fn new(config: &'a Config, probe: P, sink: S, clock: C) -> Self {
        Self {
            config,
            probe,
            sink,
            clock,
            warmed_up: !config.warm_up,
        }
    }

    /// Run one conversion per sensor and discard it.
    ///
    /// DS18B20 parts report their 85 °C power-on value until the first
    /// conversion completes.
    async fn warm_up(&mut self) {
        for sensor in &self.config.sensors {
            if let Err(e) = self.probe.read_celsius(sensor).await {
                debug!("{}: warm-up read failed: {}", sensor.id, e);
            }
        }
        self.warmed_up = true;
    }

    pub async fn run_cycle(&mut self) -> CycleSummary {
        if !self.warmed_up {
            self.warm_up().await;
        }

        let mut summary = CycleSummary::default();

        for sensor in &self.config.sensors {
            let celsius = match self.probe.read_celsius(sensor).await {
                Ok(celsius) => celsius,
                Err(e) => {
                    warn!("{}: read failed: {}", sensor.id, e);
                    summary.read_failures += 1;
                    continue;
                }
            };

            // A sensor that browned out since the last conversion reads 85 °C
            if celsius == POWER_ON_RESET_CELSIUS {
                warn!("{}: power-on value read, sensor may have lost power", sensor.id);
                summary.power_on_values += 1;
            }

            let reading =
                Reading::from_celsius(&sensor.id, celsius, self.config.unit, self.clock.now());

            match self.sink.publish(&reading).await {
                Ok(()) => {
                    info!("Reported {}", reading);
                    summary.reported += 1;
                }
                Err(e) => {
                    warn!("{}: dropping reading, report failed: {}", sensor.id, e);
                    summary.report_failures += 1;
                }
            }
        }

        info!(
            "Cycle done: {} reported, {} read failures, {} report failures",
            summary.reported, summary.read_failures, summary.report_failures
        );
        summary
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;
    use crate::reading::TemperatureUnit;
    use crate::report::ReportError;
    use crate::sensors::SensorError;
    use crate::time::Timestamp;
    use alloc::string::String;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use embassy_futures::block_on;

    /// Fixed answers per sensor id; records every request.
    struct FakeProbe {
        answers: Vec<(&'static str, Result<f32, SensorError>)>,
        requests: Vec<String>,
    }

    impl FakeProbe {
        fn new(answers: &[(&'static str, Result<f32, SensorError>)]) -> Self {
            Self {
                answers: answers.to_vec(),
                requests: Vec::new(),
            }
        }
    }

    impl TemperatureProbe for FakeProbe {
        async fn read_celsius(&mut self, sensor: &SensorConfig) -> Result<f32, SensorError> {
            self.requests.push(sensor.id.clone());
            self.answers
                .iter()
                .find(|(id, _)| *id == sensor.id)
                .map(|(_, answer)| answer.clone())
                .unwrap_or(Err(SensorError::NoBus { pin: sensor.pin }))
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        readings: Vec<Reading>,
        fail_for: Option<&'static str>,
    }

    impl ReportSink for CollectingSink {
        async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
            if self.fail_for == Some(reading.sensor.as_str()) {
                return Err(ReportError::Network("unreachable"));
            }
            self.readings.push(reading.clone());
            Ok(())
        }
    }

    /// Advances by 60 s on every call.
    struct TickingClock(Cell<i64>);

    impl Clock for TickingClock {
        fn now(&self) -> Timestamp {
            let t = self.0.get();
            self.0.set(t + 60);
            Timestamp::from_unix(t)
        }
    }

    fn config(sensors: &str, extra: &str) -> Config {
        let text = alloc::format!(
            "SENSORS = \"{sensors}\"\nREPORT_URL = \"http://collector.local/\"\nWARM_UP = false\n{extra}"
        );
        Config::from_settings(&text).unwrap()
    }

    #[test]
    fn test_reading_passes_value_through() {
        let config = config("S1,GP4", "");
        let probe = FakeProbe::new(&[("S1", Ok(21.5))]);
        let clock = TickingClock(Cell::new(1_700_000_000));
        let mut module = SensingModule::new(&config, probe, CollectingSink::default(), clock);

        let summary = block_on(module.run_cycle());

        assert!(summary.succeeded());
        assert_eq!(
            module.sink().readings,
            [Reading {
                timestamp: Timestamp::from_unix(1_700_000_000),
                sensor: "S1".into(),
                value: 21.5,
                unit: TemperatureUnit::Celsius,
            }]
        );
    }

    #[test]
    fn test_failed_sensor_does_not_stop_cycle() {
        let config = config("A,GP4;B,GP5", "");
        let probe = FakeProbe::new(&[
            ("A", Err(SensorError::NotPresent { pin: 4 })),
            ("B", Ok(19.0)),
        ]);
        let clock = TickingClock(Cell::new(0));
        let mut module = SensingModule::new(&config, probe, CollectingSink::default(), clock);

        let summary = block_on(module.run_cycle());

        assert_eq!(
            summary,
            CycleSummary {
                reported: 1,
                read_failures: 1,
                report_failures: 0,
                power_on_values: 0,
            }
        );
        assert!(!summary.succeeded());
        assert_eq!(module.sink().readings.len(), 1);
        assert_eq!(module.sink().readings[0].sensor, "B");
        assert_eq!(module.probe().requests, ["A", "B"]);
    }

    #[test]
    fn test_report_failure_is_counted_and_dropped() {
        let config = config("A,GP4;B,GP5", "");
        let probe = FakeProbe::new(&[("A", Ok(1.0)), ("B", Ok(2.0))]);
        let sink = CollectingSink {
            fail_for: Some("A"),
            ..Default::default()
        };
        let mut module = SensingModule::new(&config, probe, sink, TickingClock(Cell::new(0)));

        let summary = block_on(module.run_cycle());

        assert_eq!(summary.reported, 1);
        assert_eq!(summary.report_failures, 1);
        assert_eq!(module.sink().readings[0].sensor, "B");
    }

    #[test]
    fn test_cycles_produce_independent_readings() {
        let config = config("S1,GP4", "");
        let probe = FakeProbe::new(&[("S1", Ok(20.0))]);
        let mut module =
            SensingModule::new(&config, probe, CollectingSink::default(), TickingClock(Cell::new(0)));

        block_on(module.run_cycle());
        block_on(module.run_cycle());

        let readings = &module.sink().readings;
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].timestamp, Timestamp::from_unix(0));
        assert_eq!(readings[1].timestamp, Timestamp::from_unix(60));
    }

    #[test]
    fn test_configured_unit_is_applied() {
        let config = config("S1,GP4", "TEMPERATURE_UNIT = \"F\"");
        let probe = FakeProbe::new(&[("S1", Ok(100.0))]);
        let mut module =
            SensingModule::new(&config, probe, CollectingSink::default(), TickingClock(Cell::new(0)));

        block_on(module.run_cycle());

        let reading = &module.sink().readings[0];
        assert_eq!(reading.value, 212.0);
        assert_eq!(reading.unit, TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn test_warm_up_runs_on_first_cycle_only() {
        let config = config("A,GP4;B,GP5", "WARM_UP = true");
        let probe = FakeProbe::new(&[("A", Ok(85.0)), ("B", Err(SensorError::NotPresent { pin: 5 }))]);
        let mut module =
            SensingModule::new(&config, probe, CollectingSink::default(), TickingClock(Cell::new(0)));

        let summary = block_on(module.run_cycle());
        assert_eq!(summary.reported, 1);
        assert_eq!(summary.read_failures, 1);
        assert_eq!(summary.power_on_values, 1);
        assert_eq!(module.probe().requests, ["A", "B", "A", "B"]);

        block_on(module.run_cycle());
        assert_eq!(module.probe().requests.len(), 6);
        assert_eq!(module.sink().readings.len(), 2);
    }

    #[test]
    fn test_power_on_value_is_flagged_but_reported() {
        let config = config("A,GP4;B,GP5", "");
        let probe = FakeProbe::new(&[("A", Ok(85.0)), ("B", Ok(85.0625))]);
        let mut module =
            SensingModule::new(&config, probe, CollectingSink::default(), TickingClock(Cell::new(0)));

        let summary = block_on(module.run_cycle());

        assert_eq!(summary.power_on_values, 1);
        assert!(summary.succeeded());
        assert_eq!(module.sink().readings[0].value, 85.0);
    }
}
