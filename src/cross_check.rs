use crate::station::Measurement;

/// Largest tolerated difference between the primary and reference sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub temperature: f32,
    pub humidity: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            temperature: 2.0,
            humidity: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub temperature_delta: f32,
    pub humidity_delta: f32,
    pub temperature_alert: bool,
    pub humidity_alert: bool,
}

impl Comparison {
    pub fn between(primary: &Measurement, reference: &Measurement, thresholds: Thresholds) -> Self {
        let temperature_delta = (primary.temperature.0 - reference.temperature.0).abs();
        let humidity_delta = (primary.humidity.0 - reference.humidity.0).abs();

        Comparison {
            temperature_delta,
            humidity_delta,
            temperature_alert: temperature_delta > thresholds.temperature,
            humidity_alert: humidity_delta > thresholds.humidity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::{Humidity, Temperature};

    use assert_float_eq::*;

    fn measurement(t: f32, h: f32) -> Measurement {
        Measurement::new(Temperature(t), Humidity(h)).unwrap()
    }

    #[test]
    fn close_readings_raise_no_alert() {
        let c = Comparison::between(
            &measurement(21.5, 47.3),
            &measurement(21.9, 45.0),
            Thresholds::default(),
        );

        assert_float_absolute_eq!(c.temperature_delta, 0.4, 0.001);
        assert_float_absolute_eq!(c.humidity_delta, 2.3, 0.001);
        assert!(!c.temperature_alert);
        assert!(!c.humidity_alert);
    }

    #[test]
    fn deltas_are_absolute() {
        let c = Comparison::between(
            &measurement(18.0, 40.0),
            &measurement(21.0, 50.0),
            Thresholds::default(),
        );

        assert_float_absolute_eq!(c.temperature_delta, 3.0, 0.001);
        assert_float_absolute_eq!(c.humidity_delta, 10.0, 0.001);
        assert!(c.temperature_alert);
        assert!(c.humidity_alert);
    }

    #[test]
    fn threshold_itself_is_tolerated() {
        let c = Comparison::between(
            &measurement(20.0, 40.0),
            &measurement(20.0, 45.0),
            Thresholds::default(),
        );

        assert!(!c.humidity_alert);
    }
}
