//! Fan curve parameters and the curve visualisation.
//!
//! Temperatures travel in °C, fan speeds as PWM (0-255) on the wire and as
//! percentages at this API.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use super::{percent_to_pwm, publish_setting, pwm_to_percent};
use crate::constants::fan::{
    CURVE_PLOT_RANGE, FALLBACK_MAX_FAN_PWM, FALLBACK_MAX_TEMP, FALLBACK_MIN_FAN_PWM,
    FALLBACK_MIN_TEMP,
};
use crate::coordinator::Coordinator;
use crate::errors::{BridgeError, ControlError};
use crate::telemetry::{FanMode, TelemetrySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveParam {
    MinTemp,
    MaxTemp,
    MinFan,
    MaxFan,
    TargetTemp,
}

impl CurveParam {
    pub fn key(&self) -> &'static str {
        match self {
            CurveParam::MinTemp => "min_temp",
            CurveParam::MaxTemp => "max_temp",
            CurveParam::MinFan => "min_fan",
            CurveParam::MaxFan => "max_fan",
            CurveParam::TargetTemp => "target_temp",
        }
    }

    /// Accepted user-facing range (°C or %)
    pub fn range(&self) -> (i64, i64) {
        match self {
            CurveParam::MinTemp => (20, 50),
            CurveParam::MaxTemp => (30, 60),
            CurveParam::MinFan => (0, 100),
            CurveParam::MaxFan => (1, 100),
            CurveParam::TargetTemp => (20, 50),
        }
    }

    pub fn is_fan_speed(&self) -> bool {
        matches!(self, CurveParam::MinFan | CurveParam::MaxFan)
    }

    /// Whether the parameter has any effect in `mode`
    pub fn applies_to(&self, mode: FanMode) -> bool {
        match self {
            CurveParam::MinTemp | CurveParam::MaxTemp => mode == FanMode::AutoCurve,
            CurveParam::TargetTemp => mode == FanMode::TargetTemp,
            CurveParam::MinFan | CurveParam::MaxFan => {
                matches!(mode, FanMode::AutoCurve | FanMode::TargetTemp)
            }
        }
    }
}

impl FromStr for CurveParam {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            CurveParam::MinTemp,
            CurveParam::MaxTemp,
            CurveParam::MinFan,
            CurveParam::MaxFan,
            CurveParam::TargetTemp,
        ]
        .into_iter()
        .find(|param| param.key() == s)
        .ok_or_else(|| ControlError::InvalidCurve {
            reason: format!("unknown parameter '{}'", s),
        })
    }
}

fn reported(snapshot: &TelemetrySnapshot, param: CurveParam) -> Option<f64> {
    snapshot
        .get(&format!("fan_curve_{}", param.key()))
        .and_then(|v| v.as_f64())
}

/// Validate a new value against its range and the other curve bounds.
/// Returns the value to publish (PWM for fan speeds).
pub fn validate(snapshot: &TelemetrySnapshot, param: CurveParam, value: i64) -> Result<i64, ControlError> {
    let (min, max) = param.range();
    if !(min..=max).contains(&value) {
        return Err(ControlError::OutOfRange {
            field: param.key().to_string(),
            value,
            min,
            max,
        });
    }

    let mut min_temp = reported(snapshot, CurveParam::MinTemp).unwrap_or(FALLBACK_MIN_TEMP as f64);
    let mut max_temp = reported(snapshot, CurveParam::MaxTemp).unwrap_or(FALLBACK_MAX_TEMP as f64);
    let mut min_fan = pwm_to_percent(reported(snapshot, CurveParam::MinFan).unwrap_or(FALLBACK_MIN_FAN_PWM as f64)) as f64;
    let mut max_fan = pwm_to_percent(reported(snapshot, CurveParam::MaxFan).unwrap_or(FALLBACK_MAX_FAN_PWM as f64)) as f64;

    match param {
        CurveParam::MinTemp => min_temp = value as f64,
        CurveParam::MaxTemp => max_temp = value as f64,
        CurveParam::MinFan => min_fan = value as f64,
        CurveParam::MaxFan => max_fan = value as f64,
        CurveParam::TargetTemp => {}
    }

    if max_temp <= min_temp {
        return Err(ControlError::InvalidCurve {
            reason: format!(
                "max temperature ({}°C) must be greater than min temperature ({}°C)",
                max_temp, min_temp
            ),
        });
    }
    if max_fan <= min_fan {
        return Err(ControlError::InvalidCurve {
            reason: format!(
                "max fan speed ({}%) must be greater than min fan speed ({}%)",
                max_fan, min_fan
            ),
        });
    }

    Ok(if param.is_fan_speed() {
        percent_to_pwm(value as f64)
    } else {
        value
    })
}

pub async fn set_curve_param(coordinator: &Coordinator, param: CurveParam, value: i64) -> Result<i64, BridgeError> {
    let wire = validate(&coordinator.parser().snapshot(), param, value)?;
    publish_setting(
        coordinator.bus().as_ref(),
        coordinator.root(),
        &format!("fan/curve/{}", param.key()),
        &wire.to_string(),
    )
    .await?;
    info!("Fan curve {} for {} set to {}", param.key(), coordinator.entry_id(), wire);
    Ok(wire)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurvePoint {
    pub temp: i64,
    pub fan_percent: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveView {
    pub summary: String,
    pub min_temp: f64,
    pub max_temp: f64,
    pub min_fan_pwm: f64,
    pub max_fan_pwm: f64,
    pub min_fan_percent: i64,
    pub max_fan_percent: i64,
    pub points: Vec<CurvePoint>,
    /// All four bounds have been reported by the daemon
    pub complete: bool,
}

/// Linear curve between the bounds, clamped outside them
pub fn visualise(snapshot: &TelemetrySnapshot) -> CurveView {
    let min_temp = reported(snapshot, CurveParam::MinTemp);
    let max_temp = reported(snapshot, CurveParam::MaxTemp);
    let min_fan = reported(snapshot, CurveParam::MinFan);
    let max_fan = reported(snapshot, CurveParam::MaxFan);
    let complete = min_temp.is_some() && max_temp.is_some() && min_fan.is_some() && max_fan.is_some();

    let min_temp = min_temp.unwrap_or(FALLBACK_MIN_TEMP as f64);
    let max_temp = max_temp.unwrap_or(FALLBACK_MAX_TEMP as f64);
    let min_fan = min_fan.unwrap_or(FALLBACK_MIN_FAN_PWM as f64);
    let max_fan = max_fan.unwrap_or(FALLBACK_MAX_FAN_PWM as f64);
    let min_fan_percent = pwm_to_percent(min_fan);
    let max_fan_percent = pwm_to_percent(max_fan);

    let points = CURVE_PLOT_RANGE
        .map(|temp| {
            let t = temp as f64;
            let pwm = if t < min_temp {
                min_fan
            } else if t > max_temp || max_temp <= min_temp {
                max_fan
            } else {
                min_fan + (t - min_temp) * (max_fan - min_fan) / (max_temp - min_temp)
            };
            CurvePoint {
                temp,
                fan_percent: pwm_to_percent(pwm),
            }
        })
        .collect();

    CurveView {
        summary: format!(
            "{}-{}°C → {}-{}%",
            min_temp, max_temp, min_fan_percent, max_fan_percent
        ),
        min_temp,
        max_temp,
        min_fan_pwm: min_fan,
        max_fan_pwm: max_fan,
        min_fan_percent,
        max_fan_percent,
        points,
        complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryParser;
    use rstest::rstest;

    fn snapshot_with(curve: &[(&str, &str)]) -> TelemetrySnapshot {
        let parser = TelemetryParser::new("E1");
        for (param, value) in curve {
            parser.on_message(&format!("unas/E1/control/fan/curve/{}", param), value.as_bytes());
        }
        parser.snapshot()
    }

    #[rstest]
    #[case(CurveParam::MinTemp, 19)]
    #[case(CurveParam::MaxTemp, 61)]
    #[case(CurveParam::MaxFan, 0)]
    #[case(CurveParam::TargetTemp, 51)]
    fn out_of_range_values_are_rejected(#[case] param: CurveParam, #[case] value: i64) {
        assert!(matches!(
            validate(&TelemetrySnapshot::default(), param, value),
            Err(ControlError::OutOfRange { .. })
        ));
    }

    #[test]
    fn bounds_are_cross_checked_against_fallbacks() {
        let empty = TelemetrySnapshot::default();
        // Fallback max temp is 47
        assert!(matches!(
            validate(&empty, CurveParam::MinTemp, 48),
            Err(ControlError::InvalidCurve { .. })
        ));
        assert_eq!(validate(&empty, CurveParam::MinTemp, 40).unwrap(), 40);
        // Fallback max fan is 100%
        assert_eq!(validate(&empty, CurveParam::MinFan, 50).unwrap(), 128);
        assert!(validate(&empty, CurveParam::MaxFan, 80).is_err());
    }

    #[test]
    fn reported_bounds_win_over_fallbacks() {
        let snapshot = snapshot_with(&[("max_temp", "55")]);
        assert_eq!(validate(&snapshot, CurveParam::MinTemp, 50).unwrap(), 50);
    }

    #[test]
    fn curve_is_linear_and_clamped() {
        let view = visualise(&snapshot_with(&[
            ("min_temp", "40"),
            ("max_temp", "50"),
            ("min_fan", "51"),
            ("max_fan", "255"),
        ]));
        assert!(view.complete);
        assert_eq!(view.points.len(), 31);
        assert_eq!(view.points[0], CurvePoint { temp: 30, fan_percent: 20 });
        assert_eq!(view.points[15], CurvePoint { temp: 45, fan_percent: 60 });
        assert_eq!(view.points[30], CurvePoint { temp: 60, fan_percent: 100 });
        assert_eq!(view.summary, "40-50°C → 20-100%");
    }

    #[test]
    fn parameters_apply_per_mode() {
        assert!(CurveParam::MinTemp.applies_to(FanMode::AutoCurve));
        assert!(!CurveParam::MinTemp.applies_to(FanMode::TargetTemp));
        assert!(CurveParam::MaxFan.applies_to(FanMode::TargetTemp));
        assert!(!CurveParam::TargetTemp.applies_to(FanMode::FixedSpeed(10)));
        assert_eq!("max_fan".parse::<CurveParam>().unwrap(), CurveParam::MaxFan);
    }
}
