use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use super::{percent_to_pwm, publish_setting};
use crate::best_effort::{best_effort, Severity};
use crate::constants::fan::DEFAULT_FIXED_PWM;
use crate::coordinator::Coordinator;
use crate::errors::{BridgeError, ControlError};
use crate::ssh::operations;
use crate::telemetry::FanMode;

/// Fan policy choices offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "pwm", rename_all = "snake_case")]
pub enum FanSelection {
    Managed,
    CustomCurve,
    TargetTemp,
    /// Fixed PWM; `None` keeps the current fan speed
    SetSpeed(Option<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempMetric {
    Max,
    Avg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSpeed {
    Relaxed,
    Balanced,
    Aggressive,
}

impl TempMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            TempMetric::Max => "max",
            TempMetric::Avg => "avg",
        }
    }
}

impl ResponseSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSpeed::Relaxed => "relaxed",
            ResponseSpeed::Balanced => "balanced",
            ResponseSpeed::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for TempMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ResponseSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TempMetric {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(TempMetric::Max),
            "avg" => Ok(TempMetric::Avg),
            other => Err(ControlError::Rejected {
                action: "set temperature metric".to_string(),
                reason: format!("unknown metric '{}'", other),
            }),
        }
    }
}

impl FromStr for ResponseSpeed {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relaxed" => Ok(ResponseSpeed::Relaxed),
            "balanced" => Ok(ResponseSpeed::Balanced),
            "aggressive" => Ok(ResponseSpeed::Aggressive),
            other => Err(ControlError::Rejected {
                action: "set response speed".to_string(),
                reason: format!("unknown response speed '{}'", other),
            }),
        }
    }
}

/// Fan controls need the bus, a running fan daemon and a known mode
pub fn controls_available(coordinator: &Coordinator) -> bool {
    coordinator.bus().is_present()
        && coordinator.data().is_some_and(|d| d.fan_control_running)
        && coordinator.parser().fan_mode().current().is_some()
}

fn current_pwm(coordinator: &Coordinator) -> u8 {
    coordinator
        .parser()
        .snapshot()
        .get("unas_fan_speed")
        .and_then(|v| v.as_f64())
        .filter(|pwm| (0.0..=255.0).contains(pwm))
        .map(|pwm| pwm.round() as u8)
        .unwrap_or(DEFAULT_FIXED_PWM)
}

pub async fn set_fan_mode(coordinator: &Coordinator, selection: FanSelection) -> Result<FanMode, BridgeError> {
    operations::ensure_fan_control_running(coordinator.shell().as_ref()).await;

    let mode = match selection {
        FanSelection::Managed => FanMode::Managed,
        FanSelection::CustomCurve => FanMode::AutoCurve,
        FanSelection::TargetTemp => FanMode::TargetTemp,
        FanSelection::SetSpeed(Some(pwm)) => FanMode::FixedSpeed(pwm),
        FanSelection::SetSpeed(None) => FanMode::FixedSpeed(current_pwm(coordinator)),
    };
    publish_setting(coordinator.bus().as_ref(), coordinator.root(), "fan/mode", &mode.encode()).await?;
    info!("Fan mode for {} set to {}", coordinator.entry_id(), mode);

    if mode == FanMode::Managed {
        // Firmware fan daemon only resumes after a profile switch
        best_effort(
            "kick native fan control",
            Severity::Warn,
            operations::kick_native_fan_control(coordinator.shell().as_ref()),
        )
        .await;
    }
    Ok(mode)
}

/// Fixed speed as a percentage, published as a PWM mode
pub async fn set_fan_speed(coordinator: &Coordinator, percent: i64) -> Result<u8, BridgeError> {
    if !(0..=100).contains(&percent) {
        return Err(ControlError::OutOfRange {
            field: "fan_speed".to_string(),
            value: percent,
            min: 0,
            max: 100,
        }
        .into());
    }
    let pwm = percent_to_pwm(percent as f64).clamp(0, 255) as u8;
    publish_setting(
        coordinator.bus().as_ref(),
        coordinator.root(),
        "fan/mode",
        &FanMode::FixedSpeed(pwm).encode(),
    )
    .await?;
    Ok(pwm)
}

fn require_target_temp_mode(coordinator: &Coordinator, action: &str) -> Result<(), ControlError> {
    match coordinator.parser().fan_mode().current() {
        Some(FanMode::TargetTemp) => Ok(()),
        other => Err(ControlError::Rejected {
            action: action.to_string(),
            reason: format!(
                "only applies in target_temp mode (current: {})",
                other.map(|m| m.encode()).unwrap_or_else(|| "unknown".to_string())
            ),
        }),
    }
}

pub async fn set_temp_metric(coordinator: &Coordinator, metric: TempMetric) -> Result<(), BridgeError> {
    require_target_temp_mode(coordinator, "set temperature metric")?;
    publish_setting(coordinator.bus().as_ref(), coordinator.root(), "fan/curve/temp_metric", metric.as_str()).await
}

pub async fn set_response_speed(coordinator: &Coordinator, speed: ResponseSpeed) -> Result<(), BridgeError> {
    require_target_temp_mode(coordinator, "set response speed")?;
    publish_setting(coordinator.bus().as_ref(), coordinator.root(), "fan/curve/response_speed", speed.as_str()).await
}
