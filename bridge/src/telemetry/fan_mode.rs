use serde::Serialize;
use std::fmt;
use tokio::sync::watch;

/// Fan policy as published on `control/fan/mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "pwm", rename_all = "snake_case")]
pub enum FanMode {
    /// Appliance firmware controls the fans
    Managed,
    /// Linear curve between min/max temperature
    AutoCurve,
    /// Closed loop towards a target temperature
    TargetTemp,
    /// Raw PWM duty (0-255)
    FixedSpeed(u8),
}

impl FanMode {
    /// Decode a mode payload; unrecognised payloads decode to `None`
    pub fn decode(payload: &str) -> Option<Self> {
        match payload {
            "unas_managed" => Some(FanMode::Managed),
            "auto" => Some(FanMode::AutoCurve),
            "target_temp" => Some(FanMode::TargetTemp),
            digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                digits.parse::<u8>().ok().map(FanMode::FixedSpeed)
            }
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            FanMode::Managed => "unas_managed".to_string(),
            FanMode::AutoCurve => "auto".to_string(),
            FanMode::TargetTemp => "target_temp".to_string(),
            FanMode::FixedSpeed(pwm) => pwm.to_string(),
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Shared, decoded fan mode.
///
/// Written once per mode message by the parser; every consumer reads or
/// subscribes to this single instance.
pub struct FanModeState {
    tx: watch::Sender<Option<FanMode>>,
}

impl Default for FanModeState {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }
}

impl FanModeState {
    pub fn current(&self) -> Option<FanMode> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<FanMode>> {
        self.tx.subscribe()
    }

    pub(crate) fn update(&self, mode: Option<FanMode>) {
        self.tx.send_if_modified(|current| {
            if *current == mode {
                false
            } else {
                *current = mode;
                true
            }
        });
    }
}
