//! Consumer-side controls: fan policy, fan curve, monitor interval, backup
//! tasks and appliance power actions.
//!
//! Fan and interval controls are published retained under
//! `<root>/control/...` for the appliance daemons to pick up; everything else
//! goes through the remote session.

pub mod actions;
pub mod curve;
pub mod fan;

pub use actions::{
    reboot, reinstall_scripts, run_backup_task, set_backup_schedule_enabled, set_monitor_interval,
    shutdown,
};
pub use curve::{set_curve_param, visualise, CurveParam, CurvePoint, CurveView};
pub use fan::{
    controls_available, set_fan_mode, set_fan_speed, set_response_speed, set_temp_metric,
    FanSelection, ResponseSpeed, TempMetric,
};

use crate::errors::BridgeError;
use crate::messaging::MessageBus;

pub(crate) fn control_topic(root: &str, path: &str) -> String {
    format!("{}/control/{}", root, path)
}

/// Retained publish of a desired setting
pub(crate) async fn publish_setting(
    bus: &dyn MessageBus,
    root: &str,
    path: &str,
    value: &str,
) -> Result<(), BridgeError> {
    bus.publish(&control_topic(root, path), value, true).await?;
    Ok(())
}

pub fn percent_to_pwm(percent: f64) -> i64 {
    (percent * 255.0 / 100.0).round() as i64
}

pub fn pwm_to_percent(pwm: f64) -> i64 {
    (pwm * 100.0 / 255.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_and_pwm_convert_with_rounding() {
        assert_eq!(percent_to_pwm(0.0), 0);
        assert_eq!(percent_to_pwm(50.0), 128);
        assert_eq!(percent_to_pwm(80.0), 204);
        assert_eq!(percent_to_pwm(100.0), 255);
        assert_eq!(pwm_to_percent(204.0), 80);
        assert_eq!(pwm_to_percent(128.0), 50);
    }

    #[test]
    fn control_topics_live_under_the_root() {
        assert_eq!(control_topic("unas/abc", "fan/mode"), "unas/abc/control/fan/mode");
    }
}
