use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Physical parameters of the mecanum platform. SI units throughout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotParams {
    /// Robot mass (kg).
    pub mass: f64,
    /// Moment of inertia about the vertical axis (kg·m²).
    pub inertia: f64,
    /// Mecanum wheel radius (m).
    pub wheel_radius: f64,
    /// Half wheelbase in the x direction (m).
    pub lx: f64,
    /// Half wheelbase in the y direction (m).
    pub ly: f64,
    /// Motor free speed (rad/s).
    pub w_max: f64,
    /// Motor stall torque (N·m).
    pub t_max: f64,
    /// Traction limit per wheel before slip (N).
    pub f_traction_max: f64,
}

impl Default for RobotParams {
    fn default() -> Self {
        RobotParams {
            mass: 15.0,
            inertia: 0.5,
            wheel_radius: 0.05,
            lx: 0.15,
            ly: 0.15,
            w_max: 100.0,
            t_max: 1.0,
            f_traction_max: 20.0,
        }
    }
}

impl RobotParams {
    /// Every parameter must be finite and strictly positive for the model
    /// to make sense.
    pub fn validate(&self) -> Result<(), Error> {
        let fields = [
            ("mass", self.mass),
            ("inertia", self.inertia),
            ("wheel_radius", self.wheel_radius),
            ("lx", self.lx),
            ("ly", self.ly),
            ("w_max", self.w_max),
            ("t_max", self.t_max),
            ("f_traction_max", self.f_traction_max),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::NonPositiveParam { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(RobotParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_values() {
        let params = RobotParams {
            mass: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = RobotParams {
            wheel_radius: -0.05,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = RobotParams {
            inertia: f64::NAN,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
