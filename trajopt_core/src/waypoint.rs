use serde::{Deserialize, Serialize};

/// How a waypoint pins the robot pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaypointKind {
    /// Position and heading both fixed.
    Constrained,
    /// Position fixed, heading free.
    Unconstrained,
    /// Robot sits on a circle around an intake point, facing it.
    Intake,
}

/// A waypoint the trajectory must pass through.
///
/// The intake fields are only interpreted when `kind` is
/// [`WaypointKind::Intake`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Waypoint {
    /// Position x (m).
    pub x: f64,
    /// Position y (m).
    pub y: f64,
    /// Heading (rad).
    pub heading: f64,
    /// Require zero velocity at this waypoint.
    pub stop: bool,
    /// Linear velocity bound for the segment starting here (m/s).
    pub v_max: f64,
    /// Angular velocity bound for the segment starting here (rad/s).
    pub omega_max: f64,
    pub kind: WaypointKind,
    /// Intake point x (m).
    pub intake_x: f64,
    /// Intake point y (m).
    pub intake_y: f64,
    /// Radius of the approach circle around the intake point (m).
    pub intake_distance: f64,
    /// Speed bound on the approach circle (m/s).
    pub intake_velocity_max: f64,
    /// Allowed angle between velocity and heading at the intake (rad).
    pub intake_velocity_slack: f64,
}

impl Default for Waypoint {
    fn default() -> Self {
        Waypoint {
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            stop: true,
            v_max: 3.0,
            omega_max: 10.0,
            kind: WaypointKind::Constrained,
            intake_x: 0.0,
            intake_y: 0.0,
            intake_distance: 0.5,
            intake_velocity_max: 1.0,
            intake_velocity_slack: 0.1,
        }
    }
}

impl Waypoint {
    /// Constrained stop waypoint at the given pose.
    pub fn at(x: f64, y: f64, heading: f64) -> Self {
        Waypoint {
            x,
            y,
            heading,
            ..Default::default()
        }
    }

    /// Intake waypoint approaching the given point.
    pub fn intake(intake_x: f64, intake_y: f64) -> Self {
        Waypoint {
            kind: WaypointKind::Intake,
            intake_x,
            intake_y,
            ..Default::default()
        }
    }
}
