use serde::{Deserialize, Serialize};

fn default_heading_slack() -> f64 {
    0.01
}

fn default_enabled() -> bool {
    true
}

/// Kind-specific shape of a path constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PathConstraintKind {
    /// Keep the robot center outside a circle.
    CircleObstacle { cx: f64, cy: f64, radius: f64 },
    /// Keep the robot center outside an axis-aligned rectangle.
    RectObstacle {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// Keep the robot center inside an axis-aligned rectangle.
    StayInRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// Keep the robot center within a lane of the given width centered on
    /// the straight line between the two referenced waypoints.
    StayInLane { width: f64 },
    /// Force the velocity direction to track the heading, up to the slack
    /// fraction of the squared speed.
    HeadingTangent {
        #[serde(default = "default_heading_slack")]
        slack: f64,
    },
    /// Cap the linear speed (m/s).
    MaxVelocity { v_max: f64 },
    /// Cap the angular velocity (rad/s).
    MaxOmega { omega_max: f64 },
}

/// A geometric or kinodynamic constraint applied over a span of the path.
///
/// The span covers the knots of the segments starting at `from_waypoint`
/// through `to_waypoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConstraint {
    pub kind: PathConstraintKind,
    pub from_waypoint: usize,
    pub to_waypoint: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PathConstraint {
    pub fn spanning(kind: PathConstraintKind, from_waypoint: usize, to_waypoint: usize) -> Self {
        PathConstraint {
            kind,
            from_waypoint,
            to_waypoint,
            enabled: true,
        }
    }
}
