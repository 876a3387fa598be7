use thiserror::Error;

/// Input validation failures, raised synchronously before any NLP work.
///
/// Solver non-convergence is not an error: the optimizer reports it through
/// the `success` flag and still returns the last iterate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("at least two waypoints are required, got {0}")]
    TooFewWaypoints(usize),

    #[error("samples_per_meter must lie in [1, 100], got {0}")]
    SamplesPerMeterOutOfRange(f64),

    #[error("min_samples_per_segment must lie in [1, 50], got {0}")]
    MinSamplesOutOfRange(usize),

    #[error("robot parameter {name} must be positive and finite, got {value}")]
    NonPositiveParam { name: &'static str, value: f64 },

    #[error("waypoint {index}: {reason}")]
    InvalidWaypoint { index: usize, reason: String },

    #[error("constraint {index} references waypoint {waypoint}, but only {count} waypoints exist")]
    ConstraintWaypointOutOfBounds {
        index: usize,
        waypoint: usize,
        count: usize,
    },

    #[error("constraint {index}: {reason}")]
    InvalidConstraint { index: usize, reason: String },

    #[error("control_effort_weight must lie in [0, 10], got {0}")]
    ControlEffortOutOfRange(f64),

    #[error("time step bounds must satisfy 0 < dt_min < dt_max, got [{dt_min}, {dt_max}]")]
    InvalidTimeStepBounds { dt_min: f64, dt_max: f64 },
}
