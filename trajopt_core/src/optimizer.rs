//! The trajectory optimizer: validates the request, assembles the NLP over
//! the knot grid, runs the composed solver and unpacks its iterate into a
//! discrete trajectory.

use std::time::Instant;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::constraint::{PathConstraint, PathConstraintKind};
use crate::dynamics::{MecanumModel, RobotParams};
use crate::error::Error;
use crate::grid::{SamplingParams, SegmentGrid};
use crate::guess::initial_guess;
use crate::nlp::builder::{build_problem, BuilderConfig};
use crate::nlp::{VarLayout, CONTROL_DIM, STATE_DIM};
use crate::solver::{InteriorPointSolver, NlpSolver, SolverOptions};
use crate::waypoint::{Waypoint, WaypointKind};

/// A solved (or best-effort) trajectory.
///
/// `states[k]` is `[vx, vy, omega, px, py, theta]` at knot `k`;
/// `controls[k]` is `[drive, strafe, turn]` over interval `k`. On failure
/// `success` is false and the fields hold the solver's last iterate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverResult {
    pub success: bool,
    /// Total trajectory time (s).
    pub total_time: f64,
    /// Cumulative time at each knot (s); `times[0] = 0`.
    pub times: Vec<f64>,
    pub states: Vec<[f64; STATE_DIM]>,
    pub controls: Vec<[f64; CONTROL_DIM]>,
    pub iterations: usize,
    pub solve_time_ms: f64,
}

/// Time-optimal trajectory optimizer for a mecanum platform.
///
/// One instance is reusable across solves; each solve builds its own
/// variable graph and discards it with the result. Independent instances
/// can solve concurrently.
pub struct TrajectoryOptimizer {
    model: MecanumModel,
    sampling: SamplingParams,
    /// Per-interval time step bounds (s).
    pub dt_min: f64,
    pub dt_max: f64,
    /// Quadratic penalty on control effort, in [0, 10]; 0 keeps the
    /// objective purely time-optimal.
    pub control_effort_weight: f64,
    pub options: SolverOptions,
    solver: Box<dyn NlpSolver>,
}

impl TrajectoryOptimizer {
    pub fn new(params: RobotParams, sampling: SamplingParams) -> Result<Self, Error> {
        Self::with_solver(params, sampling, Box::new(InteriorPointSolver::new()))
    }

    /// Builds an optimizer around a caller-supplied solver.
    pub fn with_solver(
        params: RobotParams,
        sampling: SamplingParams,
        solver: Box<dyn NlpSolver>,
    ) -> Result<Self, Error> {
        params.validate()?;
        sampling.validate()?;
        Ok(TrajectoryOptimizer {
            model: MecanumModel::new(params),
            sampling,
            dt_min: 0.01,
            dt_max: 1.0,
            control_effort_weight: 0.0,
            options: SolverOptions::default(),
            solver,
        })
    }

    /// Solves for the time-optimal trajectory through `waypoints` subject
    /// to the enabled `constraints`.
    ///
    /// Infeasibility and non-convergence are reported through
    /// [`SolverResult::success`], never as an `Err`; only invalid input
    /// errors out, before any NLP is built.
    pub fn solve(
        &self,
        waypoints: &[Waypoint],
        constraints: &[PathConstraint],
    ) -> Result<SolverResult, Error> {
        self.validate(waypoints, constraints)?;

        let grid = SegmentGrid::new(waypoints, self.sampling);
        let layout = VarLayout {
            knots: grid.num_knots(),
            intervals: grid.num_intervals(),
            segments: grid.num_segments(),
        };
        info!(
            "solving: {} waypoints, {} constraints, {} knots, {} variables",
            waypoints.len(),
            constraints.len(),
            layout.knots,
            layout.num_vars()
        );

        let x0 = initial_guess(&grid, &layout, self.dt_min, self.dt_max);
        let config = BuilderConfig {
            dt_min: self.dt_min,
            dt_max: self.dt_max,
            control_effort_weight: self.control_effort_weight,
        };
        let problem = build_problem(
            self.model.clone(),
            waypoints,
            constraints,
            &grid,
            &config,
            x0,
        );

        let started = Instant::now();
        let solution = self.solver.solve(&problem, &self.options);
        let solve_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let success = solution.status.is_success();
        if success {
            info!(
                "solved in {} iterations ({solve_time_ms:.1} ms), objective {:.4}",
                solution.iterations, solution.objective
            );
        } else {
            warn!(
                "solver stopped with {:?} after {} iterations (violation {:.3e}); returning last iterate",
                solution.status, solution.iterations, solution.constraint_violation
            );
        }

        let z = &solution.variables;
        let mut times = Vec::with_capacity(layout.knots);
        times.push(0.0);
        for k in 0..layout.intervals {
            let dt = z[layout.dt(grid.segment_of_interval(k))];
            times.push(times[k] + dt);
        }
        let states = (0..layout.knots)
            .map(|k| std::array::from_fn(|i| z[layout.state(k, i)]))
            .collect();
        let controls = (0..layout.intervals)
            .map(|k| std::array::from_fn(|i| z[layout.control(k, i)]))
            .collect();

        Ok(SolverResult {
            success,
            total_time: *times.last().unwrap(),
            times,
            states,
            controls,
            iterations: solution.iterations,
            solve_time_ms,
        })
    }

    fn validate(
        &self,
        waypoints: &[Waypoint],
        constraints: &[PathConstraint],
    ) -> Result<(), Error> {
        if waypoints.len() < 2 {
            return Err(Error::TooFewWaypoints(waypoints.len()));
        }
        if !(self.dt_min > 0.0 && self.dt_min < self.dt_max) {
            return Err(Error::InvalidTimeStepBounds {
                dt_min: self.dt_min,
                dt_max: self.dt_max,
            });
        }
        if !self.control_effort_weight.is_finite()
            || !(0.0..=10.0).contains(&self.control_effort_weight)
        {
            return Err(Error::ControlEffortOutOfRange(self.control_effort_weight));
        }

        for (index, wp) in waypoints.iter().enumerate() {
            let invalid = |reason: &str| Error::InvalidWaypoint {
                index,
                reason: reason.to_string(),
            };
            if !(wp.v_max.is_finite() && wp.v_max > 0.0) {
                return Err(invalid("v_max must be positive"));
            }
            if !(wp.omega_max.is_finite() && wp.omega_max > 0.0) {
                return Err(invalid("omega_max must be positive"));
            }
            if wp.kind == WaypointKind::Intake {
                if !(wp.intake_distance.is_finite() && wp.intake_distance > 0.0) {
                    return Err(invalid("intake_distance must be positive"));
                }
                if !(wp.intake_velocity_max.is_finite() && wp.intake_velocity_max > 0.0) {
                    return Err(invalid("intake_velocity_max must be positive"));
                }
                if !(wp.intake_velocity_slack.is_finite() && wp.intake_velocity_slack >= 0.0) {
                    return Err(invalid("intake_velocity_slack must be non-negative"));
                }
            }
        }

        for (index, constraint) in constraints.iter().enumerate().filter(|(_, c)| c.enabled) {
            for waypoint in [constraint.from_waypoint, constraint.to_waypoint] {
                if waypoint >= waypoints.len() {
                    return Err(Error::ConstraintWaypointOutOfBounds {
                        index,
                        waypoint,
                        count: waypoints.len(),
                    });
                }
            }
            let invalid = |reason: &str| Error::InvalidConstraint {
                index,
                reason: reason.to_string(),
            };
            if constraint.from_waypoint > constraint.to_waypoint {
                return Err(invalid("from_waypoint is after to_waypoint"));
            }
            match constraint.kind {
                PathConstraintKind::CircleObstacle { radius, .. } => {
                    if !(radius.is_finite() && radius > 0.0) {
                        return Err(invalid("radius must be positive"));
                    }
                }
                PathConstraintKind::RectObstacle { width, height, .. }
                | PathConstraintKind::StayInRect { width, height, .. } => {
                    if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
                        return Err(invalid("width and height must be positive"));
                    }
                }
                PathConstraintKind::StayInLane { width } => {
                    if !(width.is_finite() && width > 0.0) {
                        return Err(invalid("width must be positive"));
                    }
                }
                PathConstraintKind::HeadingTangent { slack } => {
                    if !(slack.is_finite() && slack >= 0.0) {
                        return Err(invalid("slack must be non-negative"));
                    }
                }
                PathConstraintKind::MaxVelocity { v_max } => {
                    if !(v_max.is_finite() && v_max > 0.0) {
                        return Err(invalid("v_max must be positive"));
                    }
                }
                PathConstraintKind::MaxOmega { omega_max } => {
                    if !(omega_max.is_finite() && omega_max > 0.0) {
                        return Err(invalid("omega_max must be positive"));
                    }
                }
            }
        }
        Ok(())
    }
}
