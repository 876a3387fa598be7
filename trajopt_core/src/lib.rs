//! Time-optimal trajectory optimization for four-wheel mecanum robots.
//!
//! The engine discretizes the robot's continuous dynamics by direct
//! multiple shooting on a waypoint-derived knot grid, poses a free-time
//! nonlinear program (states, controls and per-segment time steps as
//! decision variables) and extracts a discrete trajectory from the composed
//! interior-point solver.

pub mod constraint;
pub mod dynamics;
pub mod error;
pub mod grid;
pub mod guess;
pub mod nlp;
pub mod ode_solver;
pub mod optimizer;
pub mod solver;
pub mod utils;
pub mod waypoint;

pub use constraint::{PathConstraint, PathConstraintKind};
pub use dynamics::RobotParams;
pub use error::Error;
pub use grid::SamplingParams;
pub use optimizer::{SolverResult, TrajectoryOptimizer};
pub use waypoint::{Waypoint, WaypointKind};
