//! Nonlinear-solver capability interface.
//!
//! The optimizer composes a solver rather than owning one: anything that
//! can take the assembled [`NlpProblem`](crate::nlp::NlpProblem), respect
//! the options, and hand back its last iterate qualifies. Tests exercise
//! the optimizer with a mock that returns a fixed iterate.

pub mod interior_point;

pub use interior_point::InteriorPointSolver;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::nlp::NlpProblem;

/// Options understood by any composed solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub max_iterations: usize,
    /// Convergence tolerance on the unscaled KKT error.
    pub tolerance: f64,
    /// Looser tolerance accepted when the solver runs out of iterations.
    pub acceptable_tolerance: f64,
    /// Initial barrier parameter.
    pub mu_init: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_iterations: 1000,
            tolerance: 1e-6,
            acceptable_tolerance: 1e-4,
            mu_init: 0.1,
        }
    }
}

/// How a solve attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    /// Converged to the requested tolerance.
    Optimal,
    /// Stopped at the acceptable tolerance.
    Acceptable,
    /// Iteration cap reached away from any tolerance; the iterate may
    /// still be worth inspecting.
    IterationLimit,
    /// The KKT system broke down beyond recovery.
    Failed,
}

impl SolverStatus {
    pub fn is_success(self) -> bool {
        matches!(self, SolverStatus::Optimal | SolverStatus::Acceptable)
    }
}

/// Outcome of one solve. Always carries the last iterate, converged or not.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolverStatus,
    pub variables: DVector<f64>,
    pub objective: f64,
    /// Worst general-constraint violation at the final iterate.
    pub constraint_violation: f64,
    pub iterations: usize,
}

/// Narrow interface over an interior-point NLP solver.
pub trait NlpSolver {
    fn solve(&self, problem: &NlpProblem, options: &SolverOptions) -> Solution;
}
