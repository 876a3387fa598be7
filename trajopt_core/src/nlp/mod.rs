//! Nonlinear program assembled per solve.
//!
//! The decision vector stacks the states at every knot, the controls at
//! every interval and one time step per segment. Constraints are kept as
//! small blocks, each touching only the variables it reads; Jacobians come
//! from pushing dual numbers through the block residuals one seed at a
//! time.

pub mod ad;
pub mod builder;

use nalgebra::{DMatrix, DVector};

use crate::dynamics::mecanum::{Control, MecanumModel, State};
use crate::ode_solver::rk4_step;
use crate::utils::traits::Real;
use ad::Dual;

pub const STATE_DIM: usize = 6;
pub const CONTROL_DIM: usize = 3;

/// Index layout of the flat decision vector:
/// `[X(6·K) | U(3·N) | Δt(N_s)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarLayout {
    pub knots: usize,
    pub intervals: usize,
    pub segments: usize,
}

impl VarLayout {
    pub fn num_vars(&self) -> usize {
        STATE_DIM * self.knots + CONTROL_DIM * self.intervals + self.segments
    }

    /// Index of state component `i` at knot `k`.
    pub fn state(&self, knot: usize, i: usize) -> usize {
        debug_assert!(knot < self.knots && i < STATE_DIM);
        STATE_DIM * knot + i
    }

    /// Index of control component `i` at interval `k`.
    pub fn control(&self, interval: usize, i: usize) -> usize {
        debug_assert!(interval < self.intervals && i < CONTROL_DIM);
        STATE_DIM * self.knots + CONTROL_DIM * interval + i
    }

    /// Index of the shared time step of segment `s`.
    pub fn dt(&self, segment: usize) -> usize {
        debug_assert!(segment < self.segments);
        STATE_DIM * self.knots + CONTROL_DIM * self.intervals + segment
    }

    pub fn state_indices(&self, knot: usize) -> impl Iterator<Item = usize> {
        let base = STATE_DIM * knot;
        base..base + STATE_DIM
    }

    pub fn control_indices(&self, interval: usize) -> impl Iterator<Item = usize> {
        let base = STATE_DIM * self.knots + CONTROL_DIM * interval;
        base..base + CONTROL_DIM
    }
}

/// Differentiable residual shapes. Each variant reads its locals in a fixed
/// order documented on the variant.
#[derive(Debug, Clone)]
pub enum Term {
    /// Shooting defect `x⁺ − Φ(x, u, Δt)`; locals `[x(6), u(3), x⁺(6), Δt]`.
    Defect,
    /// One affine row `offset + Σ coeffs·locals`.
    Linear { coeffs: Vec<f64>, offset: f64 },
    /// Four wheel duties from the axis mix; locals `[u(3)]`.
    WheelDuties,
    /// Four wheel ground forces; locals `[x(6), u(3)]`.
    WheelForces,
    /// `(a−cx)² + (b−cy)²` over two locals `[a, b]`.
    DistSq { cx: f64, cy: f64 },
    /// Super-ellipse level `((a−cx)/half_w)⁸ + ((b−cy)/half_h)⁸`; ≥ 1
    /// keeps the point outside the rectangle. Locals `[a, b]`.
    SuperEllipse {
        cx: f64,
        cy: f64,
        half_w: f64,
        half_h: f64,
    },
    /// Heading-faces-point rows: the sine form (equality) and the cosine
    /// form (sign disambiguation). Locals `[px, py, θ]`.
    IntakeFacing { ix: f64, iy: f64 },
    /// Approach-velocity rows: squared speed, squared cross-track component
    /// minus its slack share, and the forward component. Locals
    /// `[vx, vy, θ]`.
    IntakeVelocity { sin_slack_sq: f64 },
    /// `(vx·sinθ − vy·cosθ)² − slack·(vx² + vy²)`; locals `[vx, vy, θ]`.
    HeadingTangent { slack: f64 },
}

impl Term {
    pub fn rows(&self) -> usize {
        match self {
            Term::Defect => STATE_DIM,
            Term::Linear { .. } => 1,
            Term::WheelDuties | Term::WheelForces => 4,
            Term::DistSq { .. } | Term::SuperEllipse { .. } => 1,
            Term::IntakeFacing { .. } => 2,
            Term::IntakeVelocity { .. } => 3,
            Term::HeadingTangent { .. } => 1,
        }
    }

    fn eval<F: Real>(&self, model: &MecanumModel, locals: &[F], out: &mut [F]) {
        match self {
            Term::Defect => {
                let x = State::<F>::from_column_slice(&locals[0..6]);
                let u = Control::<F>::from_column_slice(&locals[6..9]);
                let x_next = State::<F>::from_column_slice(&locals[9..15]);
                let h = locals[15];
                let phi = rk4_step(|x, u| model.state_derivative(x, u), &x, &u, h);
                for i in 0..STATE_DIM {
                    out[i] = x_next[i] - phi[i];
                }
            }
            Term::Linear { coeffs, offset } => {
                let mut acc = F::from_f64(*offset);
                for (coeff, local) in coeffs.iter().zip(locals) {
                    acc += F::from_f64(*coeff) * *local;
                }
                out[0] = acc;
            }
            Term::WheelDuties => {
                let u = Control::<F>::from_column_slice(&locals[0..3]);
                let duties = crate::dynamics::mecanum::wheel_duties(&u);
                out[..4].copy_from_slice(duties.as_slice());
            }
            Term::WheelForces => {
                let x = State::<F>::from_column_slice(&locals[0..6]);
                let u = Control::<F>::from_column_slice(&locals[6..9]);
                let forces = model.wheel_forces(&x, &u);
                out[..4].copy_from_slice(forces.as_slice());
            }
            Term::DistSq { cx, cy } => {
                let da = locals[0] - F::from_f64(*cx);
                let db = locals[1] - F::from_f64(*cy);
                out[0] = da * da + db * db;
            }
            Term::SuperEllipse {
                cx,
                cy,
                half_w,
                half_h,
            } => {
                let da = (locals[0] - F::from_f64(*cx)) / F::from_f64(*half_w);
                let db = (locals[1] - F::from_f64(*cy)) / F::from_f64(*half_h);
                out[0] = da.powi(8) + db.powi(8);
            }
            Term::IntakeFacing { ix, iy } => {
                let (px, py, theta) = (locals[0], locals[1], locals[2]);
                let dx = F::from_f64(*ix) - px;
                let dy = F::from_f64(*iy) - py;
                out[0] = theta.sin() * dx - theta.cos() * dy;
                out[1] = theta.cos() * dx + theta.sin() * dy;
            }
            Term::IntakeVelocity { sin_slack_sq } => {
                let (vx, vy, theta) = (locals[0], locals[1], locals[2]);
                let v_sq = vx * vx + vy * vy;
                let cross = vx * theta.sin() - vy * theta.cos();
                out[0] = v_sq;
                out[1] = cross * cross - v_sq * F::from_f64(*sin_slack_sq);
                out[2] = vx * theta.cos() + vy * theta.sin();
            }
            Term::HeadingTangent { slack } => {
                let (vx, vy, theta) = (locals[0], locals[1], locals[2]);
                let v_sq = vx * vx + vy * vy;
                let cross = vx * theta.sin() - vy * theta.cos();
                out[0] = cross * cross - v_sq * F::from_f64(*slack);
            }
        }
    }
}

/// A residual block plus the bounds on its rows. `lower == upper` makes a
/// row an equality.
#[derive(Debug, Clone)]
pub struct ConstraintBlock {
    /// Global indices of the variables this block reads, in local order.
    pub vars: Vec<usize>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub term: Term,
}

impl ConstraintBlock {
    pub fn rows(&self) -> usize {
        self.term.rows()
    }
}

/// The assembled per-solve NLP. Consumed read-only by the solver and
/// discarded afterwards.
#[derive(Debug, Clone)]
pub struct NlpProblem {
    pub layout: VarLayout,
    pub model: MecanumModel,
    /// Variable bounds (±∞ where unbounded).
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
    /// Initial iterate.
    pub x0: DVector<f64>,
    /// Linear objective coefficients: the total-time term.
    pub objective_linear: DVector<f64>,
    /// Quadratic penalty weight on every control entry.
    pub control_effort_weight: f64,
    pub blocks: Vec<ConstraintBlock>,
}

impl NlpProblem {
    pub fn num_vars(&self) -> usize {
        self.layout.num_vars()
    }

    pub fn num_rows(&self) -> usize {
        self.blocks.iter().map(ConstraintBlock::rows).sum()
    }

    pub fn objective(&self, z: &DVector<f64>) -> f64 {
        let mut value = self.objective_linear.dot(z);
        if self.control_effort_weight != 0.0 {
            for interval in 0..self.layout.intervals {
                for idx in self.layout.control_indices(interval) {
                    value += self.control_effort_weight * z[idx] * z[idx];
                }
            }
        }
        value
    }

    pub fn objective_gradient(&self, z: &DVector<f64>) -> DVector<f64> {
        let mut grad = self.objective_linear.clone();
        if self.control_effort_weight != 0.0 {
            for interval in 0..self.layout.intervals {
                for idx in self.layout.control_indices(interval) {
                    grad[idx] += 2.0 * self.control_effort_weight * z[idx];
                }
            }
        }
        grad
    }

    /// Constant diagonal of the objective Hessian.
    pub fn objective_hessian_diag(&self) -> DVector<f64> {
        let mut diag = DVector::zeros(self.num_vars());
        if self.control_effort_weight != 0.0 {
            for interval in 0..self.layout.intervals {
                for idx in self.layout.control_indices(interval) {
                    diag[idx] = 2.0 * self.control_effort_weight;
                }
            }
        }
        diag
    }

    /// Stacked row bounds in block order.
    pub fn row_bounds(&self) -> (DVector<f64>, DVector<f64>) {
        let m = self.num_rows();
        let mut lower = DVector::zeros(m);
        let mut upper = DVector::zeros(m);
        let mut row = 0;
        for block in &self.blocks {
            for (l, u) in block.lower.iter().zip(&block.upper) {
                lower[row] = *l;
                upper[row] = *u;
                row += 1;
            }
        }
        (lower, upper)
    }

    /// All constraint rows evaluated at `z`, in block order.
    pub fn constraint_values(&self, z: &DVector<f64>) -> DVector<f64> {
        let mut values = DVector::zeros(self.num_rows());
        let mut out = [0.0; STATE_DIM];
        let mut locals: Vec<f64> = Vec::new();
        let mut row = 0;
        for block in &self.blocks {
            locals.clear();
            locals.extend(block.vars.iter().map(|&idx| z[idx]));
            let rows = block.rows();
            block.term.eval(&self.model, &locals, &mut out[..rows]);
            values.rows_mut(row, rows).copy_from_slice(&out[..rows]);
            row += rows;
        }
        values
    }

    /// Dense Jacobian of all constraint rows at `z`, built block-wise with
    /// one dual seed per local variable.
    pub fn constraint_jacobian(&self, z: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.num_rows(), self.num_vars());
        let mut out = [Dual::constant(0.0); STATE_DIM];
        let mut locals: Vec<Dual> = Vec::new();
        let mut row = 0;
        for block in &self.blocks {
            locals.clear();
            locals.extend(block.vars.iter().map(|&idx| Dual::constant(z[idx])));
            let rows = block.rows();
            for (j, &var) in block.vars.iter().enumerate() {
                locals[j].eps = 1.0;
                block.term.eval(&self.model, &locals, &mut out[..rows]);
                locals[j].eps = 0.0;
                for r in 0..rows {
                    jac[(row + r, var)] = out[r].eps;
                }
            }
            row += rows;
        }
        jac
    }
}
