//! Primal-dual interior-point method.
//!
//! General constraint rows become equalities through slack variables; all
//! bounds (variables and slacks) go through a logarithmic barrier. Search
//! directions come from a dense LU factorization of the condensed KKT
//! system, using the objective curvature plus the barrier diagonal — the
//! model contract only promises first derivatives, so no constraint
//! curvature is used. Steps are globalized with a fraction-to-boundary rule
//! and a backtracking line search on an ℓ1 merit function; the barrier
//! parameter follows the classical monotone reduction schedule.

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use crate::nlp::NlpProblem;

use super::{NlpSolver, Solution, SolverOptions, SolverStatus};

/// Fraction-to-boundary factor: no variable moves more than this share of
/// its distance to a bound in one step.
const TAU: f64 = 0.995;

/// Dual regularization of the KKT system, keeping redundant rows solvable.
const DELTA_C: f64 = 1e-8;

/// Primal regularization ladder used when the KKT factorization fails.
const DELTA_W_MIN: f64 = 1e-8;
const DELTA_W_MAX: f64 = 1e8;

/// Multiplier safeguard (κ_Σ): bound multipliers are kept within this
/// factor of μ/(w−bound) so they cannot run away from the barrier.
const KAPPA_SIGMA: f64 = 1e10;

#[derive(Debug, Clone, Copy, Default)]
pub struct InteriorPointSolver;

impl InteriorPointSolver {
    pub fn new() -> Self {
        InteriorPointSolver
    }
}

/// The NLP in slack form: variables first, one slack per inequality row.
struct SlackForm {
    n: usize,
    n_ext: usize,
    /// Row bounds; `slack_of_row[r]` is the extended index of row r's
    /// slack, `None` for equality rows (which pin to `row_lower`).
    row_lower: DVector<f64>,
    slack_of_row: Vec<Option<usize>>,
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl SlackForm {
    fn new(problem: &NlpProblem) -> Self {
        let n = problem.num_vars();
        let m = problem.num_rows();
        let (row_lower, row_upper) = problem.row_bounds();

        let mut slack_of_row = Vec::with_capacity(m);
        let mut slack_lower = Vec::new();
        let mut slack_upper = Vec::new();
        for r in 0..m {
            if row_lower[r] == row_upper[r] {
                slack_of_row.push(None);
            } else {
                slack_of_row.push(Some(n + slack_lower.len()));
                slack_lower.push(row_lower[r]);
                slack_upper.push(row_upper[r]);
            }
        }

        let n_ext = n + slack_lower.len();
        let mut lower = DVector::from_element(n_ext, f64::NEG_INFINITY);
        let mut upper = DVector::from_element(n_ext, f64::INFINITY);
        lower.rows_mut(0, n).copy_from(&problem.lower);
        upper.rows_mut(0, n).copy_from(&problem.upper);
        for (j, (l, u)) in slack_lower.iter().zip(&slack_upper).enumerate() {
            lower[n + j] = *l;
            upper[n + j] = *u;
        }

        SlackForm {
            n,
            n_ext,
            row_lower,
            slack_of_row,
            lower,
            upper,
        }
    }

    /// Equality residual `c̃(w)`: raw row value minus its slack (or its
    /// pinned value for equality rows).
    fn residual(&self, raw: &DVector<f64>, w: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(raw.len(), |r, _| match self.slack_of_row[r] {
            Some(idx) => raw[r] - w[idx],
            None => raw[r] - self.row_lower[r],
        })
    }

    /// Start strictly inside the bounds.
    fn push_interior(&self, w: &mut DVector<f64>) {
        for i in 0..self.n_ext {
            let (l, u) = (self.lower[i], self.upper[i]);
            w[i] = match (l.is_finite(), u.is_finite()) {
                (true, true) => {
                    let pad = (0.01 * (u - l)).min(0.01);
                    if u - l < 1e-12 {
                        0.5 * (l + u)
                    } else {
                        w[i].clamp(l + pad, u - pad)
                    }
                }
                (true, false) => w[i].max(l + 0.01 * l.abs().max(1.0)),
                (false, true) => w[i].min(u - 0.01 * u.abs().max(1.0)),
                (false, false) => w[i],
            };
        }
    }
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

impl NlpSolver for InteriorPointSolver {
    fn solve(&self, problem: &NlpProblem, options: &SolverOptions) -> Solution {
        let form = SlackForm::new(problem);
        let n = form.n;
        let n_ext = form.n_ext;
        let m = problem.num_rows();

        // Primal start: supplied guess, slacks matching the raw row values,
        // everything pushed strictly inside its bounds.
        let mut w = DVector::zeros(n_ext);
        w.rows_mut(0, n).copy_from(&problem.x0);
        let raw0 = problem.constraint_values(&problem.x0);
        for r in 0..m {
            if let Some(idx) = form.slack_of_row[r] {
                w[idx] = raw0[r];
            }
        }
        form.push_interior(&mut w);

        let mut mu = options.mu_init;
        let mut lambda = DVector::zeros(m);
        let mut z_lo = DVector::zeros(n_ext);
        let mut z_up = DVector::zeros(n_ext);
        for i in 0..n_ext {
            if form.lower[i].is_finite() {
                z_lo[i] = mu / (w[i] - form.lower[i]);
            }
            if form.upper[i].is_finite() {
                z_up[i] = mu / (form.upper[i] - w[i]);
            }
        }

        let hess_diag = {
            let mut diag = DVector::zeros(n_ext);
            diag.rows_mut(0, n)
                .copy_from(&problem.objective_hessian_diag());
            diag
        };

        let barrier = |w: &DVector<f64>| -> f64 {
            let mut sum = 0.0;
            for i in 0..n_ext {
                if form.lower[i].is_finite() {
                    sum += (w[i] - form.lower[i]).ln();
                }
                if form.upper[i].is_finite() {
                    sum += (form.upper[i] - w[i]).ln();
                }
            }
            sum
        };

        let mut nu: f64 = 10.0;
        let mut delta_w = 0.0;
        let mut iterations = 0;
        let mut status = SolverStatus::IterationLimit;
        let mut last_err = f64::INFINITY;
        let mut last_violation = f64::INFINITY;

        for iter in 0..options.max_iterations {
            iterations = iter;
            let z = w.rows(0, n).into_owned();
            let raw = problem.constraint_values(&z);
            let residual = form.residual(&raw, &w);
            let jac = problem.constraint_jacobian(&z);

            // Extended Jacobian: model columns plus −1 per slack.
            let mut a = DMatrix::zeros(m, n_ext);
            a.view_mut((0, 0), (m, n)).copy_from(&jac);
            for r in 0..m {
                if let Some(idx) = form.slack_of_row[r] {
                    a[(r, idx)] = -1.0;
                }
            }

            let mut grad = DVector::zeros(n_ext);
            grad.rows_mut(0, n)
                .copy_from(&problem.objective_gradient(&z));

            // Unscaled KKT error (complementarity at μ = 0) and its
            // barrier-centered counterpart for the μ schedule.
            let dual_res = &grad + a.transpose() * &lambda - &z_lo + &z_up;
            let d_inf = inf_norm(&dual_res);
            let p_inf = inf_norm(&residual);
            let mut comp_zero: f64 = 0.0;
            let mut comp_mu: f64 = 0.0;
            for i in 0..n_ext {
                if form.lower[i].is_finite() {
                    let prod = z_lo[i] * (w[i] - form.lower[i]);
                    comp_zero = comp_zero.max(prod.abs());
                    comp_mu = comp_mu.max((prod - mu).abs());
                }
                if form.upper[i].is_finite() {
                    let prod = z_up[i] * (form.upper[i] - w[i]);
                    comp_zero = comp_zero.max(prod.abs());
                    comp_mu = comp_mu.max((prod - mu).abs());
                }
            }
            let err = d_inf.max(p_inf).max(comp_zero);
            last_err = err;
            last_violation = p_inf;
            trace!(
                "ip iter {iter}: err {err:.3e} (dual {d_inf:.3e}, primal {p_inf:.3e}), mu {mu:.3e}"
            );

            if err <= options.tolerance {
                status = SolverStatus::Optimal;
                break;
            }

            // Monotone barrier reduction once the μ-subproblem is solved
            // well enough.
            if d_inf.max(p_inf).max(comp_mu) <= 10.0 * mu && mu > options.tolerance / 10.0 {
                mu = ((0.2 * mu).min(mu.powf(1.5))).max(options.tolerance / 10.0);
                debug!("ip iter {iter}: barrier down to {mu:.3e}");
            }

            // Condensed primal-dual system with the barrier diagonal.
            let mut sigma: DVector<f64> = DVector::zeros(n_ext);
            let mut barrier_grad = DVector::zeros(n_ext);
            for i in 0..n_ext {
                if form.lower[i].is_finite() {
                    let gap = w[i] - form.lower[i];
                    sigma[i] += z_lo[i] / gap;
                    barrier_grad[i] -= mu / gap;
                }
                if form.upper[i].is_finite() {
                    let gap = form.upper[i] - w[i];
                    sigma[i] += z_up[i] / gap;
                    barrier_grad[i] += mu / gap;
                }
            }

            let rhs_top = -(&grad + a.transpose() * &lambda) - &barrier_grad;
            let dim = n_ext + m;
            let mut step = None;
            loop {
                let mut kkt = DMatrix::zeros(dim, dim);
                for i in 0..n_ext {
                    kkt[(i, i)] = hess_diag[i] + sigma[i] + delta_w;
                }
                kkt.view_mut((n_ext, 0), (m, n_ext)).copy_from(&a);
                kkt.view_mut((0, n_ext), (n_ext, m))
                    .copy_from(&a.transpose());
                for r in 0..m {
                    kkt[(n_ext + r, n_ext + r)] = -DELTA_C;
                }
                let mut rhs = DVector::zeros(dim);
                rhs.rows_mut(0, n_ext).copy_from(&rhs_top);
                for r in 0..m {
                    rhs[n_ext + r] = -residual[r];
                }

                match kkt.lu().solve(&rhs) {
                    Some(sol) if sol.iter().all(|x| x.is_finite()) => {
                        step = Some(sol);
                        break;
                    }
                    _ => {
                        delta_w = if delta_w == 0.0 {
                            DELTA_W_MIN
                        } else {
                            delta_w * 100.0
                        };
                        debug!("ip iter {iter}: singular KKT, delta_w {delta_w:.1e}");
                        if delta_w > DELTA_W_MAX {
                            break;
                        }
                    }
                }
            }
            let Some(step) = step else {
                status = SolverStatus::Failed;
                break;
            };
            let dw = step.rows(0, n_ext).into_owned();
            let dl = step.rows(n_ext, m).into_owned();

            let mut dz_lo = DVector::zeros(n_ext);
            let mut dz_up = DVector::zeros(n_ext);
            for i in 0..n_ext {
                if form.lower[i].is_finite() {
                    let gap = w[i] - form.lower[i];
                    dz_lo[i] = mu / gap - z_lo[i] - z_lo[i] / gap * dw[i];
                }
                if form.upper[i].is_finite() {
                    let gap = form.upper[i] - w[i];
                    dz_up[i] = mu / gap - z_up[i] + z_up[i] / gap * dw[i];
                }
            }

            // Fraction-to-boundary step caps.
            let mut alpha_primal: f64 = 1.0;
            let mut alpha_dual: f64 = 1.0;
            for i in 0..n_ext {
                if form.lower[i].is_finite() {
                    if dw[i] < 0.0 {
                        alpha_primal =
                            alpha_primal.min(-TAU * (w[i] - form.lower[i]) / dw[i]);
                    }
                    if dz_lo[i] < 0.0 {
                        alpha_dual = alpha_dual.min(-TAU * z_lo[i] / dz_lo[i]);
                    }
                }
                if form.upper[i].is_finite() {
                    if dw[i] > 0.0 {
                        alpha_primal =
                            alpha_primal.min(TAU * (form.upper[i] - w[i]) / dw[i]);
                    }
                    if dz_up[i] < 0.0 {
                        alpha_dual = alpha_dual.min(-TAU * z_up[i] / dz_up[i]);
                    }
                }
            }

            // ℓ1 merit line search along the primal direction.
            nu = nu.max(2.0 * inf_norm(&(&lambda + &dl)) + 1.0);
            let merit = |w_try: &DVector<f64>| -> f64 {
                let z_try = w_try.rows(0, n).into_owned();
                let raw_try = problem.constraint_values(&z_try);
                let res_try = form.residual(&raw_try, w_try);
                problem.objective(&z_try) - mu * barrier(w_try)
                    + nu * res_try.iter().map(|r| r.abs()).sum::<f64>()
            };
            let psi0 = problem.objective(&z) - mu * barrier(&w)
                + nu * residual.iter().map(|r| r.abs()).sum::<f64>();
            let dir_deriv = (&grad + &barrier_grad).dot(&dw)
                - nu * residual.iter().map(|r| r.abs()).sum::<f64>();

            let mut alpha = alpha_primal;
            let mut accepted = false;
            for _ in 0..30 {
                let w_try = &w + &dw * alpha;
                let psi_try = merit(&w_try);
                let sufficient = if dir_deriv < 0.0 {
                    psi_try <= psi0 + 1e-4 * alpha * dir_deriv
                } else {
                    psi_try < psi0
                };
                if psi_try.is_finite() && sufficient {
                    accepted = true;
                    break;
                }
                alpha *= 0.5;
            }
            if !accepted {
                // Crawl forward and lean on regularization next round.
                delta_w = (delta_w * 10.0).max(DELTA_W_MIN * 100.0);
                debug!("ip iter {iter}: line search stalled, delta_w {delta_w:.1e}");
            } else if delta_w > 0.0 {
                delta_w = (delta_w / 3.0).max(0.0);
                if delta_w < DELTA_W_MIN {
                    delta_w = 0.0;
                }
            }

            w += &dw * alpha;
            lambda += &dl * alpha;
            z_lo += &dz_lo * alpha_dual;
            z_up += &dz_up * alpha_dual;

            // Keep the bound multipliers tied to the barrier.
            for i in 0..n_ext {
                if form.lower[i].is_finite() {
                    let gap = w[i] - form.lower[i];
                    z_lo[i] = z_lo[i]
                        .clamp(mu / (KAPPA_SIGMA * gap), KAPPA_SIGMA * mu / gap);
                }
                if form.upper[i].is_finite() {
                    let gap = form.upper[i] - w[i];
                    z_up[i] = z_up[i]
                        .clamp(mu / (KAPPA_SIGMA * gap), KAPPA_SIGMA * mu / gap);
                }
            }
        }

        // Status from the final iterate when the loop ran out.
        if status == SolverStatus::IterationLimit {
            let z = w.rows(0, n).into_owned();
            let raw = problem.constraint_values(&z);
            let residual = form.residual(&raw, &w);
            last_violation = inf_norm(&residual);
            if last_err <= options.acceptable_tolerance {
                status = SolverStatus::Acceptable;
            }
        }

        let z = w.rows(0, n).into_owned();
        let objective = problem.objective(&z);
        debug!(
            "ip finished: {status:?} after {iterations} iterations, objective {objective:.6}, err {last_err:.3e}"
        );
        Solution {
            status,
            variables: z,
            objective,
            constraint_violation: last_violation,
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{MecanumModel, RobotParams};
    use crate::nlp::{ConstraintBlock, Term, VarLayout};
    use approx::assert_relative_eq;

    /// Two bounded variables with a linear time-like objective; constraint
    /// blocks vary per test.
    fn two_var_problem(blocks: Vec<ConstraintBlock>, x0: [f64; 2]) -> NlpProblem {
        let layout = VarLayout {
            knots: 0,
            intervals: 0,
            segments: 2,
        };
        NlpProblem {
            layout,
            model: MecanumModel::new(RobotParams::default()),
            lower: DVector::from_element(2, 0.01),
            upper: DVector::from_element(2, 1.0),
            x0: DVector::from_column_slice(&x0),
            objective_linear: DVector::from_element(2, 1.0),
            control_effort_weight: 0.0,
            blocks,
        }
    }

    #[test]
    fn linear_inequality_becomes_active() {
        // min x0 + x1  s.t.  x0 + x1 ≥ 1, both in [0.01, 1].
        let problem = two_var_problem(
            vec![ConstraintBlock {
                vars: vec![0, 1],
                lower: vec![1.0],
                upper: vec![f64::INFINITY],
                term: Term::Linear {
                    coeffs: vec![1.0, 1.0],
                    offset: 0.0,
                },
            }],
            [0.5, 0.5],
        );
        let solution = InteriorPointSolver::new().solve(&problem, &SolverOptions::default());
        assert!(solution.status.is_success(), "status {:?}", solution.status);
        assert_relative_eq!(solution.objective, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn equality_row_pins_its_variable() {
        // min x0 + x1  s.t.  x0 = 0.4; x1 slides to its lower bound.
        let problem = two_var_problem(
            vec![ConstraintBlock {
                vars: vec![0],
                lower: vec![0.4],
                upper: vec![0.4],
                term: Term::Linear {
                    coeffs: vec![1.0],
                    offset: 0.0,
                },
            }],
            [0.9, 0.9],
        );
        let solution = InteriorPointSolver::new().solve(&problem, &SolverOptions::default());
        assert!(solution.status.is_success(), "status {:?}", solution.status);
        assert_relative_eq!(solution.variables[0], 0.4, epsilon = 1e-4);
        assert_relative_eq!(solution.variables[1], 0.01, epsilon = 1e-3);
    }

    #[test]
    fn nonlinear_keep_out_is_respected() {
        // min x0 + x1  s.t.  x0² + x1² ≥ 0.25: the optimum sits on the
        // circle at the symmetric point.
        let problem = two_var_problem(
            vec![ConstraintBlock {
                vars: vec![0, 1],
                lower: vec![0.25],
                upper: vec![f64::INFINITY],
                term: Term::DistSq { cx: 0.0, cy: 0.0 },
            }],
            [0.8, 0.8],
        );
        let solution = InteriorPointSolver::new().solve(&problem, &SolverOptions::default());
        assert!(solution.status.is_success(), "status {:?}", solution.status);
        let expected = 0.5 / 2.0_f64.sqrt();
        assert_relative_eq!(solution.variables[0], expected, epsilon = 1e-3);
        assert_relative_eq!(solution.variables[1], expected, epsilon = 1e-3);
        assert!(solution.constraint_violation <= 1e-6);
    }

    #[test]
    fn infeasible_problem_reports_no_success() {
        // x0 pinned to 2.0 against an upper bound of 1.0.
        let problem = two_var_problem(
            vec![ConstraintBlock {
                vars: vec![0],
                lower: vec![2.0],
                upper: vec![2.0],
                term: Term::Linear {
                    coeffs: vec![1.0],
                    offset: 0.0,
                },
            }],
            [0.5, 0.5],
        );
        let options = SolverOptions {
            max_iterations: 60,
            ..Default::default()
        };
        let solution = InteriorPointSolver::new().solve(&problem, &options);
        assert!(!solution.status.is_success());
        assert!(solution.constraint_violation > 0.1);
        // The last iterate is still handed back for inspection.
        assert_eq!(solution.variables.len(), 2);
    }
}
