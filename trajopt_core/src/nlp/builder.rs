//! Assembles the free-time NLP: variable bounds, shooting defects, waypoint
//! constraints, actuator and traction limits, and the path constraints,
//! all indexed over the knot grid.

use nalgebra::DVector;

use crate::constraint::{PathConstraint, PathConstraintKind};
use crate::dynamics::mecanum::{MecanumModel, OMEGA, PX, PY, THETA, VX, VY};
use crate::grid::SegmentGrid;
use crate::waypoint::{Waypoint, WaypointKind};

use super::{ConstraintBlock, NlpProblem, Term, VarLayout};

/// Tolerance added to the heading-tangent bound so an exact standstill
/// stays feasible.
const HEADING_TANGENT_EPS: f64 = 1e-6;

/// Knobs that shape the NLP beyond the waypoint list.
#[derive(Debug, Clone, Copy)]
pub struct BuilderConfig {
    /// Per-interval time step bounds (s); enforced as variable bounds.
    pub dt_min: f64,
    pub dt_max: f64,
    /// Quadratic penalty on control effort (0 = pure time-optimal).
    pub control_effort_weight: f64,
}

/// Single-variable equality, emitted as a linear row so the barrier terms
/// on variable bounds stay finite.
fn pin(var: usize, value: f64) -> ConstraintBlock {
    ConstraintBlock {
        vars: vec![var],
        lower: vec![value],
        upper: vec![value],
        term: Term::Linear {
            coeffs: vec![1.0],
            offset: 0.0,
        },
    }
}

fn bounded_row(var: usize, lower: f64, upper: f64) -> ConstraintBlock {
    ConstraintBlock {
        vars: vec![var],
        lower: vec![lower],
        upper: vec![upper],
        term: Term::Linear {
            coeffs: vec![1.0],
            offset: 0.0,
        },
    }
}

pub fn build_problem(
    model: MecanumModel,
    waypoints: &[Waypoint],
    constraints: &[PathConstraint],
    grid: &SegmentGrid,
    config: &BuilderConfig,
    x0: DVector<f64>,
) -> NlpProblem {
    let layout = VarLayout {
        knots: grid.num_knots(),
        intervals: grid.num_intervals(),
        segments: grid.num_segments(),
    };
    let n = layout.num_vars();
    debug_assert_eq!(x0.len(), n);

    // Variable bounds: time steps, per-axis commands, and the per-segment
    // velocity envelopes taken from the waypoint that starts each segment.
    let mut lower = DVector::from_element(n, f64::NEG_INFINITY);
    let mut upper = DVector::from_element(n, f64::INFINITY);
    for s in 0..layout.segments {
        lower[layout.dt(s)] = config.dt_min;
        upper[layout.dt(s)] = config.dt_max;
    }
    for k in 0..layout.intervals {
        for idx in layout.control_indices(k) {
            lower[idx] = -1.0;
            upper[idx] = 1.0;
        }
    }
    for k in 0..layout.knots {
        let wp = &waypoints[grid.segment_of_knot(k)];
        for i in [VX, VY] {
            lower[layout.state(k, i)] = -wp.v_max;
            upper[layout.state(k, i)] = wp.v_max;
        }
        lower[layout.state(k, OMEGA)] = -wp.omega_max;
        upper[layout.state(k, OMEGA)] = wp.omega_max;
    }

    let mut blocks = Vec::new();

    // Shooting defects, one per interval, each sharing its segment's Δt.
    for k in 0..layout.intervals {
        let segment = grid.segment_of_interval(k);
        blocks.push(ConstraintBlock {
            vars: layout
                .state_indices(k)
                .chain(layout.control_indices(k))
                .chain(layout.state_indices(k + 1))
                .chain([layout.dt(segment)])
                .collect(),
            lower: vec![0.0; 6],
            upper: vec![0.0; 6],
            term: Term::Defect,
        });
    }

    // Waypoint constraints at their pinned knots.
    for (i, wp) in waypoints.iter().enumerate() {
        let knot = grid.knot_of_waypoint(i);
        let px = layout.state(knot, PX);
        let py = layout.state(knot, PY);
        let theta = layout.state(knot, THETA);
        let vx = layout.state(knot, VX);
        let vy = layout.state(knot, VY);
        let omega = layout.state(knot, OMEGA);

        match wp.kind {
            WaypointKind::Constrained => {
                blocks.push(pin(px, wp.x));
                blocks.push(pin(py, wp.y));
                blocks.push(pin(theta, grid.unwrapped_heading(i)));
            }
            WaypointKind::Unconstrained => {
                blocks.push(pin(px, wp.x));
                blocks.push(pin(py, wp.y));
            }
            WaypointKind::Intake => {
                // On the approach circle, facing the intake point; the
                // sine/cosine pair avoids the atan2 jump at ±π.
                blocks.push(ConstraintBlock {
                    vars: vec![px, py],
                    lower: vec![wp.intake_distance * wp.intake_distance],
                    upper: vec![wp.intake_distance * wp.intake_distance],
                    term: Term::DistSq {
                        cx: wp.intake_x,
                        cy: wp.intake_y,
                    },
                });
                blocks.push(ConstraintBlock {
                    vars: vec![px, py, theta],
                    lower: vec![0.0, 0.0],
                    upper: vec![0.0, f64::INFINITY],
                    term: Term::IntakeFacing {
                        ix: wp.intake_x,
                        iy: wp.intake_y,
                    },
                });
                let sin_slack = wp.intake_velocity_slack.sin();
                blocks.push(ConstraintBlock {
                    vars: vec![vx, vy, theta],
                    lower: vec![
                        f64::NEG_INFINITY,
                        f64::NEG_INFINITY,
                        0.0,
                    ],
                    upper: vec![
                        wp.intake_velocity_max * wp.intake_velocity_max,
                        0.0,
                        f64::INFINITY,
                    ],
                    term: Term::IntakeVelocity {
                        sin_slack_sq: sin_slack * sin_slack,
                    },
                });
                blocks.push(pin(omega, 0.0));
            }
        }

        if wp.stop {
            blocks.push(pin(vx, 0.0));
            blocks.push(pin(vy, 0.0));
            // An intake waypoint already pins omega.
            if wp.kind != WaypointKind::Intake {
                blocks.push(pin(omega, 0.0));
            }
        }
    }

    // Actuator and traction limits at every interval.
    let f_max = model.params().f_traction_max;
    for k in 0..layout.intervals {
        blocks.push(ConstraintBlock {
            vars: layout.control_indices(k).collect(),
            lower: vec![-1.0; 4],
            upper: vec![1.0; 4],
            term: Term::WheelDuties,
        });
        blocks.push(ConstraintBlock {
            vars: layout
                .state_indices(k)
                .chain(layout.control_indices(k))
                .collect(),
            lower: vec![-f_max; 4],
            upper: vec![f_max; 4],
            term: Term::WheelForces,
        });
    }

    // Path constraints over their knot spans.
    for constraint in constraints.iter().filter(|c| c.enabled) {
        let (lo, hi) = grid.knot_span(constraint.from_waypoint, constraint.to_waypoint);
        for knot in lo..=hi {
            let px = layout.state(knot, PX);
            let py = layout.state(knot, PY);
            let vx = layout.state(knot, VX);
            let vy = layout.state(knot, VY);
            let theta = layout.state(knot, THETA);
            let omega = layout.state(knot, OMEGA);

            match constraint.kind {
                PathConstraintKind::CircleObstacle { cx, cy, radius } => {
                    blocks.push(ConstraintBlock {
                        vars: vec![px, py],
                        lower: vec![radius * radius],
                        upper: vec![f64::INFINITY],
                        term: Term::DistSq { cx, cy },
                    });
                }
                PathConstraintKind::RectObstacle {
                    x,
                    y,
                    width,
                    height,
                } => {
                    blocks.push(ConstraintBlock {
                        vars: vec![px, py],
                        lower: vec![1.0],
                        upper: vec![f64::INFINITY],
                        term: Term::SuperEllipse {
                            cx: x + width / 2.0,
                            cy: y + height / 2.0,
                            half_w: width / 2.0,
                            half_h: height / 2.0,
                        },
                    });
                }
                PathConstraintKind::StayInRect {
                    x,
                    y,
                    width,
                    height,
                } => {
                    blocks.push(bounded_row(px, x, x + width));
                    blocks.push(bounded_row(py, y, y + height));
                }
                PathConstraintKind::StayInLane { width } => {
                    let a = grid.effective_position(constraint.from_waypoint);
                    let b = grid.effective_position(constraint.to_waypoint);
                    let axis = b - a;
                    let len = axis.norm();
                    if len < 1e-9 {
                        // Coincident endpoints define no lane direction.
                        continue;
                    }
                    let t = axis / len;
                    blocks.push(ConstraintBlock {
                        vars: vec![px, py],
                        lower: vec![-width / 2.0],
                        upper: vec![width / 2.0],
                        term: Term::Linear {
                            coeffs: vec![-t.y, t.x],
                            offset: t.y * a.x - t.x * a.y,
                        },
                    });
                }
                PathConstraintKind::HeadingTangent { slack } => {
                    blocks.push(ConstraintBlock {
                        vars: vec![vx, vy, theta],
                        lower: vec![f64::NEG_INFINITY],
                        upper: vec![HEADING_TANGENT_EPS],
                        term: Term::HeadingTangent { slack },
                    });
                }
                PathConstraintKind::MaxVelocity { v_max } => {
                    blocks.push(ConstraintBlock {
                        vars: vec![vx, vy],
                        lower: vec![f64::NEG_INFINITY],
                        upper: vec![v_max * v_max],
                        term: Term::DistSq { cx: 0.0, cy: 0.0 },
                    });
                }
                PathConstraintKind::MaxOmega { omega_max } => {
                    blocks.push(bounded_row(omega, -omega_max, omega_max));
                }
            }
        }
    }

    // Objective: total time Σ n_s·Δt_s, plus the optional effort penalty.
    let mut objective_linear = DVector::zeros(n);
    for s in 0..layout.segments {
        objective_linear[layout.dt(s)] = grid.intervals_in(s) as f64;
    }

    NlpProblem {
        layout,
        model,
        lower,
        upper,
        x0,
        objective_linear,
        control_effort_weight: config.control_effort_weight,
        blocks,
    }
}
