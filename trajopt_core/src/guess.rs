//! Straight-line initial guess.
//!
//! Positions interpolate between the effective waypoint positions, headings
//! interpolate along the shortest angular delta, velocities are the
//! straight-line finite difference, and controls start at zero. Intake
//! waypoints enter through their approach-ray effective positions, so the
//! guess starts near — not on — the approach circle.

use nalgebra::DVector;

use crate::dynamics::mecanum::{PX, PY, THETA, VX, VY};
use crate::grid::SegmentGrid;
use crate::nlp::VarLayout;
use crate::utils::math::shortest_angle_delta;

/// Conservative cruise speed used to seed the segment times (m/s).
const AVG_SPEED: f64 = 1.0;

/// Shortest time any segment is seeded with (s), so zero-length segments
/// still get a usable step.
const MIN_SEGMENT_TIME: f64 = 0.1;

pub fn initial_guess(
    grid: &SegmentGrid,
    layout: &VarLayout,
    dt_min: f64,
    dt_max: f64,
) -> DVector<f64> {
    let mut z = DVector::zeros(layout.num_vars());

    for s in 0..grid.num_segments() {
        let seg_time = (grid.segment_dist(s) / AVG_SPEED).max(MIN_SEGMENT_TIME);
        let dt = (seg_time / grid.intervals_in(s) as f64).clamp(dt_min, dt_max);
        z[layout.dt(s)] = dt;
    }

    let last_knot = layout.knots - 1;
    for k in 0..layout.knots {
        let s = grid.segment_of_knot(k);
        let progress = (k - grid.segment_start(s)) as f64 / grid.intervals_in(s) as f64;

        let a = grid.effective_position(s);
        let b = grid.effective_position(s + 1);
        let theta_a = grid.guess_heading(s);
        let delta_theta = shortest_angle_delta(theta_a, grid.guess_heading(s + 1));

        z[layout.state(k, PX)] = a.x + progress * (b.x - a.x);
        z[layout.state(k, PY)] = a.y + progress * (b.y - a.y);
        z[layout.state(k, THETA)] = theta_a + progress * delta_theta;

        if k < last_knot {
            let seg_time = (grid.segment_dist(s) / AVG_SPEED).max(MIN_SEGMENT_TIME);
            z[layout.state(k, VX)] = (b.x - a.x) / seg_time;
            z[layout.state(k, VY)] = (b.y - a.y) / seg_time;
        }
        // omega and the final-knot velocities stay zero, as do all controls.
    }

    z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SamplingParams;
    use crate::waypoint::Waypoint;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn layout_for(grid: &SegmentGrid) -> VarLayout {
        VarLayout {
            knots: grid.num_knots(),
            intervals: grid.num_intervals(),
            segments: grid.num_segments(),
        }
    }

    fn sampling(rho: f64, mu: usize) -> SamplingParams {
        SamplingParams {
            samples_per_meter: rho,
            min_samples_per_segment: mu,
        }
    }

    #[test]
    fn endpoints_match_effective_positions() {
        let waypoints = [Waypoint::at(0.0, 0.0, 0.0), Waypoint::at(2.0, 1.0, 0.0)];
        let grid = SegmentGrid::new(&waypoints, sampling(5.0, 3));
        let layout = layout_for(&grid);
        let z = initial_guess(&grid, &layout, 0.01, 1.0);

        assert_relative_eq!(z[layout.state(0, PX)], 0.0);
        assert_relative_eq!(z[layout.state(0, PY)], 0.0);
        let last = layout.knots - 1;
        assert_relative_eq!(z[layout.state(last, PX)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(z[layout.state(last, PY)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn segment_time_seed_is_distance_over_cruise_speed() {
        let waypoints = [Waypoint::at(0.0, 0.0, 0.0), Waypoint::at(2.0, 0.0, 0.0)];
        let grid = SegmentGrid::new(&waypoints, sampling(5.0, 3));
        let layout = layout_for(&grid);
        let z = initial_guess(&grid, &layout, 0.01, 1.0);
        // 2 m at 1 m/s over 10 intervals.
        assert_relative_eq!(z[layout.dt(0)], 0.2);
    }

    #[test]
    fn zero_length_segment_gets_the_floor_time() {
        let waypoints = [Waypoint::at(1.0, 1.0, 0.0), Waypoint::at(1.0, 1.0, 0.0)];
        let grid = SegmentGrid::new(&waypoints, sampling(20.0, 4));
        let layout = layout_for(&grid);
        let z = initial_guess(&grid, &layout, 0.01, 1.0);
        assert_relative_eq!(z[layout.dt(0)], 0.1 / 4.0);
    }

    #[test]
    fn heading_interpolates_the_short_way() {
        let waypoints = [
            Waypoint::at(0.0, 0.0, 0.0),
            Waypoint::at(1.0, 0.0, 3.0 * PI / 2.0),
        ];
        let grid = SegmentGrid::new(&waypoints, sampling(5.0, 4));
        let layout = layout_for(&grid);
        let z = initial_guess(&grid, &layout, 0.01, 1.0);
        // Unwrapping turns 3π/2 into −π/2; every interpolated heading stays
        // inside [−π/2, 0].
        for k in 0..layout.knots {
            let theta = z[layout.state(k, THETA)];
            assert!((-PI / 2.0 - 1e-12..=1e-12).contains(&theta));
        }
        let last = layout.knots - 1;
        assert_relative_eq!(z[layout.state(last, THETA)], -PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn velocities_are_straight_line_estimates_and_final_knot_rests() {
        let waypoints = [Waypoint::at(0.0, 0.0, 0.0), Waypoint::at(3.0, 0.0, 0.0)];
        let grid = SegmentGrid::new(&waypoints, sampling(2.0, 3));
        let layout = layout_for(&grid);
        let z = initial_guess(&grid, &layout, 0.01, 1.0);
        assert_relative_eq!(z[layout.state(0, VX)], 1.0);
        assert_relative_eq!(z[layout.state(0, VY)], 0.0);
        let last = layout.knots - 1;
        assert_relative_eq!(z[layout.state(last, VX)], 0.0);
    }

    #[test]
    fn controls_start_at_zero() {
        let waypoints = [Waypoint::at(0.0, 0.0, 0.0), Waypoint::at(1.0, 0.0, 0.0)];
        let grid = SegmentGrid::new(&waypoints, sampling(5.0, 3));
        let layout = layout_for(&grid);
        let z = initial_guess(&grid, &layout, 0.01, 1.0);
        for k in 0..layout.intervals {
            for idx in layout.control_indices(k) {
                assert_relative_eq!(z[idx], 0.0);
            }
        }
    }
}
