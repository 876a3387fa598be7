//! Knot grid construction.
//!
//! Waypoints are joined by segments; each segment is split into a number of
//! RK4 intervals proportional to its straight-line length. The grid is
//! shared by the constraint builder, the initial-guess builder and the
//! solution extractor, so all three agree on which knot belongs to which
//! segment.

use itertools::Itertools;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::utils::math::unwrap_headings;
use crate::waypoint::{Waypoint, WaypointKind};

/// Sampling densities for the discretizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Target knot density along each segment (1/m).
    pub samples_per_meter: f64,
    /// Lower bound on intervals per segment, so short or zero-length
    /// segments still discretize.
    pub min_samples_per_segment: usize,
}

impl Default for SamplingParams {
    fn default() -> Self {
        SamplingParams {
            samples_per_meter: 20.0,
            min_samples_per_segment: 3,
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.samples_per_meter.is_finite()
            || !(1.0..=100.0).contains(&self.samples_per_meter)
        {
            return Err(Error::SamplesPerMeterOutOfRange(self.samples_per_meter));
        }
        if !(1..=50).contains(&self.min_samples_per_segment) {
            return Err(Error::MinSamplesOutOfRange(self.min_samples_per_segment));
        }
        Ok(())
    }
}

/// The discrete grid: one knot per state sample, one interval per control
/// sample, one shared time step per segment.
#[derive(Debug, Clone)]
pub struct SegmentGrid {
    /// Straight-line target position per waypoint; intake waypoints map
    /// onto their approach ray instead of their (unused) pose fields.
    effective: Vec<Point2<f64>>,
    /// Unwrapped heading targets, used by the heading equality constraints.
    unwrapped: Vec<f64>,
    /// Heading targets for interpolation; intake entries face the intake
    /// point from the effective position.
    guess_headings: Vec<f64>,
    dists: Vec<f64>,
    intervals: Vec<usize>,
    /// Segment start indices `S`, with a final entry equal to the total
    /// interval count.
    starts: Vec<usize>,
}

impl SegmentGrid {
    /// Builds the grid. Waypoints must already be validated (at least two).
    pub fn new(waypoints: &[Waypoint], sampling: SamplingParams) -> Self {
        debug_assert!(waypoints.len() >= 2);

        let effective = effective_positions(waypoints);
        let unwrapped = unwrap_headings(waypoints.iter().map(|wp| wp.heading));
        let guess_headings = waypoints
            .iter()
            .enumerate()
            .map(|(i, wp)| match wp.kind {
                WaypointKind::Intake => {
                    let e = effective[i];
                    (wp.intake_y - e.y).atan2(wp.intake_x - e.x)
                }
                _ => unwrapped[i],
            })
            .collect();

        let dists: Vec<f64> = effective
            .iter()
            .tuple_windows()
            .map(|(a, b)| (b - a).norm())
            .collect();

        let intervals: Vec<usize> = dists
            .iter()
            .map(|dist| {
                let target = (dist * sampling.samples_per_meter).ceil() as usize;
                target.max(sampling.min_samples_per_segment)
            })
            .collect();

        let mut starts = Vec::with_capacity(intervals.len() + 1);
        starts.push(0);
        for n in &intervals {
            starts.push(starts.last().unwrap() + n);
        }

        SegmentGrid {
            effective,
            unwrapped,
            guess_headings,
            dists,
            intervals,
            starts,
        }
    }

    pub fn num_segments(&self) -> usize {
        self.intervals.len()
    }

    /// Total interval count `N`.
    pub fn num_intervals(&self) -> usize {
        *self.starts.last().unwrap()
    }

    /// Total knot count `K = N + 1`.
    pub fn num_knots(&self) -> usize {
        self.num_intervals() + 1
    }

    pub fn intervals_in(&self, segment: usize) -> usize {
        self.intervals[segment]
    }

    pub fn segment_start(&self, segment: usize) -> usize {
        self.starts[segment]
    }

    pub fn segment_dist(&self, segment: usize) -> f64 {
        self.dists[segment]
    }

    /// The unique segment `s` with `S[s] <= k < S[s+1]`.
    pub fn segment_of_interval(&self, interval: usize) -> usize {
        debug_assert!(interval < self.num_intervals());
        self.starts.partition_point(|&start| start <= interval) - 1
    }

    /// Segment a knot belongs to; boundary knots count toward the segment
    /// they start (the last knot belongs to the last segment).
    pub fn segment_of_knot(&self, knot: usize) -> usize {
        self.segment_of_interval(knot.min(self.num_intervals() - 1))
    }

    /// Knot index that must satisfy waypoint `i`'s constraints.
    pub fn knot_of_waypoint(&self, waypoint: usize) -> usize {
        if waypoint == 0 {
            0
        } else if waypoint == self.effective.len() - 1 {
            self.num_knots() - 1
        } else {
            self.starts[waypoint]
        }
    }

    /// Inclusive knot range covered by a path constraint spanning the
    /// segments that start at `from_waypoint` through `to_waypoint`.
    pub fn knot_span(&self, from_waypoint: usize, to_waypoint: usize) -> (usize, usize) {
        let last_knot = self.num_knots() - 1;
        let lo = self.starts[from_waypoint.min(self.num_segments())];
        let hi = if to_waypoint + 1 < self.starts.len() {
            (self.starts[to_waypoint + 1] - 1).min(last_knot)
        } else {
            last_knot
        };
        (lo, hi)
    }

    pub fn effective_position(&self, waypoint: usize) -> Point2<f64> {
        self.effective[waypoint]
    }

    pub fn unwrapped_heading(&self, waypoint: usize) -> f64 {
        self.unwrapped[waypoint]
    }

    pub fn guess_heading(&self, waypoint: usize) -> f64 {
        self.guess_headings[waypoint]
    }
}

/// Straight-line target per waypoint. An intake waypoint sits on the
/// approach ray: `intake_d` back from the intake point toward the previous
/// effective position, or straight back along x when there is no usable
/// direction.
fn effective_positions(waypoints: &[Waypoint]) -> Vec<Point2<f64>> {
    let mut effective: Vec<Point2<f64>> = Vec::with_capacity(waypoints.len());
    for (i, wp) in waypoints.iter().enumerate() {
        let position = match wp.kind {
            WaypointKind::Intake => {
                let intake = Point2::new(wp.intake_x, wp.intake_y);
                let approach: Option<Vector2<f64>> = if i > 0 {
                    let dir = intake - effective[i - 1];
                    let dist = dir.norm();
                    (dist > 1e-6).then(|| dir / dist)
                } else {
                    None
                };
                match approach {
                    Some(dir) => intake - dir * wp.intake_distance,
                    None => Point2::new(wp.intake_x - wp.intake_distance, wp.intake_y),
                }
            }
            _ => Point2::new(wp.x, wp.y),
        };
        effective.push(position);
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_4;

    fn sampling(rho: f64, mu: usize) -> SamplingParams {
        SamplingParams {
            samples_per_meter: rho,
            min_samples_per_segment: mu,
        }
    }

    #[test]
    fn sampling_ranges_are_enforced() {
        assert!(sampling(20.0, 3).validate().is_ok());
        assert!(sampling(0.5, 3).validate().is_err());
        assert!(sampling(101.0, 3).validate().is_err());
        assert!(sampling(20.0, 0).validate().is_err());
        assert!(sampling(20.0, 51).validate().is_err());
    }

    #[test]
    fn interval_counts_follow_distance() {
        let waypoints = [
            Waypoint::at(0.0, 0.0, 0.0),
            Waypoint::at(1.0, 0.0, 0.0),
            Waypoint::at(1.0, 0.1, 0.0),
        ];
        let grid = SegmentGrid::new(&waypoints, sampling(20.0, 3));

        assert_eq!(grid.num_segments(), 2);
        assert_eq!(grid.intervals_in(0), 20);
        // 0.1 m at 20 samples/m rounds up to 2, below the minimum of 3.
        assert_eq!(grid.intervals_in(1), 3);
        assert_eq!(grid.num_intervals(), 23);
        assert_eq!(grid.num_knots(), 24);
    }

    #[test]
    fn starts_are_strictly_increasing_and_sum() {
        let waypoints = [
            Waypoint::at(0.0, 0.0, 0.0),
            Waypoint::at(0.5, 0.0, 0.0),
            Waypoint::at(2.0, 0.0, 0.0),
        ];
        let grid = SegmentGrid::new(&waypoints, sampling(10.0, 2));
        assert_eq!(grid.segment_start(0), 0);
        assert_eq!(grid.segment_start(1), grid.intervals_in(0));
        assert_eq!(
            grid.num_intervals(),
            grid.intervals_in(0) + grid.intervals_in(1)
        );
    }

    #[test]
    fn segment_lookup_matches_starts() {
        let waypoints = [
            Waypoint::at(0.0, 0.0, 0.0),
            Waypoint::at(0.5, 0.0, 0.0),
            Waypoint::at(1.0, 0.0, 0.0),
        ];
        let grid = SegmentGrid::new(&waypoints, sampling(10.0, 2));
        for k in 0..grid.num_intervals() {
            let s = grid.segment_of_interval(k);
            assert!(grid.segment_start(s) <= k);
            assert!(k < grid.segment_start(s) + grid.intervals_in(s));
        }
        assert_eq!(grid.segment_of_knot(grid.num_knots() - 1), 1);
    }

    #[test]
    fn waypoint_knots_pin_ends_and_interior() {
        let waypoints = [
            Waypoint::at(0.0, 0.0, 0.0),
            Waypoint::at(1.0, 0.0, 0.0),
            Waypoint::at(2.0, 0.0, 0.0),
        ];
        let grid = SegmentGrid::new(&waypoints, sampling(5.0, 2));
        assert_eq!(grid.knot_of_waypoint(0), 0);
        assert_eq!(grid.knot_of_waypoint(1), grid.segment_start(1));
        assert_eq!(grid.knot_of_waypoint(2), grid.num_knots() - 1);
    }

    #[test]
    fn knot_span_covers_requested_segments() {
        let waypoints = [
            Waypoint::at(0.0, 0.0, 0.0),
            Waypoint::at(1.0, 0.0, 0.0),
            Waypoint::at(2.0, 0.0, 0.0),
        ];
        let grid = SegmentGrid::new(&waypoints, sampling(5.0, 2));

        let (lo, hi) = grid.knot_span(0, 0);
        assert_eq!(lo, 0);
        assert_eq!(hi, grid.segment_start(1) - 1);

        // Spanning through the final waypoint covers every knot.
        let (lo, hi) = grid.knot_span(0, 2);
        assert_eq!(lo, 0);
        assert_eq!(hi, grid.num_knots() - 1);
    }

    #[test]
    fn zero_length_segment_falls_back_to_min_samples() {
        let waypoints = [
            Waypoint::at(1.0, 1.0, 0.0),
            Waypoint::at(1.0, 1.0, 0.0),
        ];
        let grid = SegmentGrid::new(&waypoints, sampling(50.0, 4));
        assert_eq!(grid.intervals_in(0), 4);
        assert_relative_eq!(grid.segment_dist(0), 0.0);
    }

    #[test]
    fn intake_effective_position_sits_on_approach_ray() {
        let waypoints = [
            Waypoint::at(0.0, 0.0, 0.0),
            Waypoint {
                intake_distance: 0.5,
                ..Waypoint::intake(2.0, 2.0)
            },
        ];
        let grid = SegmentGrid::new(&waypoints, sampling(10.0, 2));
        let e = grid.effective_position(1);
        // Half a meter back from (2, 2) toward the origin.
        let back = 0.5 / 2.0_f64.sqrt();
        assert_relative_eq!(e.x, 2.0 - back, epsilon = 1e-12);
        assert_relative_eq!(e.y, 2.0 - back, epsilon = 1e-12);
        assert_relative_eq!(grid.guess_heading(1), FRAC_PI_4, epsilon = 1e-12);
    }

    #[test]
    fn leading_intake_backs_off_along_x() {
        let waypoints = [
            Waypoint {
                intake_distance: 0.4,
                ..Waypoint::intake(1.0, 1.0)
            },
            Waypoint::at(0.0, 0.0, 0.0),
        ];
        let grid = SegmentGrid::new(&waypoints, sampling(10.0, 2));
        let e = grid.effective_position(0);
        assert_relative_eq!(e.x, 0.6);
        assert_relative_eq!(e.y, 1.0);
    }
}
