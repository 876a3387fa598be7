//! Mecanum drive dynamics.
//!
//! State vector (6 DOF): `[vx, vy, omega, px, py, theta]` with field-frame
//! velocities (m/s), yaw rate (rad/s), field-frame position (m) and heading
//! (rad). Control vector (3 DOF): `[drive, strafe, turn]`, normalized axis
//! commands that mix onto the four wheels FL, BL, BR, FR.

use crate::ode_solver::Vector;
use crate::utils::traits::Real;

use super::params::RobotParams;

pub type State<F = f64> = Vector<F, 6>;
pub type Control<F = f64> = Vector<F, 3>;

// State component indices.
pub const VX: usize = 0;
pub const VY: usize = 1;
pub const OMEGA: usize = 2;
pub const PX: usize = 3;
pub const PY: usize = 4;
pub const THETA: usize = 5;

/// Per-wheel duty mix (FL, BL, BR, FR) from the three axis commands.
#[inline]
pub fn wheel_duties<F: Real>(u: &Control<F>) -> Vector<F, 4> {
    let (drive, strafe, turn) = (u[0], u[1], u[2]);
    Vector::<F, 4>::from([
        drive - strafe - turn,
        drive + strafe - turn,
        drive - strafe + turn,
        drive + strafe + turn,
    ])
}

/// Closed-form mecanum model: continuous dynamics plus the wheel-force map
/// used by the traction constraints.
#[derive(Debug, Clone)]
pub struct MecanumModel {
    params: RobotParams,
}

impl MecanumModel {
    pub fn new(params: RobotParams) -> Self {
        MecanumModel { params }
    }

    pub fn params(&self) -> &RobotParams {
        &self.params
    }

    /// Wheel angular velocities (FL, BL, BR, FR) implied by the body motion.
    ///
    /// Rollers sit at 45°, so each wheel sees `(vx_r ± vy_r ± (lx+ly)·ω)/r`
    /// in its drive direction (standard X configuration).
    fn wheel_speeds<F: Real>(&self, x: &State<F>) -> Vector<F, 4> {
        let r = F::from_f64(self.params.wheel_radius);
        let k = F::from_f64(self.params.lx + self.params.ly);
        let (vx, vy, omega, theta) = (x[VX], x[VY], x[OMEGA], x[THETA]);

        // Field frame -> body frame (rotation by -theta).
        let (sin_t, cos_t) = (theta.sin(), theta.cos());
        let vx_r = vx * cos_t + vy * sin_t;
        let vy_r = -(vx * sin_t) + vy * cos_t;

        Vector::<F, 4>::from([
            (vx_r - vy_r - k * omega) / r,
            (vx_r + vy_r - k * omega) / r,
            (vx_r - vy_r + k * omega) / r,
            (vx_r + vy_r + k * omega) / r,
        ])
    }

    /// Ground-contact force per wheel (FL, BL, BR, FR).
    ///
    /// Motor torque follows the linear speed–torque curve
    /// `τ = t_max·(duty − ω_wheel/w_max)`; the contact force is `τ/r`.
    pub fn wheel_forces<F: Real>(&self, x: &State<F>, u: &Control<F>) -> Vector<F, 4> {
        let r = F::from_f64(self.params.wheel_radius);
        let t_max = F::from_f64(self.params.t_max);
        let w_max = F::from_f64(self.params.w_max);

        let duties = wheel_duties(u);
        let speeds = self.wheel_speeds(x);
        Vector::<F, 4>::from_fn(|i, _| t_max * (duties[i] - speeds[i] / w_max) / r)
    }

    /// Continuous dynamics `ẋ = f(x, u)`.
    pub fn state_derivative<F: Real>(&self, x: &State<F>, u: &Control<F>) -> State<F> {
        let m = F::from_f64(self.params.mass);
        let inertia = F::from_f64(self.params.inertia);
        let k = F::from_f64(self.params.lx + self.params.ly);

        let f = self.wheel_forces(x, u);
        let fx_r = f[0] + f[1] + f[2] + f[3];
        let fy_r = -f[0] + f[1] - f[2] + f[3];
        let tau = k * (-f[0] - f[1] + f[2] + f[3]);

        let ax_r = fx_r / m;
        let ay_r = fy_r / m;
        let alpha = tau / inertia;

        // Body frame -> field frame (rotation by +theta).
        let theta = x[THETA];
        let (sin_t, cos_t) = (theta.sin(), theta.cos());
        let ax = ax_r * cos_t - ay_r * sin_t;
        let ay = ax_r * sin_t + ay_r * cos_t;

        State::<F>::from([ax, ay, alpha, x[VX], x[VY], x[OMEGA]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn model() -> MecanumModel {
        MecanumModel::new(RobotParams::default())
    }

    #[test]
    fn duty_mix_matches_axis_commands() {
        let duties = wheel_duties(&Control::from([1.0, 0.0, 0.0]));
        assert_eq!(duties, Vector::<f64, 4>::from([1.0, 1.0, 1.0, 1.0]));

        let duties = wheel_duties(&Control::from([0.0, 1.0, 0.0]));
        assert_eq!(duties, Vector::<f64, 4>::from([-1.0, 1.0, -1.0, 1.0]));

        let duties = wheel_duties(&Control::from([0.0, 0.0, 1.0]));
        assert_eq!(duties, Vector::<f64, 4>::from([-1.0, -1.0, 1.0, 1.0]));
    }

    #[test]
    fn rest_with_zero_command_stays_at_rest() {
        let dot = model().state_derivative(&State::<f64>::zeros(), &Control::<f64>::zeros());
        assert_relative_eq!(dot.norm(), 0.0);
    }

    #[test]
    fn full_drive_accelerates_straight_ahead() {
        let params = RobotParams::default();
        let dot = model().state_derivative(&State::zeros(), &Control::from([1.0, 0.0, 0.0]));

        // Stall force on each wheel is t_max/r; all four push forward.
        let expected_ax = 4.0 * params.t_max / params.wheel_radius / params.mass;
        assert_relative_eq!(dot[VX], expected_ax, epsilon = 1e-12);
        assert_relative_eq!(dot[VY], 0.0, epsilon = 1e-12);
        assert_relative_eq!(dot[OMEGA], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn full_strafe_accelerates_sideways() {
        let params = RobotParams::default();
        let dot = model().state_derivative(&State::zeros(), &Control::from([0.0, 1.0, 0.0]));

        let expected_ay = 4.0 * params.t_max / params.wheel_radius / params.mass;
        assert_relative_eq!(dot[VX], 0.0, epsilon = 1e-12);
        assert_relative_eq!(dot[VY], expected_ay, epsilon = 1e-12);
        assert_relative_eq!(dot[OMEGA], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn full_turn_spins_in_place() {
        let params = RobotParams::default();
        let dot = model().state_derivative(&State::zeros(), &Control::from([0.0, 0.0, 1.0]));

        let stall = params.t_max / params.wheel_radius;
        let expected_alpha = (params.lx + params.ly) * 4.0 * stall / params.inertia;
        assert_relative_eq!(dot[VX], 0.0, epsilon = 1e-12);
        assert_relative_eq!(dot[VY], 0.0, epsilon = 1e-12);
        assert_relative_eq!(dot[OMEGA], expected_alpha, epsilon = 1e-12);
    }

    #[test]
    fn heading_rotates_acceleration_into_field_frame() {
        let mut x = State::zeros();
        x[THETA] = FRAC_PI_2;
        let dot = model().state_derivative(&x, &Control::from([1.0, 0.0, 0.0]));

        // Facing +y, a forward command accelerates along field +y.
        assert_relative_eq!(dot[VX], 0.0, epsilon = 1e-12);
        assert!(dot[VY] > 0.0);
    }

    #[test]
    fn forces_vanish_at_free_speed() {
        let params = RobotParams::default();
        let mut x = State::zeros();
        // Forward body speed matching the wheel free speed.
        x[VX] = params.wheel_radius * params.w_max;
        let forces = model().wheel_forces(&x, &Control::from([1.0, 0.0, 0.0]));
        assert_relative_eq!(forces.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn kinematic_derivatives_follow_velocities() {
        let x = State::from([0.4, -0.2, 0.3, 1.0, 2.0, 0.1]);
        let dot = model().state_derivative(&x, &Control::zeros());
        assert_relative_eq!(dot[PX], 0.4);
        assert_relative_eq!(dot[PY], -0.2);
        assert_relative_eq!(dot[THETA], 0.3);
    }
}
