use super::Vector;
use crate::utils::traits::Real;

/// One classical Runge–Kutta-4 step of `ẋ = f(x, u)` with the control held
/// constant across the step (zero-order hold).
///
/// Generic over the scalar so the NLP can push dual numbers through the
/// whole one-step map.
pub fn rk4_step<F, const N: usize, const U: usize>(
    f: impl Fn(&Vector<F, N>, &Vector<F, U>) -> Vector<F, N>,
    x: &Vector<F, N>,
    u: &Vector<F, U>,
    h: F,
) -> Vector<F, N>
where
    F: Real,
{
    let two = F::from_f64(2.0);
    let half_h = h / two;

    let k1 = f(x, u);
    let k2 = f(&(x + k1 * half_h), u);
    let k3 = f(&(x + k2 * half_h), u);
    let k4 = f(&(x + k3 * h), u);

    x + (k1 + k2 * two + k3 * two + k4) * (h / F::from_f64(6.0))
}

/// Stateful RK4 playback integrator.
///
/// Steps a trajectory forward through a control sequence with per-step
/// durations; used to re-integrate solved controls against the solved
/// states.
pub struct Rk4<F, const N: usize, const U: usize>
where
    F: Fn(&Vector<f64, N>, &Vector<f64, U>) -> Vector<f64, N>,
{
    f: F,
    t: f64,
    x: Vector<f64, N>,
}

impl<F, const N: usize, const U: usize> Rk4<F, N, U>
where
    F: Fn(&Vector<f64, N>, &Vector<f64, U>) -> Vector<f64, N>,
{
    pub fn new(f: F, x0: Vector<f64, N>) -> Self {
        Self { f, t: 0.0, x: x0 }
    }

    pub fn step(&mut self, dt: f64, u: &Vector<f64, U>) {
        self.x = rk4_step(&self.f, &self.x, u, dt);
        self.t += dt;
    }

    pub fn state(&self) -> Vector<f64, N> {
        self.x
    }

    pub fn time(&self) -> f64 {
        self.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_dynamics_is_identity() {
        let x = Vector::<f64, 2>::new(1.0, -2.0);
        let next = rk4_step(
            |_x: &Vector<f64, 2>, _u: &Vector<f64, 1>| Vector::<f64, 2>::zeros(),
            &x,
            &Vector::<f64, 1>::zeros(),
            0.5,
        );
        assert_relative_eq!(next, x);
    }

    #[test]
    fn constant_acceleration_is_exact() {
        // x = [p, v], ṗ = v, v̇ = u. RK4 integrates polynomials of degree
        // ≤ 4 exactly, so position must land on p + v·h + u·h²/2.
        let f = |x: &Vector<f64, 2>, u: &Vector<f64, 1>| Vector::<f64, 2>::new(x[1], u[0]);
        let x = Vector::<f64, 2>::new(1.0, 2.0);
        let u = Vector::<f64, 1>::new(3.0);
        let h = 0.2;
        let next = rk4_step(f, &x, &u, h);
        assert_relative_eq!(next[0], 1.0 + 2.0 * h + 0.5 * 3.0 * h * h, epsilon = 1e-12);
        assert_relative_eq!(next[1], 2.0 + 3.0 * h, epsilon = 1e-12);
    }

    #[test]
    fn exponential_decay_has_fourth_order_accuracy() {
        let f = |x: &Vector<f64, 1>, _u: &Vector<f64, 1>| -x;
        let u = Vector::<f64, 1>::zeros();
        let h = 0.1;
        let next = rk4_step(f, &Vector::<f64, 1>::new(1.0), &u, h);
        // Local truncation error of RK4 is O(h^5).
        assert_relative_eq!(next[0], (-h).exp(), epsilon = h.powi(5));
    }

    #[test]
    fn playback_accumulates_time_and_state() {
        let f = |x: &Vector<f64, 2>, u: &Vector<f64, 1>| Vector::<f64, 2>::new(x[1], u[0]);
        let mut integrator = Rk4::new(f, Vector::<f64, 2>::zeros());
        let u = Vector::<f64, 1>::new(1.0);
        for _ in 0..10 {
            integrator.step(0.1, &u);
        }
        assert_relative_eq!(integrator.time(), 1.0, epsilon = 1e-12);
        // After 1 s of unit acceleration: v = 1, p = 0.5.
        assert_relative_eq!(integrator.state()[1], 1.0, epsilon = 1e-9);
        assert_relative_eq!(integrator.state()[0], 0.5, epsilon = 1e-9);
    }
}
