//! Forward-mode automatic differentiation.
//!
//! A [`Dual`] carries a value and one directional derivative through the
//! model expressions. Seeding one decision variable at a time yields exact
//! first derivatives column by column; every constraint block only touches
//! a handful of variables, so this stays cheap.

use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::utils::traits::Real;

#[derive(Debug, Clone, Copy, Default)]
pub struct Dual {
    pub re: f64,
    pub eps: f64,
}

impl Dual {
    pub const fn new(re: f64, eps: f64) -> Self {
        Dual { re, eps }
    }

    /// A value with zero derivative.
    pub const fn constant(re: f64) -> Self {
        Dual::new(re, 0.0)
    }

    /// A value seeded as the differentiation variable.
    pub const fn seeded(re: f64) -> Self {
        Dual::new(re, 1.0)
    }
}

// Comparisons look at the value only; the derivative part is carried data,
// not part of the number's identity.
impl PartialEq for Dual {
    fn eq(&self, other: &Self) -> bool {
        self.re == other.re
    }
}

impl PartialOrd for Dual {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.re.partial_cmp(&other.re)
    }
}

impl Add for Dual {
    type Output = Dual;
    fn add(self, rhs: Dual) -> Dual {
        Dual::new(self.re + rhs.re, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Dual;
    fn sub(self, rhs: Dual) -> Dual {
        Dual::new(self.re - rhs.re, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Dual;
    fn mul(self, rhs: Dual) -> Dual {
        Dual::new(self.re * rhs.re, self.re * rhs.eps + self.eps * rhs.re)
    }
}

impl Div for Dual {
    type Output = Dual;
    fn div(self, rhs: Dual) -> Dual {
        Dual::new(
            self.re / rhs.re,
            (self.eps * rhs.re - self.re * rhs.eps) / (rhs.re * rhs.re),
        )
    }
}

impl Neg for Dual {
    type Output = Dual;
    fn neg(self) -> Dual {
        Dual::new(-self.re, -self.eps)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Dual) {
        *self = *self + rhs;
    }
}

impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Dual) {
        *self = *self - rhs;
    }
}

impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Dual) {
        *self = *self * rhs;
    }
}

impl DivAssign for Dual {
    fn div_assign(&mut self, rhs: Dual) {
        *self = *self / rhs;
    }
}

impl Real for Dual {
    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        Dual::constant(value)
    }

    #[inline(always)]
    fn re(self) -> f64 {
        self.re
    }

    fn sin(self) -> Self {
        Dual::new(self.re.sin(), self.eps * self.re.cos())
    }

    fn cos(self) -> Self {
        Dual::new(self.re.cos(), -self.eps * self.re.sin())
    }

    fn sqrt(self) -> Self {
        let root = self.re.sqrt();
        Dual::new(root, self.eps / (2.0 * root))
    }

    fn powi(self, n: i32) -> Self {
        Dual::new(
            self.re.powi(n),
            self.eps * f64::from(n) * self.re.powi(n - 1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn derivative_at(f: impl Fn(Dual) -> Dual, x: f64) -> f64 {
        f(Dual::seeded(x)).eps
    }

    #[test]
    fn product_rule() {
        // d/dx x·sin(x) = sin(x) + x·cos(x)
        let x = 1.3;
        let d = derivative_at(|x| x * x.sin(), x);
        assert_relative_eq!(d, x.sin() + x * x.cos(), epsilon = 1e-14);
    }

    #[test]
    fn quotient_rule() {
        // d/dx (x² / (1 + x)) = (x² + 2x) / (1 + x)²
        let x = 0.7;
        let d = derivative_at(|x| x * x / (Dual::constant(1.0) + x), x);
        assert_relative_eq!(d, (x * x + 2.0 * x) / (1.0 + x).powi(2), epsilon = 1e-14);
    }

    #[test]
    fn trig_and_powers() {
        let x = -0.4;
        let d = derivative_at(|x| x.cos().powi(3), x);
        assert_relative_eq!(
            d,
            -3.0 * x.cos().powi(2) * x.sin(),
            epsilon = 1e-14
        );
        let d = derivative_at(|x| x.sqrt(), 2.0);
        assert_relative_eq!(d, 0.5 / 2.0_f64.sqrt(), epsilon = 1e-14);
    }

    #[test]
    fn constants_carry_no_derivative() {
        let d = derivative_at(|x| x + Dual::constant(5.0), 1.0);
        assert_relative_eq!(d, 1.0);
        assert_relative_eq!(Dual::from_f64(3.0).eps, 0.0);
    }

    #[test]
    fn matches_finite_differences_through_composition() {
        let f = |x: f64| (x.sin() * x + 1.0 / (x + 2.0)).cos();
        let fd = |x: Dual| (x.sin() * x + Dual::constant(1.0) / (x + Dual::constant(2.0))).cos();
        let x = 0.9;
        let h = 1e-6;
        let numeric = (f(x + h) - f(x - h)) / (2.0 * h);
        assert_relative_eq!(derivative_at(fd, x), numeric, epsilon = 1e-8);
    }
}
