use num::traits::FloatConst;
use num::Float;

/// Returns the representative of `angle` modulo 2π that lies within π of
/// `reference`.
#[inline(always)]
pub fn wrap_to_near<F: Float + FloatConst>(angle: F, reference: F) -> F {
    let two_pi = F::PI() + F::PI();
    let mut angle = angle;
    while angle - reference > F::PI() {
        angle = angle - two_pi;
    }
    while angle - reference < -F::PI() {
        angle = angle + two_pi;
    }
    angle
}

/// Unwraps a heading sequence so consecutive entries never differ by more
/// than π. The first heading is kept as given; each following one is moved
/// by whole turns until it sits next to its predecessor. This keeps a
/// downstream solver from taking the long way around ±π.
pub fn unwrap_headings(headings: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut unwrapped: Vec<f64> = Vec::new();
    let mut prev: Option<f64> = None;
    for heading in headings {
        let next = match prev {
            Some(p) => wrap_to_near(heading, p),
            None => heading,
        };
        unwrapped.push(next);
        prev = Some(next);
    }
    unwrapped
}

/// Signed angular difference `to − from`, reduced into (−π, π].
#[inline(always)]
pub fn shortest_angle_delta<F: Float + FloatConst>(from: F, to: F) -> F {
    wrap_to_near(to - from, F::zero())
}
