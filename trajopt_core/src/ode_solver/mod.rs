pub mod rk4;

pub use rk4::{rk4_step, Rk4};

pub type Vector<F, const N: usize> = nalgebra::SVector<F, N>;
