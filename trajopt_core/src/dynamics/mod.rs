pub mod mecanum;
pub mod params;

pub use mecanum::{Control, MecanumModel, State};
pub use params::RobotParams;
