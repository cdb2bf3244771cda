pub mod capture;
pub mod distance;
pub mod yin;

pub use distance::pitch_distance;
pub use yin::{PitchDetector, PitchResult};
