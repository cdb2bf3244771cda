pub mod engine;
pub mod selector;
pub mod stars;
pub mod types;

pub use engine::VocalsEngine;
pub use types::{Difficulty, EngineEvent, EngineParameters, EngineState, EngineStats, PitchSample};
