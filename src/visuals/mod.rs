pub mod needle;

pub use needle::{NeedleFrame, NeedleMapper};
