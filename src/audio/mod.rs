pub mod analyzer;
pub mod drums;
pub mod spectrum;
pub mod voice;

pub use analyzer::{AnalyzerCore, FrameResult};
pub use spectrum::{BandMapper, BarSmoother, FrameWindower, SmoothingCues};
