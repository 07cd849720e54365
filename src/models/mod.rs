pub mod grid;
pub mod loaders;
pub mod micrograph;

pub use grid::{Degeneracy, ScoreGrid, SegmentationGrid, WindowGrid, NOISE, PARTICLE};
pub use loaders::read_mrc;
pub use micrograph::Micrograph;
