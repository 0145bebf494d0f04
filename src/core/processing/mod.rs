//! Spectral index kernels (`ops`) and the per-index export stage (`indices`).
pub mod indices;
pub mod ops;

pub use indices::{IndexCalculator, IndexExport, IndexOutcome, IndexReport};
