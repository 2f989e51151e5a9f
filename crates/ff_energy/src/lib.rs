mod error;
mod sequence;
mod tables;
mod boltzmann;
mod eval;

pub use error::*;
pub use sequence::*;
pub use tables::*;
pub use boltzmann::*;
pub use eval::*;

/// Minimum number of unpaired nucleotides enclosed by a hairpin.
pub const TURN: usize = 3;

/// Maximal number of unpaired nucleotides in an interior loop.
pub const MAXLOOP: usize = 30;

/// Energy of a forbidden loop (dcal/mol).
pub const INF: i32 = 10_000_000;

/// Gas constant in cal/(mol·K).
pub const GASCONST: f64 = 1.98717;

/// 0 °C in Kelvin.
pub const K0: f64 = 273.15;

