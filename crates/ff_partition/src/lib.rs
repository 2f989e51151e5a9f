//! The ff_partition crate.
//!
//! Equilibrium properties of RNA secondary structure ensembles:
//!  - partition functions of linear and circular sequences,
//!  - base-pair (and G-quadruplex) probabilities,
//!  - stochastic sampling of structures from the Boltzmann ensemble.
//!
//! Hard and soft constraints, SHAPE reactivity data and a generalized
//! per-decomposition weight can be attached to a [`FoldingContext`]
//! before folding it with an [`Ensemble`].
//!

mod error;
mod index;
mod scale;
mod constraints;
mod gquad;
mod context;
mod terms;
mod matrices;
mod forward;
mod circular;
mod backward;
mod sampler;
mod ensemble;

#[cfg(test)]
mod testutil;

pub use error::*;
pub use index::*;
pub use scale::*;
pub use constraints::*;
pub use gquad::*;
pub use context::*;
pub use terms::*;
pub use matrices::*;
pub use backward::PairProbabilities;
pub use sampler::Quadruplex;
pub use sampler::SampledStructure;
pub use ensemble::*;
