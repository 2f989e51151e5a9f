use thiserror::Error;
use ff_energy::EnergyError;
use ff_structure::StructureError;

/// Errors of the partition function engines.
///
/// Usage errors and fatal numeric conditions abort the computation.
/// Overflow in the probability matrix is not an error, see
/// [`crate::PairProbabilities::overflows`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PfError {
    #[error("The forward recursion has not been run.")]
    ForwardMissing,

    #[error("Pair probabilities have not been computed.")]
    ProbabilitiesMissing,

    #[error("Prefix length {length} outside of [1, {max}].")]
    PrefixOutOfRange { length: usize, max: usize },

    #[error("Empty sequence.")]
    EmptySequence,

    #[error("Unsupported: {0}.")]
    Unsupported(&'static str),

    #[error("Constraint data of length {found} for a sequence of length {expected}.")]
    ConstraintLength { expected: usize, found: usize },

    #[error("Position {position} outside of a sequence of length {length}.")]
    PositionOutOfRange { position: usize, length: usize },

    #[error("Unknown SHAPE conversion '{0}'.")]
    InvalidShapeConversion(String),

    #[error("No structure is compatible with the constraints.")]
    EmptyEnsemble,

    #[error("Overflow while computing Q[{i},{j}], use a larger pf_scale.")]
    ForwardOverflow { i: usize, j: usize },

    #[error("Backtracking failed in {region} ({i},{j}).")]
    BacktrackFailed { region: &'static str, i: usize, j: usize },

    #[error("Energy model error: {0}")]
    Energy(#[from] EnergyError),

    #[error("Structure error: {0}")]
    Structure(#[from] StructureError),
}
