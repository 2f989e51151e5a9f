use thiserror::Error;
use ff_structure::StructureError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnergyError {
    #[error("Unknown nucleotide '{0}'.")]
    UnknownBase(char),

    #[error("Empty sequence.")]
    EmptySequence,

    #[error("Structure of length {structure} does not match sequence of length {sequence}.")]
    LengthMismatch { sequence: usize, structure: usize },

    #[error("Pair ({i},{j}) is not a canonical base pair.")]
    NonCanonicalPair { i: usize, j: usize },

    #[error("Invalid structure: {0}")]
    Structure(#[from] StructureError),
}
