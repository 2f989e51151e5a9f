use thiserror::Error;

/// Errors raised while converting between structure representations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("Unexpected character '{0}' in dot-bracket string.")]
    InvalidToken(char),

    #[error("Unmatched ')' at position {0}.")]
    UnmatchedClose(usize),

    #[error("Unmatched '(' at position {0}.")]
    UnmatchedOpen(usize),

    #[error("Pair ({i},{j}) is outside of a structure of length {length}.")]
    OutOfBounds { i: usize, j: usize, length: usize },

    #[error("Position {0} is paired twice.")]
    Conflict(usize),
}
