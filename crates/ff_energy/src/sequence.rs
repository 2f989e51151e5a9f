//! Nucleotide alphabet, encoded sequences and canonical pair types.

use std::fmt;
use serde::Deserialize;
use serde::Serialize;

use crate::EnergyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Base {
    A,
    C,
    G,
    U,
    /// Any other IUPAC symbol; never pairs.
    N,
}

impl TryFrom<char> for Base {
    type Error = EnergyError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c.to_ascii_uppercase() {
            'A' => Ok(Base::A),
            'C' => Ok(Base::C),
            'G' => Ok(Base::G),
            'U' | 'T' => Ok(Base::U),
            'N' | 'R' | 'Y' | 'S' | 'W' | 'K' | 'M' | 'B' | 'D' | 'H' | 'V' => Ok(Base::N),
            _ => Err(EnergyError::UnknownBase(c)),
        }
    }
}

impl From<Base> for char {
    fn from(b: Base) -> Self {
        match b {
            Base::A => 'A',
            Base::C => 'C',
            Base::G => 'G',
            Base::U => 'U',
            Base::N => 'N',
        }
    }
}

/// An encoded nucleotide sequence.
///
/// Positions are 1-based to match the folding matrices: `base(1)` is
/// the 5'-end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NucleotideVec(Vec<Base>);

impl NucleotideVec {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn base(&self, i: usize) -> Base {
        debug_assert!(i >= 1 && i <= self.0.len());
        self.0[i - 1]
    }

    pub fn bases(&self) -> &[Base] {
        &self.0
    }

    /// The canonical pair type of positions (i, j), if any.
    pub fn pair_type(&self, i: usize, j: usize) -> Option<PairType> {
        PairType::of(self.base(i), self.base(j))
    }
}

impl TryFrom<&str> for NucleotideVec {
    type Error = EnergyError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let bases = s
            .trim()
            .chars()
            .map(Base::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        if bases.is_empty() {
            return Err(EnergyError::EmptySequence);
        }
        Ok(NucleotideVec(bases))
    }
}

impl From<Vec<Base>> for NucleotideVec {
    fn from(bases: Vec<Base>) -> Self {
        NucleotideVec(bases)
    }
}

impl fmt::Display for NucleotideVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = self.0.iter().map(|&b| char::from(b)).collect();
        write!(f, "{}", s)
    }
}

/// Canonical base pair types in the order of the energy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PairType {
    CG,
    GC,
    GU,
    UG,
    AU,
    UA,
}

impl PairType {
    pub const ALL: [PairType; 6] = [
        PairType::CG,
        PairType::GC,
        PairType::GU,
        PairType::UG,
        PairType::AU,
        PairType::UA,
    ];

    pub fn of(a: Base, b: Base) -> Option<PairType> {
        match (a, b) {
            (Base::C, Base::G) => Some(PairType::CG),
            (Base::G, Base::C) => Some(PairType::GC),
            (Base::G, Base::U) => Some(PairType::GU),
            (Base::U, Base::G) => Some(PairType::UG),
            (Base::A, Base::U) => Some(PairType::AU),
            (Base::U, Base::A) => Some(PairType::UA),
            _ => None,
        }
    }

    /// The type of the same pair read from the other side.
    pub fn reversed(self) -> PairType {
        match self {
            PairType::CG => PairType::GC,
            PairType::GC => PairType::CG,
            PairType::GU => PairType::UG,
            PairType::UG => PairType::GU,
            PairType::AU => PairType::UA,
            PairType::UA => PairType::AU,
        }
    }

    /// AU and GU helix ends are penalized.
    pub fn has_terminal_penalty(self) -> bool {
        !matches!(self, PairType::CG | PairType::GC)
    }

    pub fn is_gu(self) -> bool {
        matches!(self, PairType::GU | PairType::UG)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}
